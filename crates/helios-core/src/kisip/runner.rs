use std::env;
use std::ffi::OsString;
use std::fmt;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, SyncSender};
use std::thread::{self, JoinHandle};

use crate::consts::{LIBRARY_PATH_VAR, PATH_VAR, PROCESS_LOG_CHANNEL_CAPACITY};
use crate::error::{HeliosError, Result};
use crate::pipeline::config::KisipEnv;

/// Which pipe a line of child output came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => write!(f, "stdout"),
            Self::Stderr => write!(f, "stderr"),
        }
    }
}

/// One line of child output, without its line terminator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub text: String,
}

/// Value of search-path variable `var` with `dir` in front, built from the
/// current process environment (which is left untouched).
pub fn prepend_search_path(var: &str, dir: &Path) -> Result<OsString> {
    let mut paths = vec![dir.to_path_buf()];
    if let Some(current) = env::var_os(var) {
        paths.extend(env::split_paths(&current));
    }
    env::join_paths(paths).map_err(|e| {
        HeliosError::Configuration(format!("cannot prepend {} to {var}: {e}", dir.display()))
    })
}

/// `<bin>/<mpirun> -np <nproc> <bin>/<exe>` run from `work_dir`, with the
/// tool's bin and lib directories in front of the child's search paths.
pub fn kisip_command(kisip: &KisipEnv, work_dir: &Path) -> Result<Command> {
    let mut cmd = Command::new(kisip.bin.join(&kisip.mpirun));
    cmd.arg("-np")
        .arg(kisip.nproc.to_string())
        .arg(kisip.bin.join(&kisip.exe))
        .current_dir(work_dir)
        .env(PATH_VAR, prepend_search_path(PATH_VAR, &kisip.bin)?)
        .env(LIBRARY_PATH_VAR, prepend_search_path(LIBRARY_PATH_VAR, &kisip.lib)?);
    Ok(cmd)
}

/// Spawn `cmd` and hand every output line to `on_line` as it arrives.
///
/// stdout and stderr are drained on two threads feeding a bounded channel,
/// so neither pipe can fill up and stall the child. A final line without a
/// terminator is still delivered. Failing to spawn is an error; a nonzero
/// exit is reported through the returned status. The child is always waited
/// for, even when reading its output fails.
pub fn run_streaming(
    mut cmd: Command,
    mut on_line: impl FnMut(OutputLine),
) -> Result<ExitStatus> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| HeliosError::ExternalProcess(format!("failed to launch {program}: {e}")))?;

    let (tx, rx) = mpsc::sync_channel(PROCESS_LOG_CHANNEL_CAPACITY);
    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(spawn_reader(stdout, OutputStream::Stdout, tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(spawn_reader(stderr, OutputStream::Stderr, tx.clone()));
    }
    // The loop below ends once every reader has dropped its sender.
    drop(tx);

    for line in rx {
        on_line(line);
    }

    let results = readers.into_iter().map(JoinHandle::join).collect();
    reap(&mut child, &program, results)
}

type ReaderResult = thread::Result<io::Result<()>>;

/// Wait for `child`, then surface the first reader failure.
fn reap(child: &mut Child, program: &str, readers: Vec<ReaderResult>) -> Result<ExitStatus> {
    let status = child.wait()?;
    for result in readers {
        result.map_err(|_| {
            HeliosError::ExternalProcess(format!("{program}: output reader panicked"))
        })??;
    }
    Ok(status)
}

fn spawn_reader<R>(
    pipe: R,
    stream: OutputStream,
    tx: SyncSender<OutputLine>,
) -> JoinHandle<io::Result<()>>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut reader = BufReader::new(pipe);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                return Ok(());
            }
            let text = String::from_utf8_lossy(&buf)
                .trim_end_matches(['\n', '\r'])
                .to_string();
            if tx.send(OutputLine { stream, text }).is_err() {
                return Ok(());
            }
        }
    })
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;

    #[test]
    fn test_reader_error_still_reaps_child() {
        let mut child = Command::new("true").spawn().unwrap();
        let proc_entry = std::path::PathBuf::from(format!("/proc/{}", child.id()));
        let failed: ReaderResult = Ok(Err(io::Error::other("pipe closed")));

        let result = reap(&mut child, "true", vec![failed]);

        assert!(matches!(result, Err(HeliosError::Io(_))));
        assert!(!proc_entry.exists());
    }
}

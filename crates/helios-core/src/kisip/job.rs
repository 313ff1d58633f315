use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::Path;

use tracing::{error, info};

use crate::consts::SIDECAR_EXTENSION;
use crate::error::{HeliosError, Result};
use crate::frame::ImageGeometry;
use crate::io::file_form::{FileForm, FormFields};
use crate::pipeline::config::RunConfig;

use super::descriptor::{resolve_indices, BatchIndices, JobDescriptor};
use super::runner::{kisip_command, run_streaming};

/// Lifecycle of the reconstruction job for one batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobState {
    Idle,
    IndicesResolved,
    DescriptorsWritten,
    ProcessRunning,
    Completed,
    Failed,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::IndicesResolved => write!(f, "indices resolved"),
            Self::DescriptorsWritten => write!(f, "descriptors written"),
            Self::ProcessRunning => write!(f, "process running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Final state of one batch job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchOutcome {
    pub indices: BatchIndices,
    pub state: JobState,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
}

impl BatchOutcome {
    pub fn batch(&self) -> usize {
        self.indices.batch
    }

    pub fn succeeded(&self) -> bool {
        self.state == JobState::Completed
    }
}

/// Outcome of every batch job of a run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DespeckleReport {
    pub outcomes: Vec<BatchOutcome>,
}

impl DespeckleReport {
    /// True when any batch failed.
    pub fn is_degraded(&self) -> bool {
        self.outcomes.iter().any(|o| !o.succeeded())
    }

    pub fn completed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded()).count()
    }

    pub fn failed_batches(&self) -> Vec<usize> {
        self.outcomes
            .iter()
            .filter(|o| !o.succeeded())
            .map(BatchOutcome::batch)
            .collect()
    }
}

/// Drives one batch through the [`JobState`] sequence.
pub struct BatchJob<'a> {
    config: &'a RunConfig,
    geometry: &'a ImageGeometry,
    batch: usize,
    state: JobState,
}

impl<'a> BatchJob<'a> {
    pub fn new(config: &'a RunConfig, geometry: &'a ImageGeometry, batch: usize) -> Self {
        Self {
            config,
            geometry,
            batch,
            state: JobState::Idle,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    fn transition(&mut self, next: JobState) {
        info!(batch = self.batch, from = %self.state, to = %next, "Batch job state");
        self.state = next;
    }

    /// Resolve indices, write descriptors, run the tool and wait for it.
    ///
    /// Only a failure to prepare or launch the job is an error; a nonzero
    /// exit status yields a [`JobState::Failed`] outcome.
    pub fn run(mut self) -> Result<BatchOutcome> {
        let work = &self.config.paths.work_base;

        let indices = resolve_indices(self.config, self.batch)?;
        self.transition(JobState::IndicesResolved);

        JobDescriptor::new(self.config, self.geometry, indices).write(work)?;
        self.transition(JobState::DescriptorsWritten);

        let kisip = &self.config.kisip.env;
        let cmd = kisip_command(kisip, work)?;
        info!(
            command = %format!(
                "{} -np {} {}",
                kisip.bin.join(&kisip.mpirun).display(),
                kisip.nproc,
                kisip.bin.join(&kisip.exe).display()
            ),
            "Reconstruction command"
        );
        info!(
            batch = self.batch,
            nproc = kisip.nproc,
            log_dir = %self.config.speckle_dir().display(),
            "Running reconstruction"
        );
        self.transition(JobState::ProcessRunning);

        let batch = self.batch;
        let status = run_streaming(cmd, |line| {
            info!(batch, stream = %line.stream, "{}", line.text);
        })?;

        let exit_code = status.code();
        if status.success() {
            self.transition(JobState::Completed);
            info!(batch, code = ?exit_code, "Reconstruction batch finished");
        } else {
            self.transition(JobState::Failed);
            error!(
                batch,
                code = ?exit_code,
                "Something went wrong with the reconstruction run; check its log"
            );
        }

        Ok(BatchOutcome {
            indices,
            state: self.state,
            exit_code,
        })
    }
}

/// Run every batch in order, waiting for each before starting the next.
pub fn despeckle_batches(
    config: &RunConfig,
    geometry: &ImageGeometry,
    batches: &[usize],
    on_progress: Option<&dyn Fn(usize)>,
) -> Result<DespeckleReport> {
    info!(?batches, "Preparing to run reconstruction on batches");
    let mut report = DespeckleReport::default();
    for (i, &batch) in batches.iter().enumerate() {
        report
            .outcomes
            .push(BatchJob::new(config, geometry, batch).run()?);
        if let Some(progress) = on_progress {
            progress(i + 1);
        }
    }
    Ok(report)
}

/// Batch ids of the burst cubes already present in `dir`, ascending.
///
/// Lets the reconstruction stage run on its own after an earlier
/// calibration. Only names that render exactly from `form` with the given
/// date and time count; sidecars are ignored.
pub fn discover_batches(
    dir: &Path,
    form: &FileForm,
    date: &str,
    time: &str,
) -> Result<Vec<usize>> {
    if !dir.is_dir() {
        return Err(HeliosError::Configuration(format!(
            "burst directory {} does not exist",
            dir.display()
        )));
    }
    let matcher = form.matcher()?;
    let mut batches = BTreeSet::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some(SIDECAR_EXTENSION) {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some((batch, burst)) = matcher.indices(name) else {
            continue;
        };
        let expected = form.render(FormFields {
            date,
            time,
            batch,
            burst,
        });
        if expected == name {
            batches.insert(batch);
        }
    }
    if batches.is_empty() {
        return Err(HeliosError::Discovery {
            base: dir.to_path_buf(),
            pattern: form.to_string(),
        });
    }
    Ok(batches.into_iter().collect())
}

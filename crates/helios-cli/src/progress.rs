use std::sync::Mutex;

use helios_core::pipeline::{PipelineStage, ProgressReporter};
use indicatif::{ProgressBar, ProgressStyle};

/// Drives one indicatif bar per pipeline stage.
#[derive(Default)]
pub struct BarReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl BarReporter {
    fn with_bar(&self, f: impl FnOnce(&mut Option<ProgressBar>)) {
        if let Ok(mut bar) = self.bar.lock() {
            f(&mut bar);
        }
    }
}

impl ProgressReporter for BarReporter {
    fn begin_stage(&self, stage: PipelineStage, total_items: Option<usize>) {
        let pb = match total_items {
            Some(total) => {
                let pb = ProgressBar::new(total as u64);
                if let Ok(style) = ProgressStyle::default_bar()
                    .template("{msg:24} [{bar:40}] {pos}/{len}")
                {
                    pb.set_style(style.progress_chars("=> "));
                }
                pb
            }
            None => {
                let pb = ProgressBar::new_spinner();
                if let Ok(style) = ProgressStyle::default_spinner().template("{msg:24} {spinner}")
                {
                    pb.set_style(style);
                }
                pb
            }
        };
        pb.set_message(stage.to_string());
        self.with_bar(|bar| {
            if let Some(old) = bar.replace(pb) {
                old.finish_and_clear();
            }
        });
    }

    fn advance(&self, items_done: usize) {
        self.with_bar(|bar| {
            if let Some(pb) = bar.as_ref() {
                pb.set_position(items_done as u64);
            }
        });
    }

    fn finish_stage(&self) {
        self.with_bar(|bar| {
            if let Some(pb) = bar.take() {
                pb.finish();
            }
        });
    }
}

//! Parallel batch processing of many granules into one stack.

use std::sync::mpsc;
use std::time::Instant;

use rayon::prelude::*;
use swath_common::{SwathError, SwathResult};
use tracing::{info, warn};

use crate::granule::{GranuleProcessor, GranuleSource, GranuleStatus};
use crate::stack::{TimeSeriesStack, TimeStacker};

/// Outcome of a batch run.
#[derive(Debug)]
pub struct BatchReport {
    /// The stack, or `EmptyStack` if no frame survived.
    pub stack: SwathResult<TimeSeriesStack>,
    /// Granules regridded successfully.
    pub processed: usize,
    /// Granules skipped before stacking, with the reason.
    pub skipped: Vec<(String, SwathError)>,
    /// Frames the stacker refused.
    pub rejected: Vec<(String, SwathError)>,
}

impl BatchReport {
    /// Number of frames in the final stack.
    pub fn stacked(&self) -> usize {
        self.stack.as_ref().map(TimeSeriesStack::len).unwrap_or(0)
    }

    fn log_summary(&self, elapsed_ms: u64) {
        info!(
            processed = self.processed,
            skipped = self.skipped.len(),
            rejected = self.rejected.len(),
            stacked = self.stacked(),
            elapsed_ms,
            "Batch complete"
        );
        for (granule_id, error) in self.skipped.iter().chain(&self.rejected) {
            warn!(granule_id = %granule_id, kind = error.kind(), error = %error, "Granule not stacked");
        }
    }
}

/// Runs a [`GranuleProcessor`] over many granules on the rayon pool.
///
/// Granules are independent; one failing never affects another.
#[derive(Debug, Clone)]
pub struct BatchRunner {
    processor: GranuleProcessor,
}

impl BatchRunner {
    pub fn new(processor: GranuleProcessor) -> Self {
        Self { processor }
    }

    pub fn processor(&self) -> &GranuleProcessor {
        &self.processor
    }

    /// Process every source, then stack.
    ///
    /// Results are gathered in input order before stacking, so frames with
    /// equal timestamps end up in input order.
    pub fn run<S: GranuleSource>(&self, sources: &[S]) -> BatchReport {
        let start = Instant::now();
        info!(granules = sources.len(), "Starting batch");

        let statuses: Vec<GranuleStatus> = sources
            .par_iter()
            .map(|source| self.processor.process_source(source))
            .collect();

        let mut stacker = TimeStacker::new();
        let mut processed = 0;
        let mut skipped = Vec::new();
        for status in statuses {
            record(status, &mut stacker, &mut processed, &mut skipped);
        }

        let report = finish(stacker, processed, skipped);
        report.log_summary(start.elapsed().as_millis() as u64);
        report
    }

    /// Process every source, streaming frames to a single consumer that
    /// appends them as they complete.
    ///
    /// Only the frames in flight are held outside the stacker. Frames with
    /// equal timestamps are ordered by completion, not input order.
    pub fn run_streaming<S: GranuleSource>(&self, sources: &[S]) -> BatchReport {
        let start = Instant::now();
        info!(granules = sources.len(), "Starting streaming batch");

        let (tx, rx) = mpsc::channel::<GranuleStatus>();

        let (stacker, processed, skipped) = std::thread::scope(|scope| {
            let consumer = scope.spawn(move || {
                let mut stacker = TimeStacker::new();
                let mut processed = 0;
                let mut skipped = Vec::new();
                for status in rx {
                    record(status, &mut stacker, &mut processed, &mut skipped);
                }
                (stacker, processed, skipped)
            });

            sources.par_iter().for_each_with(tx, |tx, source| {
                // The consumer only hangs up by panicking, which join surfaces.
                let _ = tx.send(self.processor.process_source(source));
            });

            consumer
                .join()
                .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
        });

        let report = finish(stacker, processed, skipped);
        report.log_summary(start.elapsed().as_millis() as u64);
        report
    }
}

fn record(
    status: GranuleStatus,
    stacker: &mut TimeStacker,
    processed: &mut usize,
    skipped: &mut Vec<(String, SwathError)>,
) {
    match status {
        GranuleStatus::Processed(frame) => {
            *processed += 1;
            // Shape rejections are kept by the stacker.
            let _ = stacker.push(frame);
        }
        GranuleStatus::Skipped { granule_id, error } => skipped.push((granule_id, error)),
    }
}

fn finish(
    stacker: TimeStacker,
    processed: usize,
    skipped: Vec<(String, SwathError)>,
) -> BatchReport {
    let (stack, rejected) = stacker.finish_with_rejections();
    BatchReport {
        stack,
        processed,
        skipped,
        rejected,
    }
}

// ============================================================================
// RENDER WORKER: the dedicated worker lane
// ============================================================================

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use super::SessionError;
use super::coalescer::{RenderCompletion, RenderJob, RenderedImage};
use super::session::LaneEvent;
use crate::render::RenderEngine;
use crate::{log_err, log_info};

/// Owns the worker thread.  Dropping it closes the job channel and joins.
pub struct RenderWorker {
    jobs: Option<Sender<RenderJob>>,
    handle: Option<JoinHandle<()>>,
}

impl RenderWorker {
    /// Start the worker; completions are posted to `completions`.
    pub fn spawn(
        engine: Arc<dyn RenderEngine>,
        completions: Sender<LaneEvent>,
    ) -> Result<Self, SessionError> {
        let (jobs, job_rx) = mpsc::channel::<RenderJob>();
        let handle = thread::Builder::new()
            .name("render-worker".into())
            .spawn(move || {
                while let Ok(job) = job_rx.recv() {
                    let completion = run_job(engine.as_ref(), job);
                    if completions.send(LaneEvent::Rendered(completion)).is_err() {
                        // Display lane is gone; nobody is waiting for output.
                        break;
                    }
                }
            })
            .map_err(SessionError::Spawn)?;

        Ok(Self {
            jobs: Some(jobs),
            handle: Some(handle),
        })
    }

    pub fn dispatch(&self, job: RenderJob) -> Result<(), SessionError> {
        let sequence = job.sequence;
        self.jobs
            .as_ref()
            .ok_or(SessionError::WorkerGone(sequence))?
            .send(job)
            .map_err(|_| SessionError::WorkerGone(sequence))
    }
}

impl Drop for RenderWorker {
    fn drop(&mut self) {
        self.jobs.take();
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            log_err!("render worker terminated abnormally");
        }
    }
}

/// Render one job.  A panicking engine is reported as "no output" so the
/// display lane still sees a completion.
fn run_job(engine: &dyn RenderEngine, job: RenderJob) -> RenderCompletion {
    let start = Instant::now();
    let result = panic::catch_unwind(AssertUnwindSafe(|| engine.render(&job.request)));
    let render_time = start.elapsed();

    let image = match result {
        Ok(Some(pixels)) => {
            log_info!(
                "render #{} {} finished in {:.1}ms",
                job.sequence,
                job.request.filter,
                render_time.as_secs_f64() * 1000.0
            );
            Some(RenderedImage {
                sequence: job.sequence,
                filter: job.request.filter,
                pixels,
                render_time,
            })
        }
        Ok(None) => None,
        Err(_) => {
            log_err!("render #{} {} panicked", job.sequence, job.request.filter);
            None
        }
    };

    RenderCompletion {
        sequence: job.sequence,
        image,
    }
}

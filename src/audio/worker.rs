use tokio::sync::mpsc;
use tracing::{Level, event};

use super::device::AudioRoute;
use super::route_controller::AudioRouteController;

enum AudioJob {
    Acquire(AudioRoute),
    Restore,
    Discard,
}

/// Runs controller calls one at a time, in submission order, on a single blocking thread.
///
/// A restore queued at the end of one session always completes before the next session's
/// acquisition captures its snapshot.
pub(crate) struct AudioWorker {
    jobs: mpsc::UnboundedSender<AudioJob>,
}

impl AudioWorker {
    /// Spawns the worker on the current runtime's blocking pool. It exits once the handle is dropped.
    pub fn spawn(controller: AudioRouteController) -> Self {
        let (jobs, mut queue) = mpsc::unbounded_channel();
        tokio::task::spawn_blocking(move || {
            while let Some(job) = queue.blocking_recv() {
                match job {
                    AudioJob::Acquire(route) => {
                        if let Err(e) = controller.acquire_maximum(route) {
                            event!(Level::WARN, "Volume acquisition failed, continuing without it: {:#}", e);
                        }
                    }
                    AudioJob::Restore => {
                        if let Err(e) = controller.restore() {
                            event!(Level::WARN, "Volume restore failed: {:#}", e);
                        }
                    }
                    AudioJob::Discard => controller.discard_snapshot(),
                }
            }
            event!(Level::TRACE, "Audio worker stopped");
        });
        Self { jobs }
    }

    pub fn acquire(&self, route: AudioRoute) {
        self.submit(AudioJob::Acquire(route));
    }

    pub fn restore(&self) {
        self.submit(AudioJob::Restore);
    }

    pub fn discard(&self) {
        self.submit(AudioJob::Discard);
    }

    fn submit(&self, job: AudioJob) {
        if self.jobs.send(job).is_err() {
            event!(Level::WARN, "Audio worker is gone, dropping request");
        }
    }
}

use std::collections::{HashMap, HashSet};

use archiver_core::{JobId, JobUpdate};
use archiver_logging::archiver_debug;
use tokio::sync::{mpsc, RwLock};

/// Sender half feeding one observer's event stream.
pub type UpdateSender = mpsc::UnboundedSender<JobUpdate>;
pub type UpdateReceiver = mpsc::UnboundedReceiver<JobUpdate>;

#[derive(Default)]
struct RegistryState {
    /// Jobs that have begun and not yet finished.
    running: HashSet<JobId>,
    sinks: HashMap<JobId, Vec<UpdateSender>>,
}

/// Fan-out of job updates to every observer of that job.
///
/// There is no buffering or replay: an observer sees the `connected`
/// acknowledgment and then only what is published after it subscribed.
/// Shared as `Arc<JobRegistry>` between the export tasks and the HTTP layer.
pub struct JobRegistry {
    state: RwLock<RegistryState>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
        }
    }

    /// Mark a job as running so observers can attach to it.
    pub async fn begin(&self, job_id: &JobId) {
        self.state.write().await.running.insert(job_id.clone());
    }

    /// Register an observer.
    ///
    /// The receiver always yields a `connected` update first. For a job that
    /// is not running the stream ends right after it.
    pub async fn subscribe(&self, job_id: &JobId) -> UpdateReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(JobUpdate::connected(job_id));

        let mut state = self.state.write().await;
        if state.running.contains(job_id) {
            state.sinks.entry(job_id.clone()).or_default().push(tx);
        } else {
            archiver_debug!("Subscriber attached to idle job {}", job_id);
        }
        rx
    }

    /// Send `update` to every live observer of `job_id`.
    ///
    /// Closed observers are pruned; a job left without observers loses its
    /// entry. Returns how many observers received the update.
    pub async fn publish(&self, job_id: &JobId, update: JobUpdate) -> usize {
        let mut state = self.state.write().await;
        let Some(sinks) = state.sinks.get_mut(job_id) else {
            return 0;
        };
        sinks.retain(|sink| sink.send(update.clone()).is_ok());
        let delivered = sinks.len();
        if delivered == 0 {
            state.sinks.remove(job_id);
        }
        delivered
    }

    /// Forget a finished job. Dropping its senders ends every observer stream.
    pub async fn finish(&self, job_id: &JobId) {
        let mut state = self.state.write().await;
        state.running.remove(job_id);
        state.sinks.remove(job_id);
    }

    pub async fn is_running(&self, job_id: &JobId) -> bool {
        self.state.read().await.running.contains(job_id)
    }

    /// Observers currently attached to `job_id`.
    pub async fn subscriber_count(&self, job_id: &JobId) -> usize {
        self.state
            .read()
            .await
            .sinks
            .get(job_id)
            .map_or(0, |sinks| sinks.iter().filter(|s| !s.is_closed()).count())
    }

    pub async fn running_jobs(&self) -> usize {
        self.state.read().await.running.len()
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

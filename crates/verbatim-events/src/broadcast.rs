//! Per-job event fan-out to subscribers.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::counter;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use verbatim_core::events::JobEvent;

/// Buffered events per subscriber before delivery becomes lossy.
const SUBSCRIBER_BUFFER: usize = 64;

struct Subscriber {
    id: String,
    tx: mpsc::Sender<Arc<JobEvent>>,
}

/// Publish-subscribe keyed by job id. Delivery is lossy: a slow subscriber
/// drops events rather than stalling the pipeline, and a closed subscriber
/// is pruned on the next publish.
pub struct JobBroadcaster {
    subscribers: RwLock<HashMap<String, Vec<Subscriber>>>,
}

impl JobBroadcaster {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribe to one job's events. Returns the subscription id (for
    /// `unsubscribe`) and the receiving end.
    pub async fn subscribe(&self, job_id: &str) -> (String, mpsc::Receiver<Arc<JobEvent>>) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let id = Uuid::now_v7().to_string();
        let mut subs = self.subscribers.write().await;
        subs.entry(job_id.to_owned())
            .or_default()
            .push(Subscriber { id: id.clone(), tx });
        (id, rx)
    }

    pub async fn unsubscribe(&self, job_id: &str, subscription_id: &str) {
        let mut subs = self.subscribers.write().await;
        if let Some(list) = subs.get_mut(job_id) {
            list.retain(|s| s.id != subscription_id);
            if list.is_empty() {
                subs.remove(job_id);
            }
        }
    }

    /// Fan an event out to the job's subscribers.
    pub async fn publish(&self, event: JobEvent) {
        let job_id = event.job_id.clone();
        let shared = Arc::new(event);

        let mut closed = Vec::new();
        {
            let subs = self.subscribers.read().await;
            let Some(list) = subs.get(&job_id) else {
                debug!(job_id = %job_id, "no subscribers for event");
                return;
            };
            for sub in list {
                match sub.tx.try_send(Arc::clone(&shared)) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        counter!("job_event_drops_total").increment(1);
                        warn!(job_id = %job_id, subscriber = %sub.id, "dropping event for slow subscriber");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        closed.push(sub.id.clone());
                    }
                }
            }
        }

        if !closed.is_empty() {
            let mut subs = self.subscribers.write().await;
            if let Some(list) = subs.get_mut(&job_id) {
                list.retain(|s| !closed.contains(&s.id));
                if list.is_empty() {
                    subs.remove(&job_id);
                }
            }
        }
    }

    pub async fn subscriber_count(&self, job_id: &str) -> usize {
        self.subscribers
            .read()
            .await
            .get(job_id)
            .map_or(0, Vec::len)
    }
}

impl Default for JobBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

//! Change-notification sink for job state transitions.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::types::Job;

/// Receives a snapshot of a job after every store mutation.
///
/// Delivery is fire-and-forget: implementations must not block and their
/// failures never affect store correctness.
pub trait JobEventSink: Send + Sync {
    fn publish(&self, job: &Job);
}

/// Sink that drops every event. Useful for tests and one-shot tools.
#[derive(Debug, Default, Clone)]
pub struct NoopEventSink;

impl JobEventSink for NoopEventSink {
    fn publish(&self, _job: &Job) {}
}

/// Sink backed by a tokio broadcast channel, feeding live subscribers such
/// as a websocket fan-out. Slow subscribers lose old events rather than
/// applying backpressure to the store.
#[derive(Debug, Clone)]
pub struct BroadcastEventSink {
    tx: broadcast::Sender<Job>,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Job> {
        self.tx.subscribe()
    }
}

impl JobEventSink for BroadcastEventSink {
    fn publish(&self, job: &Job) {
        // A send error only means there are currently no subscribers.
        let _ = self.tx.send(job.clone());
    }
}

/// Shared handle type the store holds.
pub type SharedEventSink = Arc<dyn JobEventSink>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::JobStatus;
    use sqlx::types::Uuid;

    fn sample_job() -> Job {
        Job {
            id: Uuid::new_v4(),
            job_type: "ENRICH_ENTRY".into(),
            status: JobStatus::Pending,
            entry_id: Uuid::new_v4(),
            payload_json: None,
            attempts: 0,
            locked_at: None,
            finished_at: None,
            last_error: None,
            last_response: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    #[tokio::test]
    async fn broadcast_delivers_to_subscriber() {
        let sink = BroadcastEventSink::new(16);
        let mut rx = sink.subscribe();
        let job = sample_job();
        sink.publish(&job);
        let received = rx.recv().await.expect("event");
        assert_eq!(received.id, job.id);
    }

    #[test]
    fn publish_without_subscribers_is_silent() {
        let sink = BroadcastEventSink::new(16);
        sink.publish(&sample_job());
    }
}

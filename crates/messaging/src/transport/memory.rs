use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

use super::{Acknowledge, Delivery, DeliveryStream, Transport};
use crate::error::TransportError;

#[derive(Default)]
struct QueueState {
    sender: Option<mpsc::UnboundedSender<(u64, Vec<u8>)>>,
    receiver: Option<mpsc::UnboundedReceiver<(u64, Vec<u8>)>>,
    next_tag: u64,
    published: Vec<Vec<u8>>,
    acked: Vec<u64>,
    rejected: Vec<(u64, bool)>,
    pending: HashMap<u64, Vec<u8>>,
}

impl QueueState {
    fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender: Some(sender),
            receiver: Some(receiver),
            ..Default::default()
        }
    }

    fn push(&mut self, payload: Vec<u8>) {
        self.next_tag += 1;
        let tag = self.next_tag;
        self.pending.insert(tag, payload.clone());
        if let Some(sender) = &self.sender {
            // The receiver lives in this same struct until a consumer takes
            // it; a dropped consumer just leaves the message unsettled.
            let _ = sender.send((tag, payload));
        }
    }
}

type Queues = Arc<Mutex<HashMap<String, QueueState>>>;

/// In-memory broker for tests and single-process runs.
///
/// Each queue supports one consumer. Every publish, ack and reject is
/// recorded so tests can assert on the settlement of each delivery.
#[derive(Clone, Default)]
pub struct InMemoryTransport {
    queues: Queues,
}

impl InMemoryTransport {
    /// Creates a transport with no queues.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every payload published to `queue`, in publish order.
    pub async fn published(&self, queue: &str) -> Vec<Vec<u8>> {
        self.queues
            .lock()
            .await
            .get(queue)
            .map(|q| q.published.clone())
            .unwrap_or_default()
    }

    /// Returns the delivery tags acknowledged on `queue`.
    pub async fn acked(&self, queue: &str) -> Vec<u64> {
        self.queues
            .lock()
            .await
            .get(queue)
            .map(|q| q.acked.clone())
            .unwrap_or_default()
    }

    /// Returns the delivery tags rejected on `queue` with their requeue flag.
    pub async fn rejected(&self, queue: &str) -> Vec<(u64, bool)> {
        self.queues
            .lock()
            .await
            .get(queue)
            .map(|q| q.rejected.clone())
            .unwrap_or_default()
    }

    /// Closes a queue so its consumer stream ends once drained.
    pub async fn close(&self, queue: &str) {
        if let Some(state) = self.queues.lock().await.get_mut(queue) {
            state.sender = None;
        }
    }
}

struct InMemoryAcker {
    queues: Queues,
    queue: String,
    tag: u64,
}

#[async_trait]
impl Acknowledge for InMemoryAcker {
    async fn ack(&self) -> Result<(), TransportError> {
        let mut queues = self.queues.lock().await;
        let state = queues.get_mut(&self.queue).ok_or(TransportError::Settle {
            tag: self.tag,
            reason: format!("queue '{}' does not exist", self.queue),
        })?;
        state.pending.remove(&self.tag);
        state.acked.push(self.tag);
        Ok(())
    }

    async fn reject(&self, requeue: bool) -> Result<(), TransportError> {
        let mut queues = self.queues.lock().await;
        let state = queues.get_mut(&self.queue).ok_or(TransportError::Settle {
            tag: self.tag,
            reason: format!("queue '{}' does not exist", self.queue),
        })?;
        state.rejected.push((self.tag, requeue));
        if let Some(payload) = state.pending.remove(&self.tag)
            && requeue
        {
            state.push(payload);
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn declare_queue(&self, queue: &str) -> Result<(), TransportError> {
        self.queues
            .lock()
            .await
            .entry(queue.to_string())
            .or_insert_with(QueueState::new);
        Ok(())
    }

    async fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        let mut queues = self.queues.lock().await;
        let state = queues
            .entry(queue.to_string())
            .or_insert_with(QueueState::new);
        state.published.push(payload.clone());
        state.push(payload);
        Ok(())
    }

    async fn consume(&self, queue: &str) -> Result<DeliveryStream, TransportError> {
        let receiver = {
            let mut queues = self.queues.lock().await;
            let state = queues
                .entry(queue.to_string())
                .or_insert_with(QueueState::new);
            state.receiver.take().ok_or_else(|| TransportError::Consume {
                queue: queue.to_string(),
                reason: "queue already has a consumer".to_string(),
            })?
        };

        let queues = Arc::clone(&self.queues);
        let queue = queue.to_string();
        let stream = futures_util::stream::unfold(receiver, move |mut receiver| {
            let queues = Arc::clone(&queues);
            let queue = queue.clone();
            async move {
                let (tag, data) = receiver.recv().await?;
                let acker = InMemoryAcker { queues, queue, tag };
                Some((Ok(Delivery::new(tag, data, acker)), receiver))
            }
        });

        Ok(Box::pin(stream))
    }
}

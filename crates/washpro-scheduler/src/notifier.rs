//! Best-effort fan-out of task change events.

use futures::Stream;
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::trace;
use washpro_protocols::TaskEvent;

/// Broadcasts [`TaskEvent`]s to any number of subscribers.
///
/// Publishing never blocks and never fails: with no subscribers the event is
/// dropped, and a subscriber that falls more than `capacity` events behind
/// loses the oldest ones.
#[derive(Clone)]
pub struct EventNotifier {
    sender: broadcast::Sender<TaskEvent>,
}

impl EventNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: TaskEvent) {
        trace!("Publishing {:?} for task '{}'", event.kind, event.task_id);
        // Err only means nobody is listening.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.sender.subscribe()
    }

    /// Subscribe as a stream that silently skips over lagged events.
    pub fn subscribe_stream(&self) -> impl Stream<Item = TaskEvent> + Send + 'static {
        BroadcastStream::new(self.sender.subscribe()).filter_map(|event| event.ok())
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

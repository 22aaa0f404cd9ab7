use crate::handler::Event;
use crossbeam_channel::{unbounded, Receiver, Sender};

/// Sink for verbose event dispatch logging
///
/// Called with the handler slot name, the connection's target address and
/// the event itself, before the event reaches its handler.
pub trait EventLogger: Send + Sync + 'static {
    fn log(&self, name: &str, url: &str, event: &Event);
}

/// Logs dispatches through `tracing` at debug level
#[derive(Debug, Clone, Default)]
pub struct TracingLogger;

impl EventLogger for TracingLogger {
    fn log(&self, name: &str, url: &str, event: &Event) {
        tracing::debug!(target: "resock::events", %url, ?event, "{}", name);
    }
}

/// Buffers formatted dispatch lines until a harness drains them
///
/// Cloning shares the buffer. Lines look like
/// `2024-01-01T00:00:00.000Z resock onopen ws://host Open`.
#[derive(Debug, Clone)]
pub struct BufferedLogger {
    tx: Sender<String>,
    rx: Receiver<String>,
}

impl BufferedLogger {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// Take every buffered line, oldest first
    pub fn drain(&self) -> Vec<String> {
        self.rx.try_iter().collect()
    }

    /// Number of lines waiting to be drained
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Default for BufferedLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLogger for BufferedLogger {
    fn log(&self, name: &str, url: &str, event: &Event) {
        let stamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ");
        // Both ends live in self, the channel cannot be disconnected here
        let _ = self
            .tx
            .send(format!("{} resock {} {} {:?}", stamp, name, url, event));
    }
}

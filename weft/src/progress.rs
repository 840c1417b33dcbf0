//! Progress events for long-running transforms
//!
//! Consumers may disconnect at any time; emitting into a dropped channel is
//! silently ignored and the run continues. A periodic keepalive prevents
//! idle-connection timeouts on streaming callers.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// A new pipeline phase began
    Phase { name: String },
    /// The agent invoked a tool
    ToolCall { name: String, detail: String },
    /// A candidate artifact failed schema validation and was fed back
    ValidationFailed { violations: usize },
    /// A chunk finished
    ChunkCompleted {
        chunk: usize,
        items: usize,
        total: usize,
    },
    Keepalive,
    Completed { success: bool, items: usize },
}

/// Fire-and-continue event sink
#[derive(Clone, Default)]
pub struct ProgressSink {
    tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl ProgressSink {
    /// A sink that drops everything
    pub fn disabled() -> Self {
        Self::default()
    }

    /// A connected sink plus its receiver
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Send an event; a disconnected consumer never affects the run
    pub fn emit(&self, event: ProgressEvent) {
        if let Some(ref tx) = self.tx {
            let _ = tx.send(event);
        }
    }

    pub fn phase(&self, name: impl Into<String>) {
        self.emit(ProgressEvent::Phase { name: name.into() });
    }
}

/// Emit keepalives on an interval until the returned handle is aborted
pub fn spawn_keepalive(sink: ProgressSink, period: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.tick().await; // the first tick fires immediately
        loop {
            interval.tick().await;
            sink.emit(ProgressEvent::Keepalive);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_into_dropped_receiver_is_harmless() {
        let (sink, rx) = ProgressSink::channel();
        drop(rx);
        sink.phase("matching"); // must not panic
    }

    #[tokio::test]
    async fn test_keepalive_ticks() {
        let (sink, mut rx) = ProgressSink::channel();
        let handle = spawn_keepalive(sink, Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(45)).await;
        handle.abort();

        let mut keepalives = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, ProgressEvent::Keepalive) {
                keepalives += 1;
            }
        }
        assert!(keepalives >= 2);
    }
}

//! Typed progress/event messages flowing from workers to the supervisor
//! and, ultimately, the controller embedding this library.
//!
//! Built on an `mpsc`-based progress reporting style: producers push
//! `BusMessage`s, the supervisor's event loop drains them. The bus is
//! bounded: producers block rather than drop, since the terminal status of
//! a source must never be lost.

use tokio::sync::mpsc;

const BUS_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub enum RunMode {
    Test,
    Daily,
    Backfill,
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunMode::Test => "TEST",
            RunMode::Daily => "DAILY",
            RunMode::Backfill => "BACKFILL",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone)]
pub enum BusMessage {
    UpdateRow {
        source: String,
        status: String,
        count: Option<u32>,
        details: Option<String>,
        run_id: Option<String>,
        mode: Option<String>,
    },
    Log {
        text: String,
    },
    StatusBar {
        text: String,
    },
    ProgressUpdate {
        source: String,
        status: String,
        found: u32,
        downloaded: u32,
        progress: f32,
        details: String,
    },
    Error {
        source: String,
        run_id: String,
        error: String,
        stack: Option<String>,
    },
    Done,
}

#[derive(Debug, Clone)]
pub struct ProgressBus {
    sender: mpsc::Sender<BusMessage>,
}

pub struct ProgressBusReceiver {
    pub receiver: mpsc::Receiver<BusMessage>,
}

impl ProgressBus {
    #[must_use]
    pub fn new() -> (Self, ProgressBusReceiver) {
        let (sender, receiver) = mpsc::channel(BUS_CAPACITY);
        (Self { sender }, ProgressBusReceiver { receiver })
    }

    pub async fn send(&self, message: BusMessage) {
        if self.sender.send(message).await.is_err() {
            tracing::debug!("progress bus receiver dropped; message discarded");
        }
    }

    pub async fn update_row(&self, source: &str, status: &str, run_id: Option<&str>) {
        self.send(BusMessage::UpdateRow {
            source: source.to_string(),
            status: status.to_string(),
            count: None,
            details: None,
            run_id: run_id.map(String::from),
            mode: None,
        })
        .await;
    }

    pub async fn log(&self, text: impl Into<String>) {
        self.send(BusMessage::Log { text: text.into() }).await;
    }
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new().0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_and_receive_roundtrips() {
        let (bus, mut rx) = ProgressBus::new();
        bus.log("hello").await;
        match rx.receiver.recv().await.expect("message") {
            BusMessage::Log { text } => assert_eq!(text, "hello"),
            other => panic!("unexpected message: {other:?}"),
        }
    }
}

//! Stream event producer.
//!
//! [`EventSink::open`] emits `start`; [`EventSink::exit`] and [`EventSink::error`]
//! consume the sink, so a stream cannot emit anything after its terminal event
//! and cannot emit two of them.

use tokio::sync::mpsc;

use skillpod_core::protocol::StreamEvent;

pub struct EventSink {
    tx: mpsc::Sender<StreamEvent>,
}

impl EventSink {
    /// Emit `start` and return the sink for the rest of the stream.
    pub async fn open(tx: mpsc::Sender<StreamEvent>, command: &str, pid: Option<u32>) -> Self {
        let sink = Self { tx };
        sink.emit(StreamEvent::Start {
            command: command.to_string(),
            pid,
        })
        .await;
        sink
    }

    pub async fn stdout(&self, data: &str) {
        self.emit(StreamEvent::Stdout {
            data: data.to_string(),
        })
        .await;
    }

    pub async fn stderr(&self, data: &str) {
        self.emit(StreamEvent::Stderr {
            data: data.to_string(),
        })
        .await;
    }

    pub async fn timeout(&self, timeout_ms: u64) {
        self.emit(StreamEvent::Timeout { timeout_ms }).await;
    }

    pub async fn exit(self, exit_code: Option<i32>, signal: Option<String>, timed_out: bool) {
        self.emit(StreamEvent::Exit {
            exit_code,
            signal,
            timed_out,
        })
        .await;
    }

    pub async fn error(self, message: impl Into<String>) {
        self.emit(StreamEvent::Error {
            message: message.into(),
        })
        .await;
    }

    async fn emit(&self, event: StreamEvent) {
        // A closed receiver means the client went away; the command still runs
        // to completion under its timeout.
        if self.tx.send(event).await.is_err() {
            tracing::debug!("stream receiver closed");
        }
    }
}

//! JSON-lines output.
//!
//! Writes one JSON object per event:
//!
//! ```json
//! {"sink":"console","sequence":3,"event":{"timestamp":"...","provider_name":"...", ...}}
//! ```
//!
//! `sequence` is the transmission sequence number of the batch the event
//! belonged to, so consumers can detect gaps after a restart.

use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use diagflow_core::error::OutputError;
use diagflow_core::event::EventData;
use diagflow_core::pipeline::{BoxFuture, Output};

#[derive(Serialize)]
struct Line<'a> {
    sink: &'a str,
    sequence: u64,
    event: &'a EventData,
}

/// Output that serializes every event as a JSON line into `W`.
pub struct JsonLinesOutput<W> {
    sink: String,
    writer: Mutex<W>,
}

impl JsonLinesOutput<tokio::io::Stdout> {
    /// Output writing to the process's standard output.
    pub fn stdout(sink: impl Into<String>) -> Self {
        Self::new(sink, tokio::io::stdout())
    }
}

impl<W> JsonLinesOutput<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Output writing to an arbitrary async writer.
    pub fn new(sink: impl Into<String>, writer: W) -> Self {
        Self {
            sink: sink.into(),
            writer: Mutex::new(writer),
        }
    }

    /// Consume the output and return the writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    fn render(&self, events: &[EventData], sequence: u64) -> Result<Vec<u8>, OutputError> {
        let mut buf = Vec::with_capacity(events.len() * 256);
        for event in events {
            let line = Line {
                sink: &self.sink,
                sequence,
                event,
            };
            serde_json::to_writer(&mut buf, &line)
                .map_err(|e| OutputError::Failed(format!("failed to serialize event: {e}")))?;
            buf.push(b'\n');
        }
        Ok(buf)
    }
}

impl<W> Output for JsonLinesOutput<W>
where
    W: AsyncWrite + Unpin + Send,
{
    fn send_events<'a>(
        &'a self,
        events: &'a [EventData],
        transmission_sequence_number: u64,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<(), OutputError>> {
        Box::pin(async move {
            let buf = self.render(events, transmission_sequence_number)?;

            // Batches are rendered outside the lock; only the write is serialized
            let write = async {
                let mut writer = self.writer.lock().await;
                writer.write_all(&buf).await?;
                writer.flush().await?;
                Ok::<_, OutputError>(())
            };

            tokio::select! {
                result = write => result,
                _ = cancel.cancelled() => Err(OutputError::Cancelled),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use diagflow_core::event::LogLevel;

    use super::*;

    fn events() -> Vec<EventData> {
        vec![
            EventData::new("sample", LogLevel::Warning).with_payload("Message", "first"),
            EventData::new("sample", LogLevel::Error).with_payload("Message", "second"),
        ]
    }

    #[tokio::test]
    async fn writes_one_line_per_event() {
        let output = JsonLinesOutput::new("console", Vec::new());
        let cancel = CancellationToken::new();

        output.send_events(&events(), 7, &cancel).await.unwrap();

        let text = String::from_utf8(output.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["sink"], "console");
        assert_eq!(first["sequence"], 7);
        assert_eq!(first["event"]["provider_name"], "sample");
    }

    #[tokio::test]
    async fn empty_batch_writes_nothing() {
        let output = JsonLinesOutput::new("console", Vec::new());
        output
            .send_events(&[], 1, &CancellationToken::new())
            .await
            .unwrap();
        assert!(output.into_inner().is_empty());
    }

    #[tokio::test]
    async fn cancelled_while_writer_is_busy() {
        let output = JsonLinesOutput::new("console", Vec::new());
        let cancel = CancellationToken::new();

        let guard = output.writer.lock().await;
        cancel.cancel();
        let err = output.send_events(&events(), 1, &cancel).await.unwrap_err();
        assert!(matches!(err, OutputError::Cancelled));
        drop(guard);
    }
}

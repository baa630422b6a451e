use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use catalog_common::addon::EnrichedAddonRecord;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::error::SinkError;

/// Destination for finished catalog records.
#[async_trait]
pub trait CatalogSink: Send + Sync {
    async fn send(&self, record: &EnrichedAddonRecord) -> Result<(), SinkError>;

    async fn flush(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Writes one JSON document per line to stdout.
pub struct PrintSink {}

#[async_trait]
impl CatalogSink for PrintSink {
    async fn send(&self, record: &EnrichedAddonRecord) -> Result<(), SinkError> {
        let line = serde_json::to_string(record)?;
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", line)?;

        Ok(())
    }

    async fn flush(&self) -> Result<(), SinkError> {
        std::io::stdout().flush()?;
        Ok(())
    }
}

/// Writes one JSON document per line to a file, truncating it on creation.
pub struct JsonLinesSink {
    writer: tokio::sync::Mutex<BufWriter<File>>,
}

impl JsonLinesSink {
    pub async fn create(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let file = File::create(path).await?;

        Ok(Self {
            writer: tokio::sync::Mutex::new(BufWriter::new(file)),
        })
    }
}

#[async_trait]
impl CatalogSink for JsonLinesSink {
    async fn send(&self, record: &EnrichedAddonRecord) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.writer.lock().await.write_all(&line).await?;

        Ok(())
    }

    async fn flush(&self) -> Result<(), SinkError> {
        self.writer.lock().await.flush().await?;
        Ok(())
    }
}

/// Keeps every record in memory. Clones share the same buffer.
#[derive(Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<EnrichedAddonRecord>>>,
}

impl MemorySink {
    pub fn records(&self) -> Vec<EnrichedAddonRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CatalogSink for MemorySink {
    async fn send(&self, record: &EnrichedAddonRecord) -> Result<(), SinkError> {
        if let Ok(mut records) = self.records.lock() {
            records.push(record.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_common::addon::AddonRecord;
    use tempfile::TempDir;

    fn record(guid: &str) -> EnrichedAddonRecord {
        EnrichedAddonRecord {
            addon: AddonRecord {
                guid: Some(guid.to_string()),
                ..Default::default()
            },
            first_create_date: "2020-01-01".to_string(),
        }
    }

    #[tokio::test]
    async fn test_json_lines_sink_writes_one_record_per_line() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("catalog.jsonl");
        let sink = JsonLinesSink::create(&path).await.unwrap();

        sink.send(&record("a")).await.unwrap();
        sink.send(&record("b")).await.unwrap();
        sink.flush().await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: EnrichedAddonRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first, record("a"));
    }

    #[tokio::test]
    async fn test_memory_sink_clones_share_records() {
        let sink = MemorySink::default();
        let handle = sink.clone();

        sink.send(&record("a")).await.unwrap();

        assert_eq!(handle.len(), 1);
        assert_eq!(handle.records()[0].guid(), Some("a"));
    }
}

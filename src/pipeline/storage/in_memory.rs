use crate::app::ports::IntegratedOutputPort;
use crate::domain::IntegratedRecord;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// In-memory output for collecting integrated rows (tests, dry runs)
#[derive(Clone, Default)]
pub struct InMemoryOutput {
    records: Arc<Mutex<Vec<IntegratedRecord>>>,
}

impl InMemoryOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the rows written so far, in write order
    pub fn records(&self) -> Vec<IntegratedRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl IntegratedOutputPort for InMemoryOutput {
    async fn write_integrated_record(&self, record: &IntegratedRecord) -> Result<()> {
        let mut records = self.records.lock().unwrap();
        records.push(record.clone());
        debug!("Stored row {} for {} / {}", records.len(), record.district, record.crop);
        Ok(())
    }
}

//! RecordingSink - keeps every publish in memory

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use contracts::{Ack, ContractError, Reading, TelemetrySink};
use parking_lot::Mutex;

/// In-memory sink; clones share the same record
#[derive(Clone)]
pub struct RecordingSink {
    name: String,
    published: Arc<Mutex<Vec<Reading>>>,
    failing: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl RecordingSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            published: Arc::new(Mutex::new(Vec::new())),
            failing: Arc::new(AtomicBool::new(false)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Make every subsequent publish fail
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    /// Every successful publish, in order
    pub fn published(&self) -> Vec<Reading> {
        self.published.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.published.lock().len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }
}

impl TelemetrySink for RecordingSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(&mut self, reading: &Reading) -> Result<Ack, ContractError> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(ContractError::sink_write(&self.name, "simulated send failure"));
        }
        self.published.lock().push(reading.clone());
        Ok(Ack::Delivered)
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

//! TelemetrySink trait - outbound delivery interface
//!
//! Defines the abstract interface every telemetry sink implements.

use crate::{ContractError, Reading};

/// Outcome of a single publish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// Handed to the transport
    Delivered,
    /// Swallowed because demo mode is on
    Suppressed,
    /// Nothing to deliver to (e.g. device without credentials)
    Skipped,
}

/// Telemetry output trait
///
/// Sinks never deduplicate: a reading flagged `duplicate` is published twice by
/// the caller with an identical payload.
#[trait_variant::make(TelemetrySink: Send)]
pub trait LocalTelemetrySink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Publish one physical emission of a reading
    ///
    /// # Errors
    /// Returns send error (should include context)
    async fn publish(&mut self, reading: &Reading) -> Result<Ack, ContractError>;

    /// Close sink, releasing transport resources
    async fn close(&mut self) -> Result<(), ContractError>;
}

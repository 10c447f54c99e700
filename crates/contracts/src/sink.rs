//! DataSink trait - output consumer interface
//!
//! Defines the abstract interface for consumers of the new-frame event.

use crate::{ContractError, FrameEnvelope};

/// Data output trait
///
/// All sink implementations must implement this trait.
#[trait_variant::make(DataSink: Send)]
pub trait LocalDataSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Write one processed frame
    ///
    /// # Errors
    /// Returns write error (should include context)
    async fn write(&mut self, envelope: &FrameEnvelope) -> Result<(), ContractError>;

    /// Flush buffer (if any)
    async fn flush(&mut self) -> Result<(), ContractError>;

    /// Close sink
    async fn close(&mut self) -> Result<(), ContractError>;
}

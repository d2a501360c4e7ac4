//! Harvest module - the checkpointed, paginated harvest loop.
//!
//! This module provides the core of the harvester:
//! - **Runner**: [`runner::Harvester`], the sequential descriptor/page loop
//! - **Reporting**: [`runner::HarvestReport`] run statistics
//! - **Cancellation**: [`runner::ShutdownSignal`], observed between iterations
//! - **Errors**: [`runner::HarvestError`] for fatal (storage) failures

pub mod runner;

// Re-export commonly used types
pub use runner::{Harvester, HarvestError, HarvestReport, ShutdownSignal};

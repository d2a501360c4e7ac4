pub mod checkpoint;
pub mod client;
pub mod config;
pub mod harvest;
pub mod model;
pub mod query;
pub mod storage;
pub mod traits;

// Re-export common types for convenience
pub use checkpoint::*;
pub use client::*;
pub use config::*;
pub use model::*;
pub use query::*;
pub use storage::*;
pub use traits::*;

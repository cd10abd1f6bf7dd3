/// Shared types for the staking distribution client
///
/// This crate provides the records, constants, error taxonomy and token-unit
/// conversions used by the client engine and its presentation layers.

pub mod account;
pub mod constants;
pub mod errors;
pub mod operation;
pub mod pool;
pub mod units;

// Re-export all public types
pub use account::*;
pub use constants::*;
pub use errors::*;
pub use operation::*;
pub use pool::*;
pub use units::*;

pub use primitive_types::U256;

/// Result type alias using the shared error type
pub type StakeResult<T> = std::result::Result<T, StakeError>;

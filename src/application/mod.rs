// Application layer - the transfer orchestrator.
// Parses decimal text at the boundary and maps store failures
// into domain error kinds. All locking lives in the storage layer.

pub mod error;
pub mod service;

pub use error::*;
pub use service::*;

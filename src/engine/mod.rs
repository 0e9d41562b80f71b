//! Academic evaluation and ledger engine. Each module works on a tenant's
//! connection and raises [`EngineError`]; none of them know about the IPC
//! envelope.

pub mod appreciations;
pub mod averaging;
pub mod curriculum;
pub mod directory;
pub mod error;
pub mod finance;
pub mod grades;
pub mod promotion;
pub mod settings;

#[cfg(test)]
pub(crate) mod testing;

pub use error::EngineError;

pub(crate) fn now_stamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

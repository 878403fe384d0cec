//! Error taxonomy and report types shared across `lumi-fieldcrypt` crates.

pub mod error;
pub mod protocol;

pub use error::{DecryptFailure, FieldError};
pub use protocol::RecordRef;

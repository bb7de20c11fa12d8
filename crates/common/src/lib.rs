//! Common utilities and types shared across the oaiharvest crates.

pub mod encoding;
pub mod error;
pub mod hash;
pub mod timestamp;

pub use encoding::TextEncoding;
pub use error::{Error, Result};
pub use timestamp::Timestamp;

//! Types shared by the flowctl crates

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;

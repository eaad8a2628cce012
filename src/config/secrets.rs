//! Secret handling utilities.
//!
//! Re-exports secrecy types used for platform credentials so they never
//! end up in logs or `Debug` output.

pub use secrecy::{ExposeSecret, SecretString};

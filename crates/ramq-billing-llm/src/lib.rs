//! Chat-completion wrapper for RAMQ billing code suggestions.
//!
//! This crate builds prompts, prices calls and parses model output. The HTTP
//! client lives behind the `remote` feature so local-only builds never link a
//! TLS stack.

pub mod extraction;
pub mod pricing;
pub mod prompts;

#[cfg(feature = "remote")]
pub mod client;

pub use extraction::*;
pub use pricing::*;
pub use prompts::*;

#[cfg(feature = "remote")]
pub use client::OpenAiClient;

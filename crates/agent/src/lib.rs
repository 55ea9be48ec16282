//! Grounded question answering over the Gemini File Search store.
//!
//! The query boundary is deliberately infallible: backend faults degrade to a
//! user-facing error string (or the ungrounded fallback prompt) instead of
//! propagating, so the dispatcher never sees an exception from this crate.

pub mod gemini;

pub use gemini::{GeminiClient, GeminiError};

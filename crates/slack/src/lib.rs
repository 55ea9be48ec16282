//! Slack Integration - Events API webhook pipeline
//!
//! This crate provides the inbound event-processing pipeline for propbot:
//! - **Signature verification** (`signature`) - `v0=` HMAC request authentication
//! - **Duplicate suppression** (`dedupe`) - atomic processed-event registry
//! - **Event envelopes** (`events`) - `url_verification` / `event_callback` wire types
//! - **Trigger evaluation** (`trigger`) - keyword-listen and mention variants
//! - **Block Kit** (`blocks`) - answer message rendering with source citations
//! - **Chat client** (`client`) - `chat.postMessage` / `chat.delete`
//! - **Dispatch** (`dispatch`) - the per-event state machine tying it together
//!
//! # Architecture
//!
//! ```text
//! raw HTTP body → verify → parse → dedupe → trigger
//!                                    ↓
//!        placeholder → QuestionService → swap in final reply
//! ```
//!
//! The question-answering backend is reached through the `QuestionService`
//! trait; the server crate wires it to the Gemini client.

pub mod blocks;
pub mod client;
pub mod dedupe;
pub mod dispatch;
pub mod events;
pub mod signature;
pub mod trigger;

//! Streaming chat completions client for Chatbox.
//!
//! # Architecture
//!
//! - [`sse`] — line reassembly and `data: ` payload parsing
//! - [`client::ChatClient`] — request construction, streaming/plain
//!   dispatch, and cancellation

pub mod client;
pub mod sse;

// Re-export main types for convenience
pub use client::{ChatClient, ChatError, ChatSink};
pub use sse::{SseEvent, SseLineBuffer};

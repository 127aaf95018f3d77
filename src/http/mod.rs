//! HTTP protocol implementation.
//!
//! A deliberately small HTTP/1.x: one GET request per connection, no request
//! bodies, no keep-alive.
//!
//! # Architecture
//!
//! - **`handler`**: The per-connection state machine driven by readiness events
//! - **`parser`**: Matches a received buffer against the request grammar
//! - **`request`**: Parsed request representation
//! - **`reply`**: Status code plus content, serialized and sent incrementally
//! - **`content`**: File-backed and text-backed reply bodies
//! - **`mime`**: MIME type detection based on file extensions
//!
//! # Connection State Machine
//!
//! ```text
//!        ┌─────────────┐
//!        │    Idle     │
//!        └──────┬──────┘
//!               │ readable
//!               ▼
//!        ┌─────────────┐
//!        │  Receiving  │ ← Read until "\r\n\r\n" or EOF
//!        └──────┬──────┘
//!               │ Request received
//!               ▼
//!        ┌─────────────┐
//!        │   Parsed    │ ← Parse, resolve against the cache
//!        └──────┬──────┘
//!               │ Reply built (200/304/400/404/405)
//!               ▼
//!        ┌─────────────┐
//!        │  Replying   │ ← Prepare; a failed prepare becomes a 404
//!        └──────┬──────┘
//!               ▼
//!        ┌─────────────┐
//!        │  Draining   │ ← Send; switch to write interest while bytes remain
//!        └──────┬──────┘
//!               │ Sent, transport shut down
//!               ▼
//!        ┌─────────────┐
//!        │   Closed    │
//!        └─────────────┘
//! ```
//!
//! Any I/O error jumps straight to `Closed`.

pub mod content;
pub mod handler;
pub mod mime;
pub mod parser;
pub mod reply;
pub mod request;

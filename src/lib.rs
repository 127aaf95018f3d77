//! Lantern - Non-blocking static file server
//!
//! Core library: connection reactor, HTTP handling and the file cache.

pub mod cache;
pub mod config;
pub mod http;
pub mod server;

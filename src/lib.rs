//! reelpipe - fetch media from a URL and transcode it with ffmpeg
//!
//! This library crate exposes the coordinator, config and HTTP server for
//! integration testing.

pub mod config;
pub mod coordinator;
pub mod server;

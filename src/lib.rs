//! Custom table designer: combines shape, base and finish reference images
//! (and optionally a room photo) into one generated product image.
//!
//! Requests are composed here, sent to a Gemini image model as a single
//! streamed call, and every image in the streamed answer is written to the
//! output directory.

pub mod ai;
pub mod app;
pub mod catalog;
pub mod composer;
pub mod demux;
pub mod error;
pub mod models;
pub mod prompts;
pub mod server;

pub use error::{Error, Result};

#![allow(clippy::uninlined_format_args)]

pub mod clipboard;
pub mod config;
pub mod feedback;
pub mod logging;
pub mod markdown;
pub mod media;
pub mod projection;
pub mod render;
pub mod reply;
pub mod segment;
pub mod speech;
pub mod video;
pub mod window;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use reply::{ReplyArtifacts, ResponseContent, ResponseView};

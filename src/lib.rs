//! gifthumb - animated GIF previews for remote videos
//!
//! Hexagonal Architecture:
//! - domain/: Pure business logic (snapshot planning, run keys)
//! - ports/: Trait definitions (external command execution)
//! - adapters/: Concrete implementations (ffmpeg processes, disk cache, HTTP)
//! - application/: Process gate, media processor, coalescer, pipeline, service
//! - config: JSON and environment configuration

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod ports;

#[cfg(test)]
mod testing;

// Re-exports for convenience
pub use application::{Delivery, ThumbnailService};
pub use config::{Config, ServerConfig};
pub use error::{ConfigError, InputError, ThumbError};

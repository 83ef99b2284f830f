//! Application layer - The thumbnail core.
//!
//! - `gate`: bounds concurrent external processes
//! - `processor`: ffprobe/ffmpeg operations run through the gate
//! - `coalescer`: one run per URL, followers wait on the leader
//! - `pipeline`: probe, capture, assemble, publish
//! - `service`: cache lookup and coalescing around the pipeline

pub mod coalescer;
pub mod gate;
pub mod pipeline;
pub mod processor;
pub mod service;

pub use service::{Delivery, ThumbnailService};

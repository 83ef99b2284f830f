//! Domain layer - Pure types and arithmetic, no I/O.

pub mod thumbnail;

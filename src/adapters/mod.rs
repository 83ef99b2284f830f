//! Adapters - Concrete implementations of ports and the inbound HTTP layer.

pub mod cache;
pub mod http;
pub mod process;

pub use cache::FsCache;
pub use process::TokioCommandRunner;

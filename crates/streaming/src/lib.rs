//! Tile fetch/cache lifecycle: request, fetch, decode, cache, evict.

pub mod cache;
pub mod config;
pub mod loader;
pub mod retry;
pub mod source;
pub mod state;
pub mod stats;

pub use cache::*;
pub use config::*;
pub use loader::*;
pub use retry::*;
pub use source::*;
pub use state::*;
pub use stats::*;

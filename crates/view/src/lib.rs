//! Viewport side of the engine: camera, tile resolution, animation, and the
//! `SkyView` facade a host drives once per frame.

pub mod animator;
pub mod camera;
pub mod config;
pub mod error;
pub mod overlay;
pub mod resolver;
pub mod viewer;

pub use animator::*;
pub use camera::*;
pub use config::*;
pub use error::*;
pub use overlay::*;
pub use resolver::*;
pub use viewer::*;

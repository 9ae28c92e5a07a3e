pub mod projection;
pub mod sky;
pub mod vec;

pub use projection::*;
pub use sky::*;
pub use vec::*;

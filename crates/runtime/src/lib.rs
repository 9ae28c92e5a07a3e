pub mod clock;
pub mod dispatch;
pub mod observer;

pub use clock::*;
pub use dispatch::*;
pub use observer::*;

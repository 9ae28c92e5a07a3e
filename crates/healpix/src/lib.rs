//! HEALPix tessellation index: NESTED cells, sky regions, and region coverage.

pub mod cell;
pub mod coverage;
pub mod nested;
pub mod region;

pub use cell::*;
pub use coverage::*;
pub use region::*;

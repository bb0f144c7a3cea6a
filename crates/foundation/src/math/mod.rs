pub mod geodesy;
pub mod projection;

pub use geodesy::*;
pub use projection::*;

pub mod navigation;
pub mod point;
pub mod selection;
pub mod world;

pub use navigation::*;
pub use point::*;
pub use selection::*;
pub use world::*;

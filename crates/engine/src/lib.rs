pub mod config;
pub mod engine;
pub mod geolocation;
pub mod search;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use config::*;
pub use engine::*;
pub use geolocation::*;
pub use search::*;

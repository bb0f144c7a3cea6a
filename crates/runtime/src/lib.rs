pub mod event_bus;
pub mod metrics;
pub mod rate_limit;
pub mod timer;

pub use event_bus::*;
pub use metrics::*;
pub use rate_limit::*;
pub use timer::*;

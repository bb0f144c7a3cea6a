pub mod enrich;
pub mod gate;
pub mod request;
pub mod source;
pub mod viewport;

pub use enrich::*;
pub use gate::*;
pub use request::*;
pub use source::*;
pub use viewport::*;

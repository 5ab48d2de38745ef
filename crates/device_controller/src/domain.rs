mod admission_service;
mod forwarding;
mod latency;
mod selection_service;
mod session;
mod upstream;

pub use admission_service::*;
pub use forwarding::*;
pub use latency::*;
pub use selection_service::*;
pub use session::*;
pub use upstream::*;

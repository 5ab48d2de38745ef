mod error;
mod logging;
mod server;

pub use error::*;
pub use logging::*;
pub use server::*;

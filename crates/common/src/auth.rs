mod config;
mod context;
mod jwt;
mod policy;
mod traits;

pub use config::*;
pub use context::*;
pub use jwt::*;
pub use policy::*;
pub use traits::*;

mod connection_handler;
mod server;

pub use connection_handler::*;
pub use server::*;

//! Client-side transport security for upstream gRPC channels.

mod channel;
mod config;
mod security;
mod verifier;

pub use channel::*;
pub use config::*;
pub use security::*;

#[cfg(test)]
pub(crate) mod test_certs;

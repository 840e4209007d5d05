//! HTTP plumbing shared by both directions: the JSON wire types every
//! endpoint speaks, and the outbound client with its fixed deadline.

pub mod client;
pub mod wire;

pub use client::{NetError, NodeClient};

//! # Overlay
//!
//! Membership management for the unstructured HTTP overlay: who we know,
//! who we actively talk to, and how churn is absorbed. Connection slots
//! are balanced between the local group and the rest of the id space so a
//! node keeps both short intra-group paths and long cross-group bridges.

pub mod manager;
pub mod peer;

pub use manager::{BootstrapReport, OverlayManager};
pub use peer::PeerRecord;

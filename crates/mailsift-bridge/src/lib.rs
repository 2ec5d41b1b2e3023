//! Session bridge for the dashboard web origin.
//!
//! The daemon's session reaches the dashboard through a one-time URL
//! parameter; this crate decodes that handoff, maintains the web origin's
//! independent credential replica, and wraps the dashboard's remote calls
//! with the refresh-and-retry-once discipline.

mod bridge;
mod dashboard;
mod error;
mod handoff;

pub use bridge::SessionBridge;
pub use dashboard::DashboardClient;
pub use error::{BridgeError, BridgeResult};
pub use handoff::{
    decode_handoff, encode_handoff_url, handoff_param, strip_handoff, SESSION_PARAM,
};

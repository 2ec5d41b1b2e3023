//! Sync engine and capture service.
//!
//! [`SyncEngine`] reconciles the local capture collection with the remote
//! store; [`CaptureService`] is the entitlement-gated front door for
//! recording sightings, wired to fire an automatic sync when a capture adds
//! new contacts.

mod capture;
mod engine;
mod report;

pub use capture::{CaptureReceipt, CaptureService, EmailExtractor};
pub use engine::SyncEngine;
pub use report::{PullReport, SyncErrorReason, SyncReport};

//! IPC method handlers.

pub mod authorization;
pub mod capture;
pub mod contacts;
pub mod health;
pub mod settings;
pub mod sync;

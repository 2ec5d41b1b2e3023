//! IPC handler registration.

mod handlers;
mod register;

pub use register::register_handlers;

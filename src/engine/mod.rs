//! Background tasks that run alongside the HTTP server.

mod cleanup;

pub use cleanup::*;

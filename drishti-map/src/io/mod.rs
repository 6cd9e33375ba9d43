//! I/O infrastructure: the session client to the actuator node.

mod client;

pub use client::{ClientError, SessionClient};

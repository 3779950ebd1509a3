//! huddle — a connectionless facility-reservation service over UDP.
//!
//! A single server process owns an in-memory schedule of bookable
//! facilities. Clients send discrete request datagrams and receive discrete
//! reply datagrams; the duplicate-suppression layer realises at-least-once
//! or at-most-once invocation semantics over the lossy transport. Clients
//! may also register to receive callback datagrams when a facility's
//! schedule changes.

pub mod client;
pub mod dedup;
pub mod engine;
pub mod model;
pub mod monitor;
pub mod observability;
pub mod server;
pub mod wire;

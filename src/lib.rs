//! Flower client for the Fleet task-exchange protocol.
//!
//! Two transports are available: [`grpc_rere`] registers a node and pulls
//! and pushes tasks with unary calls, [`grpc_bidi`] bridges the legacy
//! bidirectional stream. [`start::start_client`] drives either one with a
//! [`client::Client`] implementation.

pub mod channel;
pub mod client;
pub mod config;
pub mod error;
pub mod grpc_bidi;
pub mod grpc_rere;
pub mod logging;
pub mod message_handler;
pub mod proto;
pub mod serde;
pub mod start;
pub mod task_handler;
pub mod typing;

pub use error::{ClientError, Result};

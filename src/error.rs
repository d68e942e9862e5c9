//! Error types for the Fleet client

use thiserror::Error;

/// Errors surfaced by channel setup, the two transports and the task plumbing
#[derive(Error, Debug)]
pub enum ClientError {
    /// The server address could not be parsed into a URI
    #[error("Invalid server address '{address}': {reason}")]
    InvalidAddress {
        /// The address as given by the caller
        address: String,
        /// Why it was rejected
        reason: String,
    },

    /// The channel could not be configured or connected
    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// A call returned a non-OK gRPC status
    #[error("RPC failed: {0}")]
    Rpc(#[from] tonic::Status),

    /// Reading certificates or configuration failed
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// An operation needs a registered node but none is cached
    #[error("Node instance missing")]
    NodeMissing,

    /// A result was sent while no instruction was pending
    #[error("No current TaskIns")]
    NoPendingTask,

    /// The result failed the structural check and was not submitted
    #[error("TaskRes is invalid")]
    InvalidTaskRes,

    /// The peer sent a record this client cannot interpret
    #[error("Protocol mismatch: {0}")]
    ProtocolMismatch(String),

    /// The task driving the streaming bridge panicked
    #[error("Bridge task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// The configuration file could not be loaded
    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;

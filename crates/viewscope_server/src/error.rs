//! Error types for the inspection server.
//!
//! None of these are fatal to the host process: capture errors shrink one
//! field, session errors end one connection, server errors fail `start`.

use std::io;

use thiserror::Error;
use viewscope_core::NodeError;

/// A capture that could not produce a value. Reported as an absent field.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error(transparent)]
    Node(#[from] NodeError),

    #[error("image encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// A request line that could not be read or understood.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("empty request")]
    EmptyRequest,

    #[error("request line longer than {limit} bytes")]
    RequestTooLong { limit: usize },

    #[error("request is not valid UTF-8")]
    InvalidEncoding,

    #[error("failed to read request: {0}")]
    Io(#[from] io::Error),
}

/// Writing a hierarchy to the client failed mid-stream.
#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("failed to write hierarchy: {0}")]
    Io(#[from] io::Error),
}

/// Why a single connection ended without a complete response.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("unknown command: {0:?}")]
    UnknownCommand(String),

    #[error("no focused root to print")]
    NoFocusedRoot,

    #[error(transparent)]
    Serialize(#[from] SerializeError),

    #[error("socket setup failed: {0}")]
    Io(#[from] io::Error),
}

/// Failures starting the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to spawn {role} thread: {source}")]
    Spawn {
        role: &'static str,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

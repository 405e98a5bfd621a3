use std::io;

/// Error taxonomy for the socket-based communication policy.
///
/// `BufferOverflow` from the source taxonomy is deliberately absent here: a
/// message box that is over its high-water mark is backpressure (the
/// producer blocks), not a failure, so it never surfaces as a `Result::Err`.
#[derive(Debug, thiserror::Error)]
pub enum GraybatError {
    #[error("signaling service at {uri} is unreachable: {source}")]
    SignalingUnreachable { uri: String, source: io::Error },

    #[error("signaling service could not allocate a context for '{name}'")]
    ContextAllocFailed { name: String },

    #[error("failed to bind a socket starting at port {base_port}")]
    BindFailed { base_port: u16 },

    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    #[error("received frame shorter than the {0}-byte header")]
    MalformedMessage(usize),

    #[error("operation issued on an invalid (default-constructed) context")]
    ContextInvalid,

    #[error("unexpected message type on the control channel: {0:?}")]
    ProtocolViolation(crate::frame::MsgType),
}

pub type Result<T> = std::result::Result<T, GraybatError>;

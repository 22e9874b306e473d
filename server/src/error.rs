use protocol::CodecError;
use std::io;
use std::net::SocketAddr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("tried to use a disposed server")]
    AlreadyDisposed,

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Type alias for Results using ServerError
pub type Result<T> = std::result::Result<T, ServerError>;

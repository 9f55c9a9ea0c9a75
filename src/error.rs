use thiserror::Error;

/// Frame-level protocol violations. Fatal to the owning `Transport`.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The four-byte tag id doesn't match any of the fixed wire tags.
    #[error("unknown tag id {0:#010x}")]
    UnknownTag(u32),
    /// The header's magic word isn't the bitwise complement of its tag id.
    #[error("magic mismatch: header magic {magic:#010x} != !tag_id {expected:#010x}")]
    MagicMismatch {
        /// Magic word as read off the wire.
        magic: u32,
        /// What the magic word should have been (`!tag_id`).
        expected: u32,
    },
    /// The payload's checksum doesn't match the header's declared checksum.
    #[error("checksum mismatch: header says {expected:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        /// Checksum declared in the header.
        expected: u32,
        /// Checksum actually computed over the payload bytes.
        computed: u32,
    },
    /// Fewer than 24 bytes were available where a full header was expected.
    #[error("short header: got {0} bytes, need 24")]
    ShortHeader(usize),
    /// The device sent an `AUTH` frame with the wrong step number.
    #[error("bad AUTH step: expected arg0={expected}, got {got}")]
    BadAuthStep {
        /// Step number the handshake expected next.
        expected: u32,
        /// Step number actually received.
        got: u32,
    },
    /// An `OPEN`/`AUTH`/`CNXN` frame arrived outside the handshake.
    #[error("unexpected tag {0:?} outside handshake")]
    UnexpectedTag(crate::codec::Tag),
}

/// Failures of the external bulk-transfer collaborator.
#[derive(Debug, Error)]
pub enum LinkError {
    /// A read or write did not complete within the link's deadline.
    #[error("link read/write timed out")]
    Timeout,
    /// The underlying transport reported an I/O failure.
    #[error("link I/O error: {0}")]
    Io(String),
    /// The link was closed and can no longer be used.
    #[error("link is closed")]
    Closed,
}

/// Failures of the CONNECT/AUTH handshake.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The device demanded authentication but no signers were configured.
    #[error("no signers configured for authenticated device")]
    NoSigners,
    /// Every configured signer's signature was rejected by the device.
    #[error("device rejected every configured signer")]
    AllSignersRejected,
    /// The public-key fallback was sent but the device never approved it in time.
    #[error("accept the RSA fingerprint on the device, then retry")]
    UserApprovalRequired,
    /// A frame-level violation occurred mid-handshake.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// The link failed mid-handshake.
    #[error(transparent)]
    Link(#[from] LinkError),
}

/// Failures local to one `Stream`.
#[derive(Debug, Error)]
pub enum StreamError {
    /// `register` was called on a stream that already has a remote id.
    #[error("remote id already registered")]
    AlreadyRegistered,
    /// A frame referenced a local stream id with no entry in the session table.
    #[error("frame addressed to unknown stream {0}")]
    UnknownStream(u32),
}

/// Caller misuse that a well-behaved API turns into a no-op + warning rather than a hard error.
#[derive(Debug, Error)]
pub enum UsageError {
    /// An operation was attempted before the transport ever connected, or after it died.
    #[error("transport not connected")]
    NotConnected,
    /// `close` was called on a stream that's already closed.
    #[error("stream already closed")]
    AlreadyClosed,
}

/// Unified error type returned by every public core operation.
#[derive(Debug, Error)]
pub enum AdbError {
    /// See [`ProtocolError`].
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// See [`LinkError`].
    #[error(transparent)]
    Link(#[from] LinkError),
    /// See [`AuthError`].
    #[error(transparent)]
    Auth(#[from] AuthError),
    /// See [`StreamError`].
    #[error(transparent)]
    Stream(#[from] StreamError),
    /// See [`UsageError`].
    #[error(transparent)]
    Usage(#[from] UsageError),
}

pub type Result<T> = std::result::Result<T, AdbError>;

use std::io;

/// Framing-level failures from the AudioSocket wire codec.
///
/// Any variant here is fatal to the session that produced it (spec
/// error taxonomy class "Protocol").
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("short read while framing a message")]
    ShortRead(#[source] io::Error),

    #[error("peer closed the connection")]
    Eof,

    #[error("first frame was not an Identifier frame")]
    NotIdentifier,

    #[error("Identifier payload was {0} bytes, expected 16")]
    BadIdentifierLength(usize),

    #[error("failed to write frame")]
    Write(#[source] io::Error),
}

impl FrameError {
    /// `true` when this error represents a clean end-of-stream rather
    /// than a malformed frame. Peer-closed is not a session failure.
    pub fn is_eof(&self) -> bool {
        matches!(self, FrameError::Eof)
    }

    /// `true` when the underlying write failed because the peer is
    /// gone (broken pipe), which the writer treats as caller-hangup
    /// rather than a hard fault.
    pub fn is_broken_pipe(&self) -> bool {
        match self {
            FrameError::Write(e) | FrameError::ShortRead(e) => e.kind() == io::ErrorKind::BrokenPipe,
            _ => false,
        }
    }
}

/// Failures surfaced by an external collaborator facade (STT,
/// translation, assistant, TTS). Spec error taxonomy class
/// "External service" — fatal to the current session, never retried
/// in-band.
#[derive(Debug, thiserror::Error)]
pub enum FacadeError {
    #[error("request to {0} timed out")]
    Timeout(String),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to decode response body: {0}")]
    Decode(String),

    #[error("facade returned a non-success status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("filesystem error while preparing request: {0}")]
    Io(#[from] io::Error),
}

/// Terminal outcome of a Call Session's turn loop. Not all variants
/// are errors in the everyday sense: `PeerClosed` and `Deadline` are
/// normal, expected ways for a call to end (spec §7 policy 2 & 3) and
/// are represented here so the accept loop can log one structured
/// line per call without mistaking a hangup for a crash.
#[derive(Debug)]
pub enum SessionOutcome {
    /// Peer closed the TCP connection (EOF on uplink).
    PeerClosed,
    /// `MaxCallDuration` elapsed; a hangup frame was attempted.
    Deadline,
    /// A `Hangup`/Terminate frame was received or sent outside of the
    /// above two cases.
    Hangup,
    /// The session failed for a reason serious enough to abort the
    /// call (malformed identifier, frame corruption, or a facade
    /// error). The call is always torn down; this is never propagated
    /// to sibling sessions or the accept loop.
    Error(SessionError),
}

/// Session-scoped failure causes, used only for logging context —
/// the session is always the failure boundary (spec §7).
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("protocol error: {0}")]
    Protocol(#[from] FrameError),

    #[error("external service error: {0}")]
    External(#[from] FacadeError),

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// AudioSocket wire protocol.
///
/// Each message is `[kind: u8][len: u16 BE][payload: len bytes]`.
/// Recognized kinds: `0x00` Terminate/Hangup, `0x01` Identifier (16
/// raw bytes), `0xFF` Error, `0x10` SlinAudio (PCM16LE, 8 kHz, mono).
use crate::error::FrameError;
use tokio::io::{ AsyncReadExt, AsyncWriteExt };

pub const KIND_HANGUP: u8 = 0x00;
pub const KIND_ID: u8 = 0x01;
pub const KIND_SLIN: u8 = 0x10;
pub const KIND_ERROR: u8 = 0xff;

/// Length of an Identifier frame's payload: a raw 128-bit UUID.
pub const ID_PAYLOAD_LEN: usize = 16;

/// A decoded AudioSocket frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Kind {
    Hangup,
    Id,
    Slin,
    Error,
    /// Any kind byte this codec doesn't recognize. Payload is kept so
    /// callers can at least log it; per spec, an unknown *mandatory*
    /// kind is a protocol error, but individual messages of unknown
    /// kind otherwise don't abort a session by themselves.
    Unknown(u8),
}

impl Kind {
    fn from_byte(b: u8) -> Kind {
        match b {
            KIND_HANGUP => Kind::Hangup,
            KIND_ID => Kind::Id,
            KIND_SLIN => Kind::Slin,
            KIND_ERROR => Kind::Error,
            other => Kind::Unknown(other),
        }
    }

    fn to_byte(&self) -> u8 {
        match self {
            Kind::Hangup => KIND_HANGUP,
            Kind::Id => KIND_ID,
            Kind::Slin => KIND_SLIN,
            Kind::Error => KIND_ERROR,
            Kind::Unknown(b) => *b,
        }
    }
}

/// A single decoded message: kind plus its opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: Kind,
    pub payload: Vec<u8>,
}

/// Read exactly one frame from `reader`, blocking until the full frame
/// (header + payload) is available.
///
/// Returns `Err(FrameError::Eof)` when the peer closes before sending
/// any bytes of the next frame — this is a clean end-of-stream, not a
/// framing defect. A partial header/payload (peer closes mid-frame)
/// is a `ShortRead`, which is a protocol error per spec.
pub async fn next_message<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Message, FrameError> {
    let mut header = [0u8; 3];

    // read the kind byte first so a clean zero-byte EOF is distinguishable
    // from a short read that happens after the stream has already started
    // a frame.
    let n = reader.read(&mut header[..1]).await.map_err(FrameError::ShortRead)?;
    if n == 0 {
        return Err(FrameError::Eof);
    }

    reader.read_exact(&mut header[1..3]).await.map_err(FrameError::ShortRead)?;

    let kind = Kind::from_byte(header[0]);
    let len = u16::from_be_bytes([header[1], header[2]]) as usize;

    let mut payload = vec![0u8; len];
    if len > 0 {
        reader.read_exact(&mut payload).await.map_err(FrameError::ShortRead)?;
    }

    Ok(Message { kind, payload })
}

/// Read the first frame and require it to be a well-formed Identifier.
/// Returns the raw 16 payload bytes (caller turns them into a UUID).
pub async fn get_id<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<[u8; 16], FrameError> {
    let msg = next_message(reader).await?;
    if msg.kind != Kind::Id {
        return Err(FrameError::NotIdentifier);
    }
    if msg.payload.len() != ID_PAYLOAD_LEN {
        return Err(FrameError::BadIdentifierLength(msg.payload.len()));
    }
    let mut id = [0u8; 16];
    id.copy_from_slice(&msg.payload);
    Ok(id)
}

/// Encode a message as raw AudioSocket bytes.
pub fn encode(kind: &Kind, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(3 + payload.len());
    buf.push(kind.to_byte());
    buf.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    buf.extend_from_slice(payload);
    buf
}

/// Build a SlinAudio frame. Caller is responsible for chunk size.
pub fn slin_message(bytes: &[u8]) -> Vec<u8> {
    encode(&Kind::Slin, bytes)
}

/// Build the zero-payload Terminate/Hangup frame.
pub fn hangup_message() -> Vec<u8> {
    encode(&Kind::Hangup, &[])
}

/// Write a pre-encoded frame to `writer`, distinguishing a broken pipe
/// (peer already gone) from any other write failure.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    frame: &[u8]
) -> Result<(), FrameError> {
    writer.write_all(frame).await.map_err(FrameError::Write)
}

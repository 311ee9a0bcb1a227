use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{RconError, Result};

pub const SERVERDATA_AUTH: i32 = 3;
pub const SERVERDATA_AUTH_RESPONSE: i32 = 2;
pub const SERVERDATA_EXECCOMMAND: i32 = 2;
pub const SERVERDATA_RESPONSE_VALUE: i32 = 0;

/// Request id the server echoes back when the password is wrong.
pub const AUTH_FAILED_ID: i32 = -1;

// id + kind
const HEADER_LEN: usize = 8;
// body terminator + empty string terminator
const PADDING_LEN: usize = 2;
const MAX_FRAME_LEN: usize = 64 * 1024;

// ─── Packet ───────────────────────────────────────────────────────────────

/// One RCON frame: `len:i32le | id:i32le | kind:i32le | body | 0x00 0x00`.
///
/// `len` counts everything after itself. Bodies are ASCII in practice; any
/// invalid UTF-8 coming back from the server is replaced, not rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub id: i32,
    pub kind: i32,
    pub body: String,
}

impl Packet {
    pub fn new(id: i32, kind: i32, body: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            body: body.into(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let len = HEADER_LEN + self.body.len() + PADDING_LEN;
        let mut buf = Vec::with_capacity(len + 4);
        buf.extend_from_slice(&(len as i32).to_le_bytes());
        buf.extend_from_slice(&self.id.to_le_bytes());
        buf.extend_from_slice(&self.kind.to_le_bytes());
        buf.extend_from_slice(self.body.as_bytes());
        buf.extend_from_slice(&[0, 0]);
        buf
    }

    /// Decode the part of a frame that follows the length prefix.
    pub fn decode(frame: &[u8]) -> Result<Self> {
        if frame.len() < HEADER_LEN + PADDING_LEN {
            return Err(RconError::MalformedPacket(format!(
                "frame of {} bytes is shorter than the header",
                frame.len()
            )));
        }
        let id = i32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]);
        let kind = i32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]]);
        let body = &frame[HEADER_LEN..frame.len() - PADDING_LEN];
        // Some servers terminate the body early and pad with extra NULs.
        let body = match body.iter().position(|b| *b == 0) {
            Some(end) => &body[..end],
            None => body,
        };
        Ok(Self {
            id,
            kind,
            body: String::from_utf8_lossy(body).into_owned(),
        })
    }

    pub async fn write_to<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.encode()).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Read one frame. End-of-stream anywhere inside the frame is reported as
    /// [`RconError::ConnectionClosed`].
    pub async fn read_from<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Self> {
        let len = frame_len(reader.read_i32_le().await.map_err(eof_is_closed)?)?;
        let mut frame = vec![0u8; len];
        reader.read_exact(&mut frame).await.map_err(eof_is_closed)?;
        Self::decode(&frame)
    }

    /// Pop the first complete frame off `buf`. `None` while the frame is
    /// still partial; the bytes stay in `buf` for the next attempt.
    pub fn take_from(buf: &mut Vec<u8>) -> Result<Option<Self>> {
        if buf.len() < 4 {
            return Ok(None);
        }
        let len = frame_len(i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]))?;
        if buf.len() < 4 + len {
            return Ok(None);
        }
        let packet = Self::decode(&buf[4..4 + len]);
        buf.drain(..4 + len);
        packet.map(Some)
    }
}

fn frame_len(len: i32) -> Result<usize> {
    usize::try_from(len)
        .ok()
        .filter(|len| (HEADER_LEN + PADDING_LEN..=MAX_FRAME_LEN).contains(len))
        .ok_or_else(|| RconError::MalformedPacket(format!("invalid frame length {len}")))
}

fn eof_is_closed(err: std::io::Error) -> RconError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        RconError::ConnectionClosed
    } else {
        RconError::Io(err)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────

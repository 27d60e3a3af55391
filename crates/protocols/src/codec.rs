// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Framed JSON messages shared by the coordinator and VLANd.
//!
//! Each frame is the JSON body length as 8 upper-case hex digits followed
//! by the body itself.

use lava_core::LavaError;
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Length of the hex header
pub const HEADER_LEN: usize = 8;

/// Largest body a client may send
pub const MAX_CLIENT_MESSAGE: usize = 0xFFFE;

/// Largest body accepted from a peer
pub const MAX_MESSAGE: usize = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Invalid message header: {0:?}")]
    Header(String),
    #[error("Invalid JSON message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Message was too long to send!")]
    TooLong(usize),
    #[error("Incoming message of {0} bytes exceeds the frame limit")]
    Oversized(usize),
    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<CodecError> for LavaError {
    fn from(err: CodecError) -> Self {
        if matches!(err, CodecError::TooLong(_)) {
            LavaError::job(err.to_string())
        } else {
            LavaError::infrastructure(err.to_string())
        }
    }
}

/// Encode a message into one frame
pub fn encode(message: &Value) -> Result<Vec<u8>, CodecError> {
    let body = serde_json::to_string(message)?;
    if body.len() > u32::MAX as usize {
        return Err(CodecError::TooLong(body.len()));
    }
    let mut frame = format!("{:08X}", body.len()).into_bytes();
    frame.extend_from_slice(body.as_bytes());
    Ok(frame)
}

/// Encode a client request, enforcing the client size limit
pub fn encode_request(message: &Value) -> Result<Vec<u8>, CodecError> {
    let frame = encode(message)?;
    let body = frame.len() - HEADER_LEN;
    if body > MAX_CLIENT_MESSAGE {
        return Err(CodecError::TooLong(body));
    }
    Ok(frame)
}

pub async fn write_message<W>(writer: &mut W, message: &Value) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode(message)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame. `None` means the peer closed the stream between frames.
pub async fn read_message<R>(reader: &mut R) -> Result<Option<Value>, CodecError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    let mut filled = 0;
    while filled < HEADER_LEN {
        let n = reader.read(&mut header[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(CodecError::Header(
                String::from_utf8_lossy(&header[..filled]).into_owned(),
            ));
        }
        filled += n;
    }

    let text = std::str::from_utf8(&header)
        .map_err(|_| CodecError::Header(String::from_utf8_lossy(&header).into_owned()))?;
    let len = usize::from_str_radix(text, 16).map_err(|_| CodecError::Header(text.to_string()))?;
    if len > MAX_MESSAGE {
        return Err(CodecError::Oversized(len));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(serde_json::from_slice(&body)?))
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;

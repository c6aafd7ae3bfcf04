//! Length-prefixed framing shared by the handshake (over a plugin's
//! stdin/stdout) and the RPC channel (over its embedded stream
//! endpoint). Grounded on `op-jsonrpc/src/server.rs`'s line-delimited
//! framing idiom, adapted to the binary 4-byte-big-endian length prefix
//! the control protocol also uses (`jack-control/src/framing.rs`).

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use jack_core::{JackError, Result};

/// Refuse to allocate for a frame larger than this; a corrupt or
/// malicious length prefix should fail fast rather than exhaust memory.
pub const MAX_FRAME_BYTES: u32 = 64 * 1024 * 1024;

pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    let len = u32::try_from(payload.len())
        .map_err(|_| JackError::Plugin("frame payload too large to encode".into()))?;
    writer
        .write_all(&len.to_be_bytes())
        .await
        .map_err(JackError::Io)?;
    writer.write_all(payload).await.map_err(JackError::Io)?;
    writer.flush().await.map_err(JackError::Io)
}

pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await.map_err(JackError::Io)?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_BYTES {
        return Err(JackError::Plugin(format!(
            "frame of {len} bytes exceeds the {MAX_FRAME_BYTES} byte limit"
        )));
    }
    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await.map_err(JackError::Io)?;
    Ok(body)
}

pub async fn write_json<W: AsyncWrite + Unpin, T: serde::Serialize>(writer: &mut W, value: &T) -> Result<()> {
    let body = serde_json::to_vec(value)?;
    write_frame(writer, &body).await
}

pub async fn read_json<R: AsyncRead + Unpin, T: serde::de::DeserializeOwned>(reader: &mut R) -> Result<T> {
    let body = read_frame(reader).await?;
    serde_json::from_slice(&body).map_err(JackError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frame_roundtrips() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"hello").await.unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let got = read_frame(&mut cursor).await.unwrap();
        assert_eq!(got, b"hello");
    }

    #[tokio::test]
    async fn oversized_length_prefix_is_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(MAX_FRAME_BYTES + 1).to_be_bytes());
        let mut cursor = std::io::Cursor::new(buf);
        let err = read_frame(&mut cursor).await.unwrap_err();
        assert!(matches!(err, JackError::Plugin(_)));
    }
}

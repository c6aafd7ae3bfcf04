//! Stdio handshake performed once per spawned plugin process, before
//! any RPC traffic flows. The host writes a `HandshakeHello` frame to
//! the child's stdin and reads a `HandshakeAck` frame back from its
//! stdout; the ack's `endpoint` is a unix socket path the host then
//! dials for the real RPC channel. Keeping the handshake and the RPC
//! channel separate means a plugin's stdout stays free for anything
//! else it wants to print during startup without corrupting framing.

use tokio::io::{AsyncRead, AsyncWrite};

use jack_core::{JackError, Result};

use crate::rpc::{HandshakeAck, HandshakeHello, HANDSHAKE_MAGIC, PROTOCOL_VERSION};
use crate::wire::{read_json, write_json};

pub async fn perform_handshake<W, R>(child_stdin: &mut W, child_stdout: &mut R) -> Result<String>
where
    W: AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
{
    let hello = HandshakeHello {
        magic: String::from_utf8_lossy(HANDSHAKE_MAGIC).into_owned(),
        protocol_version: PROTOCOL_VERSION,
    };
    write_json(child_stdin, &hello).await?;

    let ack: HandshakeAck = read_json(child_stdout).await?;
    if ack.protocol_version != PROTOCOL_VERSION {
        return Err(JackError::Plugin(format!(
            "plugin speaks protocol version {}, host expects {}",
            ack.protocol_version, PROTOCOL_VERSION
        )));
    }
    if ack.endpoint.is_empty() {
        return Err(JackError::Plugin("handshake ack carried an empty endpoint".into()));
    }
    Ok(ack.endpoint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_mismatched_protocol_version() {
        let mut stdin_sink: Vec<u8> = Vec::new();
        let ack = HandshakeAck { protocol_version: PROTOCOL_VERSION + 1, endpoint: "/tmp/x.sock".into() };
        let mut ack_bytes = Vec::new();
        crate::wire::write_json(&mut ack_bytes, &ack).await.unwrap();
        let mut stdout_source = std::io::Cursor::new(ack_bytes);

        let err = perform_handshake(&mut stdin_sink, &mut stdout_source).await.unwrap_err();
        assert!(matches!(err, JackError::Plugin(_)));
    }

    #[tokio::test]
    async fn accepts_matching_handshake() {
        let mut stdin_sink: Vec<u8> = Vec::new();
        let ack = HandshakeAck { protocol_version: PROTOCOL_VERSION, endpoint: "/tmp/plugin-foo.sock".into() };
        let mut ack_bytes = Vec::new();
        crate::wire::write_json(&mut ack_bytes, &ack).await.unwrap();
        let mut stdout_source = std::io::Cursor::new(ack_bytes);

        let endpoint = perform_handshake(&mut stdin_sink, &mut stdout_source).await.unwrap();
        assert_eq!(endpoint, "/tmp/plugin-foo.sock");
    }
}

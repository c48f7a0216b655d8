//! Newline-delimited JSON-RPC transport.
//!
//! One JSON-RPC object per line, in both directions, with the same envelope
//! and error semantics as every other transport. This is the shape stdio
//! servers speak. Line transports cannot stream, so tool calls here never
//! get a client bridge.

use crate::engine::Engine;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Serve the engine over a line-oriented byte stream until EOF.
///
/// Blank lines are skipped. Unparseable lines are answered with a
/// `ParseError` response, like any other malformed frame. Notifications
/// produce no output line.
pub async fn serve_lines<R, W>(
    engine: Arc<Engine>,
    reader: R,
    mut writer: W,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    // Line transports carry no session header; the session created by
    // `initialize` is reused for the rest of the connection.
    let mut session_id: Option<String> = None;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let dispatch = engine.handle_text(line, session_id.as_deref()).await;
        if let Some(new_session) = dispatch.new_session {
            session_id = Some(new_session);
        }

        if let Some(response) = dispatch.response {
            let encoded = serde_json::to_string(&response).map_err(std::io::Error::other)?;
            writer.write_all(encoded.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }
    }

    Ok(())
}

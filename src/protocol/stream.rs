//! Line-oriented stream adapter: one JSON-RPC message per input line, one
//! response per output line. Nothing but protocol output is written to the
//! writer; diagnostics go through `tracing` (stderr in the stdio binary).

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use super::jsonrpc::RpcResponse;
use super::{ToolDispatcher, Transport};
use crate::error::GatewayError;

/// Serve until the reader hits EOF.
/// A line that is not UTF-8 gets a -32700 reply and the loop carries on.
pub async fn run_stream<R, W>(dispatcher: &ToolDispatcher, mut reader: R, mut writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::new();
    let mut served = 0u64;
    loop {
        buf.clear();
        let n = reader
            .read_until(b'\n', &mut buf)
            .await
            .context("reading request line")?;
        if n == 0 {
            break;
        }
        let out = match std::str::from_utf8(&buf) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match dispatcher.handle_text(line, Transport::Stdio).await {
                    Some(out) => out,
                    None => {
                        debug!("notification, no reply");
                        continue;
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "request line is not UTF-8");
                let err = GatewayError::Parse(format!("invalid UTF-8: {e}"));
                serde_json::to_string(&RpcResponse::err(Value::Null, &err))
                    .context("encoding parse error")?
            }
        };
        writer
            .write_all(out.as_bytes())
            .await
            .context("writing response")?;
        writer.write_all(b"\n").await.context("writing newline")?;
        writer.flush().await.context("flushing output")?;
        served += 1;
    }
    info!(served, "input closed, stream adapter stopping");
    Ok(())
}

//! Writer task: drains the outbound queue onto the transport.
//!
//! Buffers are written whole and in queue order; a buffer is never
//! interleaved with another. Each individual write carries the rolling I/O
//! deadline.

use std::io;

use bytes::{Buf, Bytes};
use tokio::io::{AsyncWrite, AsyncWriteExt, WriteHalf};
use tokio::sync::{mpsc, watch};
use tokio::time::{timeout, Duration};

use super::Connection;
use crate::error::Result;
use crate::transport::tcp::timed_out;
use crate::transport::BoxedStream;

pub(super) async fn run(
    conn: Connection,
    mut writer: WriteHalf<BoxedStream>,
    mut outbound: mpsc::Receiver<Bytes>,
    mut shutdown: watch::Receiver<bool>,
) {
    let io_timeout = conn.config().io_timeout;
    let result = tokio::select! {
        res = write_loop(&mut writer, &mut outbound, io_timeout) => res,
        _ = shutdown.wait_for(|closed| *closed) => Ok(()),
    };

    // Fail senders still waiting for a slot.
    outbound.close();

    match result {
        Ok(()) => tracing::debug!(peer = %conn.peer_addr(), "writer finished"),
        Err(err) => tracing::error!(peer = %conn.peer_addr(), error = %err, "write failed"),
    }
    let _ = writer.shutdown().await;
    conn.close();
}

async fn write_loop<W>(
    writer: &mut W,
    outbound: &mut mpsc::Receiver<Bytes>,
    io_timeout: Duration,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(buf) = outbound.recv().await {
        tracing::trace!(len = buf.len(), "writing buffer");
        write_buf(writer, buf, io_timeout).await?;
    }
    Ok(())
}

/// Write all of `buf`, continuing after partial writes.
async fn write_buf<W>(writer: &mut W, mut buf: Bytes, io_timeout: Duration) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while buf.has_remaining() {
        let written = match timeout(io_timeout, writer.write(&buf)).await {
            Ok(res) => res?,
            Err(_) => return Err(timed_out("write").into()),
        };
        if written == 0 {
            return Err(io::Error::new(io::ErrorKind::WriteZero, "transport accepted 0 bytes").into());
        }
        buf.advance(written);
    }

    match timeout(io_timeout, writer.flush()).await {
        Ok(res) => Ok(res?),
        Err(_) => Err(timed_out("flush").into()),
    }
}

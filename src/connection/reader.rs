//! Reader task: transport bytes in, complete frames out to the dispatcher.

use tokio::io::{AsyncReadExt, ReadHalf};
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

use super::Connection;
use crate::error::{FramelinkError, Result};
use crate::protocol::{Frame, FrameBuffer};
use crate::transport::tcp::timed_out;
use crate::transport::BoxedStream;

pub(super) async fn run(
    conn: Connection,
    mut reader: ReadHalf<BoxedStream>,
    frames: mpsc::Sender<Frame>,
    mut shutdown: watch::Receiver<bool>,
) {
    let result = tokio::select! {
        res = read_loop(&conn, &mut reader, &frames) => res,
        _ = shutdown.wait_for(|closed| *closed) => Ok(()),
    };

    match result {
        Ok(()) => tracing::debug!(peer = %conn.peer_addr(), "reader finished"),
        Err(FramelinkError::Validation(reason)) => {
            tracing::warn!(peer = %conn.peer_addr(), %reason, "header rejected, closing");
        }
        Err(err) => tracing::error!(peer = %conn.peer_addr(), error = %err, "read failed"),
    }
    conn.close();
}

/// Runs until EOF, a read error, a framing error or the dispatcher going
/// away. Returns `Ok` for the orderly cases.
async fn read_loop(
    conn: &Connection,
    reader: &mut ReadHalf<BoxedStream>,
    frames: &mpsc::Sender<Frame>,
) -> Result<()> {
    let config = conn.config();
    let mut buffer = FrameBuffer::with_max_payload(config.max_payload_size);
    let mut chunk = vec![0u8; config.read_chunk_size.max(1)];

    loop {
        let n = match timeout(config.io_timeout, reader.read(&mut chunk)).await {
            Ok(read) => read?,
            Err(_) => return Err(timed_out("read").into()),
        };
        if n == 0 {
            tracing::debug!(
                peer = %conn.peer_addr(),
                buffered = buffer.len(),
                "peer closed the stream"
            );
            return Ok(());
        }
        buffer.extend(&chunk[..n]);

        while let Some(frame) = buffer.next_frame(|header| conn.handler().on_validate_header(header))? {
            tracing::trace!(cmd = frame.cmd(), size = frame.header.size, "frame received");
            // Blocks while the inbound queue is full.
            if frames.send(frame).await.is_err() {
                return Ok(());
            }
        }
    }
}

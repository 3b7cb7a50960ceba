//! Dedicated writer task for stream transports.
//!
//! Senders never touch the socket: encoded packets go through an mpsc
//! channel to one task that owns the write half, which keeps concurrent
//! `send` calls safe and preserves submission order. Dropping the channel
//! sender (done by `close`) ends the task and shuts the write side down.

use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::connection::ConnectionCore;

/// Spawn the writer task over the transport's write half.
pub(crate) fn spawn_writer_task<W>(
    mut writer: W,
    core: Arc<ConnectionCore>,
    mut rx: mpsc::UnboundedReceiver<Vec<u8>>,
) where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let write_timeout = core.config().write_timeout;
    tokio::spawn(async move {
        loop {
            let bytes = match rx.recv().await {
                Some(bytes) => bytes,
                // Channel dropped by close: clean shutdown.
                None => break,
            };

            let result = tokio::time::timeout(write_timeout, async {
                writer.write_all(&bytes).await?;
                writer.flush().await
            })
            .await;

            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!("connection {}: write error: {}", core.id(), e);
                    core.close();
                    break;
                }
                Err(_) => {
                    tracing::error!("connection {}: write timed out", core.id());
                    core.close();
                    break;
                }
            }
        }
        let _ = writer.shutdown().await;
    });
}

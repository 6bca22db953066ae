//! # Connection-info endpoint.
//!
//! The managed service starts itself under the OS service manager, so the
//! supervisor cannot hand it connection details on a command line. Instead a
//! [`ConnInfoServer`] publishes the details on a local port: every connector
//! receives the payload obtained from
//! [`Communicator::conn_info`](crate::Communicator::conn_info) and the
//! connection is closed.
//!
//! The server is exclusively owned by the supervisor loop, which stops it
//! before starting a new one and before returning.

use std::io;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Local TCP endpoint publishing connection details to the managed service.
pub struct ConnInfoServer {
    port: u16,
    token: CancellationToken,
    accept_loop: Option<JoinHandle<()>>,
}

impl ConnInfoServer {
    /// Binds `127.0.0.1:port` and starts serving `payload` to every connector.
    ///
    /// Port `0` binds an ephemeral port; [`ConnInfoServer::port`] reports the
    /// actual one.
    pub async fn bind(port: u16, payload: Vec<u8>) -> io::Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        let port = listener.local_addr()?.port();
        let token = CancellationToken::new();

        let accept_token = token.clone();
        let accept_loop = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = accept_token.cancelled() => break,
                    accepted = listener.accept() => match accepted {
                        Ok((mut stream, peer)) => {
                            debug!(%peer, "serving connection info");
                            if let Err(err) = stream.write_all(&payload).await {
                                warn!(%peer, error = %err, "failed to write connection info");
                            }
                            let _ = stream.shutdown().await;
                        }
                        Err(err) => warn!(error = %err, "connection info accept failed"),
                    },
                }
            }
        });

        debug!(port, "connection info server started");
        Ok(Self {
            port,
            token,
            accept_loop: Some(accept_loop),
        })
    }

    /// Returns the port the server is bound to.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Stops the accept loop and releases the port. Idempotent, best-effort.
    pub async fn stop(&mut self) {
        self.token.cancel();
        if let Some(accept_loop) = self.accept_loop.take() {
            let _ = accept_loop.await;
        }
        debug!(port = self.port, "connection info server stopped");
    }
}

impl Drop for ConnInfoServer {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

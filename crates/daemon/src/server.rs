//! HTTP server lifecycle.
//!
//! Binds a TCP listener and serves every connection with the shared
//! [`Router`], over HTTP/1.1 or HTTP/2 as negotiated.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::router::Router;

/// A running HTTP server.
pub struct HttpServer {
    /// The actual bound address.
    addr: SocketAddr,
    /// Stops the accept loop when cancelled.
    shutdown_token: CancellationToken,
    /// Accept loop task.
    server_handle: Option<JoinHandle<()>>,
}

impl HttpServer {
    /// Bind `bind_address:port` and start serving. Port 0 picks a free port.
    pub async fn start(router: Arc<Router>, bind_address: &str, port: u16) -> std::io::Result<Self> {
        let listener = TcpListener::bind((bind_address, port)).await?;
        let addr = listener.local_addr()?;

        info!(addr = %addr, "Starting HTTP server");

        let shutdown_token = CancellationToken::new();
        let token = shutdown_token.clone();
        let server_handle = tokio::spawn(async move {
            tokio::select! {
                () = accept_loop(listener, router, token.clone()) => {
                    debug!("Accept loop ended");
                }
                () = token.cancelled() => {
                    debug!("Accept loop received shutdown signal");
                }
            }
        });

        Ok(Self {
            addr,
            shutdown_token,
            server_handle: Some(server_handle),
        })
    }

    /// The bound address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL of this server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Stop accepting connections and close open ones.
    pub async fn stop(mut self) {
        self.shutdown_token.cancel();
        if let Some(handle) = self.server_handle.take() {
            let _ = handle.await;
        }
        info!(addr = %self.addr, "HTTP server stopped");
    }
}

impl Drop for HttpServer {
    fn drop(&mut self) {
        self.shutdown_token.cancel();
        if let Some(handle) = self.server_handle.take() {
            handle.abort();
        }
    }
}

async fn accept_loop(listener: TcpListener, router: Arc<Router>, shutdown_token: CancellationToken) {
    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                debug!(peer = %peer_addr, "Accepted connection");
                let router = Arc::clone(&router);
                let token = shutdown_token.clone();

                tokio::spawn(async move {
                    let io = TokioIo::new(stream);
                    let service = service_fn(move |req: Request<Incoming>| {
                        let router = Arc::clone(&router);
                        async move { Ok::<_, Infallible>(router.handle(req).await) }
                    });

                    let builder = auto::Builder::new(TokioExecutor::new());
                    let connection = builder.serve_connection(io, service);
                    tokio::select! {
                        result = connection => {
                            if let Err(e) = result {
                                warn!(peer = %peer_addr, error = %e, "HTTP connection error");
                            }
                        }
                        () = token.cancelled() => {
                            debug!(peer = %peer_addr, "Closing connection for shutdown");
                        }
                    }
                });
            }
            Err(e) => {
                error!(error = %e, "Failed to accept connection");
            }
        }
    }
}

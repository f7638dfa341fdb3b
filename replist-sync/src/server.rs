//! WebSocket RPC server.
//!
//! One accept loop, one spawned task per connection. Each binary frame is
//! decoded as a [`Request`], dispatched into the [`BatchService`], and
//! answered with exactly one [`Response`] frame. Validation failures are
//! answered with `Response::Error`; undecodable frames likewise, so a
//! confused client hears about it instead of hanging.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;

use crate::protocol::{Request, Response};
use crate::service::BatchService;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_addr: "127.0.0.1:2412".to_string() }
    }
}

/// The RPC front of the batch service.
pub struct RpcServer {
    config: ServerConfig,
    service: Arc<BatchService>,
}

impl RpcServer {
    pub fn new(config: ServerConfig, service: Arc<BatchService>) -> Self {
        Self { config, service }
    }

    /// Run the accept loop until the shutdown signal flips.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), std::io::Error> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("rpc server listening on {}", self.config.bind_addr);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("rpc server: shutdown");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    let (stream, addr) = accepted?;
                    debug!("new connection from {addr}");

                    let service = self.service.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, addr, service).await {
                            error!("connection {addr}: {e}");
                        }
                    });
                }
            }
        }
    }
}

/// Serve one connection: request frame in, response frame out.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    service: Arc<BatchService>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    info!("client connected: {addr}");

    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Binary(data)) => {
                let bytes: Vec<u8> = data.into();
                let response = match Request::decode(&bytes) {
                    Ok(request) => dispatch(&service, request).await,
                    Err(e) => {
                        warn!("undecodable frame from {addr}: {e}");
                        Response::Error { message: e.to_string() }
                    }
                };

                let encoded = response.encode()?;
                ws_sender.send(Message::Binary(encoded.into())).await?;
            }
            Ok(Message::Close(_)) => {
                info!("client disconnected: {addr}");
                break;
            }
            // Pings are answered by the protocol layer; nothing else is
            // part of this wire contract.
            Ok(_) => {}
            Err(e) => {
                warn!("websocket error from {addr}: {e}");
                break;
            }
        }
    }

    Ok(())
}

async fn dispatch(service: &BatchService, request: Request) -> Response {
    match request {
        Request::GetList { client_id } => match service.get_list(client_id) {
            Ok((version, items)) => Response::List { version, items },
            Err(e) => Response::Error { message: e.to_string() },
        },
        Request::GetListUpdates { version } => {
            let (version, ops) = service.get_list_updates(version);
            Response::ListUpdates { version, ops }
        }
        Request::UpdateList { client_id, version, ops } => {
            match service.update_list(client_id, version, ops).await {
                Ok(()) => Response::Ack,
                Err(e) => Response::Error { message: e.to_string() },
            }
        }
    }
}

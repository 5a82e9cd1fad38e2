// src/bridge/socket.rs

//! Websocket transport for the notification bridge.
//!
//! Every connection becomes a [`ChannelClient`]; the bridge itself lives in
//! the coordinator, so connects, inbound frames and disconnects are all
//! forwarded as `RuntimeEvent`s.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bridge::client::{ChannelClient, ClientId};
use crate::engine::RuntimeEvent;

/// A running bridge endpoint.
#[derive(Debug)]
pub struct BridgeServer {
    pub addr: SocketAddr,
    pub handle: JoinHandle<()>,
}

/// Bind `host:port` and serve websocket upgrades on `/`.
///
/// Port 0 picks a free port; the bound address is in the returned
/// [`BridgeServer`].
pub async fn serve_bridge(
    host: &str,
    port: u16,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) -> Result<BridgeServer> {
    let listener = TcpListener::bind((host, port))
        .await
        .with_context(|| format!("binding bridge socket on {host}:{port}"))?;
    let addr = listener.local_addr()?;

    let app = Router::new()
        .route("/", get(websocket_handler))
        .with_state(runtime_tx);

    info!(%addr, "bridge listening");

    let handle = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            warn!(error = %err, "bridge server stopped");
        }
    });

    Ok(BridgeServer { addr, handle })
}

async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(runtime_tx): State<mpsc::Sender<RuntimeEvent>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, runtime_tx))
}

async fn handle_socket(socket: WebSocket, runtime_tx: mpsc::Sender<RuntimeEvent>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let id = ClientId::next();
    let (client, mut outbound) = ChannelClient::new(id);

    if runtime_tx
        .send(RuntimeEvent::ClientConnected {
            client: Arc::new(client),
        })
        .await
        .is_err()
    {
        debug!(client = %id, "runtime gone; dropping connection");
        return;
    }

    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            if ws_sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let event = RuntimeEvent::ClientMessage {
                    client: id,
                    raw: text.as_str().to_owned(),
                };
                if runtime_tx.send(event).await.is_err() {
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                warn!(client = %id, error = %err, "websocket error");
                break;
            }
        }
    }

    let _ = runtime_tx
        .send(RuntimeEvent::ClientDisconnected { client: id })
        .await;
    writer.abort();
}

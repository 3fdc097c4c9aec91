use futures_util::sink::SinkExt;
use futures_util::stream::StreamExt;
use log::{debug, error, info};
use tokio::sync::mpsc;
use warp::ws::WebSocket;

use crate::core::registry::ClientMeta;
use crate::core::server::SharedServerManager;

// Handle a WebSocket connection
pub async fn handle_ws_client(ws: WebSocket, meta: ClientMeta, manager: SharedServerManager) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel();

    // Forward frames from the connection's channel to the WebSocket
    tokio::task::spawn(async move {
        while let Some(message) = rx.recv().await {
            if let Err(e) = ws_tx.send(message).await {
                error!("failed to send WebSocket frame: {}", e);
                break;
            }
        }
    });

    let ticket = manager.connect(tx, &meta);
    info!("client connected: {}", ticket.id);
    info!("current connections: {}", manager.client_count());

    while let Some(result) = ws_rx.next().await {
        match result {
            Ok(msg) => {
                if msg.is_text() {
                    let Ok(text) = msg.to_str() else { continue };
                    if manager.handle_message(&ticket.id, text) {
                        // spam threshold reached: close without a reply
                        break;
                    }
                } else if msg.is_pong() {
                    manager.pong(&ticket.id);
                } else if msg.is_close() {
                    debug!("close frame from {}", ticket.id);
                    break;
                }
            }
            Err(e) => {
                error!("WebSocket error on {}: {}", ticket.id, e);
                break;
            }
        }
    }

    manager.disconnect(&ticket);
    info!("client disconnected: {}", ticket.id);
    info!("current connections: {}", manager.client_count());
}

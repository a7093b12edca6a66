//! Relay message router: fans each signaling message out to every other
//! connected client and announces newcomers with a synthetic join.
//!
//! The relay validates that a frame parses as a [`Signal`] and then
//! re-broadcasts the original text untouched; it never rewrites payloads.

use crate::error::ProtocolError;
use crate::signal::Signal;
use async_tungstenite::tokio::accept_async;
use async_tungstenite::tungstenite::{Message, Utf8Bytes};
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};

const FORWARD_QUEUE_DEPTH: usize = 64;

type ClientMap = Arc<Mutex<HashMap<u64, mpsc::Sender<Message>>>>;

pub struct RelayServer {
    listener: TcpListener,
}

impl RelayServer {
    pub async fn bind(addr: &str) -> std::io::Result<RelayServer> {
        let listener = TcpListener::bind(addr).await?;
        log::info!("relay listening on {}", listener.local_addr()?);
        Ok(RelayServer { listener })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(self) -> std::io::Result<()> {
        let clients: ClientMap = Arc::new(Mutex::new(HashMap::new()));
        let mut next_id: u64 = 0;

        loop {
            let (stream, addr) = self.listener.accept().await?;
            let id = next_id;
            next_id += 1;
            tokio::spawn(handle_client(id, stream, addr, Arc::clone(&clients)));
        }
    }
}

fn synthetic_join() -> Message {
    Message::Text(Utf8Bytes::from(
        serde_json::to_string(&Signal::join()).unwrap_or_default(),
    ))
}

async fn handle_client(id: u64, stream: TcpStream, addr: SocketAddr, clients: ClientMap) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            log::warn!("relay: handshake with {addr} failed: {e}");
            return;
        }
    };
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (tx, mut rx) = mpsc::channel::<Message>(FORWARD_QUEUE_DEPTH);

    // Everyone already in the call learns a participant arrived.
    {
        let mut clients = clients.lock().await;
        for other in clients.values() {
            let _ = other.send(synthetic_join()).await;
        }
        clients.insert(id, tx);
    }
    log::info!("relay: client {id} connected from {addr}");

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = ws_receiver.next().await {
        let Message::Text(text) = msg else {
            continue;
        };
        match serde_json::from_str::<Signal>(&text) {
            Ok(signal) => {
                log::info!("relay: client {id} sent {}", signal.kind());
                let clients = clients.lock().await;
                for (other_id, other) in clients.iter() {
                    if *other_id == id {
                        continue;
                    }
                    if other.send(Message::Text(text.clone())).await.is_err() {
                        log::warn!("relay: client {other_id} unreachable");
                    }
                }
            }
            Err(e) => {
                log::error!(
                    "relay: dropping client {id}: {}",
                    ProtocolError::MalformedSignal(e)
                );
                break;
            }
        }
    }

    clients.lock().await.remove(&id);
    writer.abort();
    log::info!("relay: client {id} disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_tungstenite::tokio::connect_async;
    use std::time::Duration;
    use tokio::time::timeout;

    async fn spawn_relay() -> String {
        let server = RelayServer::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());
        format!("ws://{addr}")
    }

    async fn next_text(
        ws: &mut async_tungstenite::WebSocketStream<
            async_tungstenite::tokio::ConnectStream,
        >,
    ) -> Option<String> {
        loop {
            match timeout(Duration::from_secs(5), ws.next()).await.ok()?? {
                Ok(Message::Text(text)) => return Some(text.to_string()),
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
    }

    #[tokio::test]
    async fn newcomer_triggers_synthetic_join_and_messages_fan_out() {
        let url = spawn_relay().await;

        let (mut first, _) = connect_async(&url).await.unwrap();
        let (mut second, _) = connect_async(&url).await.unwrap();

        // The first client hears about the second one joining.
        let join = next_text(&mut first).await.unwrap();
        assert_eq!(
            serde_json::from_str::<Signal>(&join).unwrap(),
            Signal::join()
        );

        // A message from the second client reaches the first, verbatim.
        let offer = r#"{"type":"offer","content":"v=0"}"#;
        second
            .send(Message::Text(Utf8Bytes::from(offer.to_string())))
            .await
            .unwrap();
        assert_eq!(next_text(&mut first).await.unwrap(), offer);
    }

    #[tokio::test]
    async fn malformed_message_disconnects_the_sender() {
        let url = spawn_relay().await;
        let (mut client, _) = connect_async(&url).await.unwrap();

        client
            .send(Message::Text(Utf8Bytes::from("{not json".to_string())))
            .await
            .unwrap();

        // The relay drops the connection instead of forwarding garbage.
        let end = timeout(Duration::from_secs(5), async {
            loop {
                match client.next().await {
                    None | Some(Err(_)) => break,
                    Some(Ok(Message::Close(_))) => break,
                    Some(Ok(_)) => continue,
                }
            }
        })
        .await;
        assert!(end.is_ok(), "relay kept a client that sent malformed JSON");
    }
}

use crate::error::{NegotiationError, ProtocolError};
use crate::signal::Signal;
use async_tungstenite::tokio::connect_async;
use async_tungstenite::tungstenite::{Message, Utf8Bytes};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

const CHANNEL_DEPTH: usize = 64;

/// Bridge between the relay websocket and the state machine's channels.
///
/// The socket is split once: a writer task owns the sink and drains
/// `outbound`, a reader task owns the stream and feeds `inbound`. The
/// machine never touches the websocket, so every inbound message is
/// processed in arrival order by whoever holds the receiver.
pub struct SignalChannel {
    pub inbound: mpsc::Receiver<Signal>,
    pub outbound: mpsc::Sender<Signal>,
}

impl SignalChannel {
    pub async fn connect(relay_url: &str) -> Result<SignalChannel, NegotiationError> {
        let (ws_stream, _) = connect_async(relay_url).await?;
        log::info!("connected to relay at {relay_url}");

        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::channel::<Signal>(CHANNEL_DEPTH);
        let (in_tx, in_rx) = mpsc::channel::<Signal>(CHANNEL_DEPTH);

        tokio::spawn(async move {
            while let Some(signal) = out_rx.recv().await {
                let text = match serde_json::to_string(&signal) {
                    Ok(text) => text,
                    Err(e) => {
                        log::error!("failed to serialize {} message: {e}", signal.kind());
                        continue;
                    }
                };
                if let Err(e) = ws_sender.send(Message::Text(Utf8Bytes::from(text))).await {
                    log::warn!("relay connection closed while sending: {e}");
                    break;
                }
            }
        });

        tokio::spawn(async move {
            while let Some(Ok(msg)) = ws_receiver.next().await {
                let Message::Text(text) = msg else {
                    continue;
                };
                match serde_json::from_str::<Signal>(&text) {
                    Ok(signal) => {
                        if in_tx.send(signal).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        // A peer speaking garbage on the relay channel is a
                        // lost connection, not a skippable frame.
                        log::error!("relay connection lost: {}", ProtocolError::MalformedSignal(e));
                        break;
                    }
                }
            }
            log::info!("relay reader finished");
        });

        Ok(SignalChannel {
            inbound: in_rx,
            outbound: out_tx,
        })
    }
}

use crate::error::SessionError;
use futures_util::{SinkExt, StreamExt};
use fxlink_protocol::{ClientMessage, ProtocolError, ServerMessage};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

/// What the reader task reports to the session
#[derive(Debug)]
pub enum SignalingEvent {
    Message(ServerMessage),
    /// Text frame that could not be decoded
    Malformed(ProtocolError),
    /// Socket closed; `None` when the peer went away without a close frame
    Closed { code: Option<u16> },
    Failed(String),
}

enum Outbound {
    Message(ClientMessage),
    Close(u16),
}

/// Signaling endpoint with the correlation token appended as `href`
pub fn signaling_url(base: &str, href: &str) -> String {
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{}{}href={}", base, separator, urlencoding::encode(href))
}

/// Writer half of the signaling WebSocket
///
/// Frames are queued to a writer task, so sending never blocks the session.
pub struct SignalingSocket {
    sender: mpsc::UnboundedSender<Outbound>,
}

impl SignalingSocket {
    /// Open the socket, reporting inbound traffic on `events`
    ///
    /// A connection still pending after `slow_after` only logs an error;
    /// the attempt itself is never abandoned or retried.
    pub async fn connect(
        url: &str,
        slow_after: Duration,
        events: mpsc::UnboundedSender<SignalingEvent>,
    ) -> Result<Self, SessionError> {
        let connecting = connect_async(url);
        tokio::pin!(connecting);

        let (ws_stream, _) = match tokio::time::timeout(slow_after, &mut connecting).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::error!("Signaling connection to {} not open after {:?}", url, slow_after);
                connecting.await?
            }
        };
        tracing::info!("Signaling connected to {}", url);

        let (mut write, mut read) = ws_stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();

        // Spawn task to handle outgoing frames
        tokio::spawn(async move {
            while let Some(outbound) = rx.recv().await {
                match outbound {
                    Outbound::Message(msg) => {
                        let text = match msg.to_text() {
                            Ok(text) => text,
                            Err(e) => {
                                tracing::error!("Failed to encode message: {}", e);
                                continue;
                            }
                        };
                        if write.send(Message::Text(text.into())).await.is_err() {
                            tracing::error!("Failed to send signaling message");
                            break;
                        }
                    }
                    Outbound::Close(code) => {
                        let frame = CloseFrame {
                            code: CloseCode::from(code),
                            reason: "".into(),
                        };
                        if let Err(e) = write.send(Message::Close(Some(frame))).await {
                            tracing::debug!("Close frame not sent: {}", e);
                        }
                        break;
                    }
                }
            }
        });

        // Spawn task to handle incoming frames
        tokio::spawn(async move {
            while let Some(result) = read.next().await {
                let event = match result {
                    Ok(Message::Text(text)) => match ServerMessage::parse(&text) {
                        Ok(msg) => SignalingEvent::Message(msg),
                        Err(e) => SignalingEvent::Malformed(e),
                    },
                    Ok(Message::Close(frame)) => {
                        let code = frame.map(|f| u16::from(f.code));
                        tracing::info!("Signaling closed by server, code {:?}", code);
                        let _ = events.send(SignalingEvent::Closed { code });
                        return;
                    }
                    Err(e) => {
                        tracing::error!("Signaling error: {}", e);
                        let _ = events.send(SignalingEvent::Failed(e.to_string()));
                        return;
                    }
                    _ => continue,
                };
                if events.send(event).is_err() {
                    return;
                }
            }
            let _ = events.send(SignalingEvent::Closed { code: None });
        });

        Ok(Self { sender: tx })
    }

    pub fn send(&self, msg: ClientMessage) -> bool {
        tracing::trace!("Sending {}", msg.kind());
        self.sender.send(Outbound::Message(msg)).is_ok()
    }

    /// Close with `code` once every queued frame is written
    pub fn close(&self, code: u16) {
        let _ = self.sender.send(Outbound::Close(code));
    }
}

use futures_util::{SinkExt, StreamExt};
use mh_protocol::ChatEvent;
use std::time::Duration;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::MaybeTlsStream;

const RECV_DEADLINE: Duration = Duration::from_secs(5);

type WsStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Chat client for the room hub.
pub struct MockWsClient {
    write: futures_util::stream::SplitSink<WsStream, Message>,
    read: futures_util::stream::SplitStream<WsStream>,
}

impl MockWsClient {
    /// Connect to `/api/v1/ws/chat` on `addr` with a room and token.
    pub async fn connect(
        addr: &str,
        room: &str,
        token: &str,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let url = format!("ws://{addr}/api/v1/ws/chat?room={room}&token={token}");
        let (ws_stream, _response) = tokio_tungstenite::connect_async(url.as_str()).await?;
        let (write, read) = ws_stream.split();
        Ok(Self { write, read })
    }

    /// Send the inbound chat frame `{"message": ...}`.
    pub async fn send_chat(&mut self, message: &str) -> Result<(), Box<dyn std::error::Error>> {
        let json = serde_json::json!({ "message": message }).to_string();
        self.write.send(Message::Text(json.into())).await?;
        Ok(())
    }

    /// Send an arbitrary text frame (for malformed-input tests).
    pub async fn send_raw(&mut self, text: &str) -> Result<(), Box<dyn std::error::Error>> {
        self.write.send(Message::Text(text.to_owned().into())).await?;
        Ok(())
    }

    /// Next chat event, skipping ping/pong control frames.
    pub async fn recv_event(&mut self) -> Result<ChatEvent, Box<dyn std::error::Error>> {
        loop {
            let frame = tokio::time::timeout(RECV_DEADLINE, self.read.next())
                .await
                .map_err(|_| "timed out waiting for a frame")?;
            match frame {
                Some(Ok(Message::Text(text))) => {
                    return Ok(serde_json::from_str(&text)?);
                }
                Some(Ok(Message::Ping(data))) => {
                    self.write.send(Message::Pong(data)).await?;
                }
                Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) => return Err("connection closed by server".into()),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => return Err("connection stream ended".into()),
            }
        }
    }

    /// Receive until a `message`-type event arrives; returns its body.
    pub async fn recv_chat_message(&mut self) -> Result<String, Box<dyn std::error::Error>> {
        loop {
            if let ChatEvent::Message { message, .. } = self.recv_event().await? {
                return Ok(message);
            }
        }
    }

    pub async fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.write.send(Message::Close(None)).await?;
        Ok(())
    }
}

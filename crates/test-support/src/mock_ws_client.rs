use futures_util::{SinkExt, StreamExt};
use im_protocol::Frame;
use tokio_tungstenite::MaybeTlsStream;
use tokio_tungstenite::tungstenite::protocol::Message;

type WsStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// A minimal client for the Gateway Connection's binary-framed wire
/// protocol, for integration tests that need to drive `ws/v1/connect`
/// without a browser-grade WebSocket stack.
pub struct MockWsClient {
    write: futures_util::stream::SplitSink<WsStream, Message>,
    read: futures_util::stream::SplitStream<WsStream>,
}

impl MockWsClient {
    pub async fn connect(url: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let (ws_stream, _response) = tokio_tungstenite::connect_async(url).await?;
        let (write, read) = ws_stream.split();
        Ok(Self { write, read })
    }

    /// Connect presenting the bearer as a query-param token, entering
    /// `AUTHENTICATED` immediately per §4.3's pre-authenticated path.
    pub async fn connect_with_token(
        base_url: &str,
        token: &str,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let url = format!("{base_url}?token={token}");
        Self::connect(&url).await
    }

    pub async fn send_frame(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
        let bytes = frame.encode()?;
        self.write.send(Message::Binary(bytes.into())).await?;
        Ok(())
    }

    pub async fn recv_frame(&mut self) -> Result<Frame, Box<dyn std::error::Error>> {
        loop {
            match self.read.next().await {
                Some(Ok(Message::Binary(bytes))) => return Ok(Frame::decode(&bytes)?),
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) => return Err("connection closed by server".into()),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => return Err("connection stream ended".into()),
            }
        }
    }

    pub async fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.write.send(Message::Close(None)).await?;
        Ok(())
    }
}

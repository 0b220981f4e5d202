//! Connection transport
//!
//! A client talks to its peer through two halves: a `FrameReader` owned by
//! the read pump and a `FrameWriter` owned by the write pump. The WebSocket
//! implementation splits a `WebSocketStream` into those halves.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::WebSocketStream;
use tracing::debug;

use crate::error::TransportError;

/// Inbound half of a connection
#[async_trait]
pub trait FrameReader: Send {
    /// Wait for the next data frame
    ///
    /// An orderly close surfaces as [`TransportError::Closed`].
    async fn receive_frame(&mut self) -> Result<Vec<u8>, TransportError>;
}

/// Outbound half of a connection
#[async_trait]
pub trait FrameWriter: Send {
    /// Write one text frame and flush it
    async fn write_text_frame(&mut self, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Tell the peer we are closing
    async fn write_close_frame(&mut self) -> Result<(), TransportError>;

    /// Release the connection; closing twice is not an error
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Split an upgraded WebSocket into reader and writer halves
pub fn split<S>(ws: WebSocketStream<S>) -> (WsReader<S>, WsWriter<S>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let (sink, stream) = ws.split();
    (WsReader { stream }, WsWriter { sink })
}

/// Read half of a WebSocket connection
pub struct WsReader<S> {
    stream: SplitStream<WebSocketStream<S>>,
}

/// Write half of a WebSocket connection
pub struct WsWriter<S> {
    sink: SplitSink<WebSocketStream<S>, WsMessage>,
}

#[async_trait]
impl<S> FrameReader for WsReader<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn receive_frame(&mut self) -> Result<Vec<u8>, TransportError> {
        while let Some(msg) = self.stream.next().await {
            match msg {
                Ok(WsMessage::Text(text)) => return Ok(text.into_bytes()),
                Ok(WsMessage::Binary(data)) => return Ok(data),
                Ok(WsMessage::Close(frame)) => {
                    debug!("Peer sent close frame: {:?}", frame);
                    return Err(TransportError::Closed);
                }
                // Ping/Pong are answered by tungstenite itself
                Ok(_) => {}
                Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => {
                    return Err(TransportError::Closed);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(TransportError::Closed)
    }
}

#[async_trait]
impl<S> FrameWriter for WsWriter<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn write_text_frame(&mut self, payload: Vec<u8>) -> Result<(), TransportError> {
        let text = String::from_utf8(payload)?;
        self.sink.send(WsMessage::Text(text)).await?;
        Ok(())
    }

    async fn write_close_frame(&mut self) -> Result<(), TransportError> {
        ignore_closed(self.sink.send(WsMessage::Close(None)).await)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        ignore_closed(self.sink.close().await)
    }
}

/// Treat "already closed" as success when we are closing anyway
fn ignore_closed(result: Result<(), WsError>) -> Result<(), TransportError> {
    match result {
        Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

use async_trait::async_trait;
use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use futures_util::{stream::SplitSink, SinkExt};

use crate::ws::broadcast::Event;
use crate::ws::gateway::{EventSink, GatewayError};

pub type WsSink = SplitSink<WebSocket, Message>;

/// Events are pre-serialized JSON, so they normally go out as text frames.
/// Anything that is not valid UTF-8 is sent as a binary frame instead.
/// Either way the frame shares the event's buffer.
pub fn frame(event: &Event) -> Message {
    let bytes = event.clone().into_bytes();
    match Utf8Bytes::try_from(bytes.clone()) {
        Ok(text) => Message::Text(text),
        Err(_) => Message::Binary(bytes),
    }
}

#[async_trait]
impl EventSink for WsSink {
    async fn write_event(&mut self, event: &Event) -> Result<(), GatewayError> {
        self.send(frame(event)).await.map_err(GatewayError::from)
    }
}

//! The socket abstraction `MediaHandler` is built against. `voice-media`
//! never depends on axum directly; `voice-media-server` adapts an axum
//! `WebSocket` split into these two halves (mirrors the reference
//! server's `SplitSink`/`SplitStream` over an `Arc<Mutex<..>>`).

use async_trait::async_trait;

#[async_trait]
pub trait TransportReceiver: Send {
    /// Returns the next text frame, or `None` once the peer has closed.
    async fn recv(&mut self) -> Option<String>;
}

#[async_trait]
pub trait TransportSender: Send {
    async fn send_text(&mut self, text: String) -> Result<(), crate::error::MediaError>;

    async fn close(&mut self);
}

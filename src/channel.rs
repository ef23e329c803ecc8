//! Duplex message channel to the scheduling backend.
//!
//! A [`Connector`] opens a [`Connection`]: an outbound queue of text frames
//! and an inbound stream of [`ChannelEvent`]s. Sending never blocks and never
//! waits for a reply. Dropping the connection closes it.

use std::fmt;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::identity::ClientIdentity;

/// Something that happened on the inbound side of a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A text frame.
    Message(String),
    /// A transport error. A [`ChannelEvent::Closed`] always follows.
    Error(String),
    /// The channel is gone.
    Closed,
}

/// An open duplex channel.
#[derive(Debug)]
pub struct Connection {
    outbound: mpsc::UnboundedSender<String>,
    inbound: mpsc::UnboundedReceiver<ChannelEvent>,
}

impl Connection {
    /// Assemble a connection from its two halves.
    #[must_use]
    pub fn new(
        outbound: mpsc::UnboundedSender<String>,
        inbound: mpsc::UnboundedReceiver<ChannelEvent>,
    ) -> Self {
        Self { outbound, inbound }
    }

    /// Queue a text frame for transmission.
    pub fn send(&self, frame: String) -> Result<()> {
        if self.outbound.send(frame).is_err() {
            return Err(Error::ChannelClosed);
        }
        Ok(())
    }

    /// Next inbound event; `None` once the transport side is gone.
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        self.inbound.recv().await
    }
}

/// Opens channels.
#[async_trait]
pub trait Connector: Send + Sync + fmt::Debug {
    /// Open a channel to `url`.
    async fn connect(&self, url: &Url) -> Result<Connection>;
}

/// Backend endpoint for a client: `{base}/api/chat/ws/{clientId}`.
pub fn endpoint_url(base: &Url, client_id: &ClientIdentity) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| Error::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
        .pop_if_empty()
        .extend(["api", "chat", "ws", client_id.as_str()]);
    Ok(url)
}

/// WebSocket connector backed by `tokio-tungstenite`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &Url) -> Result<Connection> {
        let (socket, _response) = tokio_tungstenite::connect_async(url.as_str()).await?;
        let (mut sink, mut stream) = socket.split();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (in_tx, in_rx) = mpsc::unbounded_channel();

        // Writer: drains the outbound queue, closes the socket once the
        // connection handle is dropped.
        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                if let Err(e) = sink.send(Message::Text(frame)).await {
                    warn!(name: "chat.channel.send_failed", error = %e, "WebSocket send failed");
                    break;
                }
            }
            if let Err(e) = sink.close().await {
                debug!(error = %e, "WebSocket close failed");
            }
        });

        // Reader: forwards text frames in delivery order.
        tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(Message::Text(text)) => {
                        if in_tx.send(ChannelEvent::Message(text)).is_err() {
                            return;
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        debug!(frame = ?frame, "WebSocket closed by peer");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        let _ = in_tx.send(ChannelEvent::Error(e.to_string()));
                        break;
                    }
                }
            }
            let _ = in_tx.send(ChannelEvent::Closed);
        });

        Ok(Connection::new(out_tx, in_rx))
    }
}

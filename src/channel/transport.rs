use std::{future::Future, pin::Pin};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

use crate::error::MonitorError;

const INBOUND_DEPTH: usize = 64;

pub enum LinkMessage {
    Text(String),
    /// Close the connection after everything queued before it.
    Close,
}

/// One established connection. Dropping `inbound`'s sender side (remote
/// close or transport error) is how a disconnect surfaces.
pub struct Link {
    pub outbound: mpsc::Sender<LinkMessage>,
    pub inbound: mpsc::Receiver<String>,
}

pub type ConnectFuture = Pin<Box<dyn Future<Output = Result<Link, MonitorError>> + Send>>;

pub trait Connector: Send + Sync {
    /// `outbound_depth` bounds how many messages may wait for the writer.
    fn connect(&self, endpoint: Url, outbound_depth: usize) -> ConnectFuture;
}

#[derive(Debug, Default, Clone)]
pub struct WebSocketConnector;

impl Connector for WebSocketConnector {
    fn connect(&self, endpoint: Url, outbound_depth: usize) -> ConnectFuture {
        Box::pin(async move {
            let (socket, _) = connect_async(endpoint.as_str())
                .await
                .map_err(|err| MonitorError::connection(format!("connect to {endpoint} failed: {err}")))?;
            let (mut sink, mut stream) = socket.split();

            let (outbound_tx, mut outbound_rx) = mpsc::channel::<LinkMessage>(outbound_depth.max(1));
            let (inbound_tx, inbound_rx) = mpsc::channel::<String>(INBOUND_DEPTH);

            tokio::spawn(async move {
                while let Some(message) = outbound_rx.recv().await {
                    match message {
                        LinkMessage::Text(text) => {
                            if let Err(err) = sink.send(Message::Text(text)).await {
                                log::debug!("websocket write failed: {err}");
                                break;
                            }
                        }
                        LinkMessage::Close => {
                            let _ = sink.send(Message::Close(None)).await;
                            let _ = sink.close().await;
                            break;
                        }
                    }
                }
            });

            tokio::spawn(async move {
                while let Some(item) = stream.next().await {
                    match item {
                        Ok(Message::Text(text)) => {
                            if inbound_tx.send(text).await.is_err() {
                                break;
                            }
                        }
                        Ok(Message::Close(frame)) => {
                            log::debug!("websocket closed by service: {frame:?}");
                            break;
                        }
                        Ok(_) => {}
                        Err(err) => {
                            log::debug!("websocket read failed: {err}");
                            break;
                        }
                    }
                }
            });

            Ok(Link {
                outbound: outbound_tx,
                inbound: inbound_rx,
            })
        })
    }
}

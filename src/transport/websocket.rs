use anyhow::{anyhow, bail, Context, Result};
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::tungstenite::Error as WsError;
use tracing::{debug, error, info, warn};

use super::messages::{ClientMessage, InboundEvent, SessionSetup};
use super::{Transport, TransportLink};
use crate::audio::codec;
use crate::error::VoiceError;

/// How long `close` waits for the close frame to go out
const CLOSE_GRACE: Duration = Duration::from_millis(500);

/// WebSocket transport settings
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    pub url: String,
    /// Sent as a bearer token when present
    pub api_key: Option<String>,
    /// Upper bound for connect and for the setup acknowledgement
    pub handshake_timeout: Duration,
    /// Depth of the outbound and inbound queues
    pub queue_depth: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8765/live".to_string(),
            api_key: None,
            handshake_timeout: Duration::from_secs(10),
            queue_depth: 64,
        }
    }
}

/// JSON-over-WebSocket transport for the live agent
///
/// Text frames carry one JSON message each. Binary frames from the peer are
/// treated as raw PCM audio chunks.
pub struct WebSocketTransport {
    config: WebSocketConfig,
    task: Option<JoinHandle<()>>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl WebSocketTransport {
    pub fn new(config: WebSocketConfig) -> Self {
        Self {
            config,
            task: None,
            shutdown: None,
        }
    }

    async fn open(&mut self, setup: &SessionSetup) -> Result<TransportLink> {
        let mut request = self
            .config
            .url
            .as_str()
            .into_client_request()
            .context("Invalid transport URL")?;
        if let Some(key) = &self.config.api_key {
            let value: HeaderValue = format!("Bearer {}", key).parse()?;
            request.headers_mut().insert("Authorization", value);
        }

        info!("Connecting to {}...", self.config.url);
        let (ws_stream, _) = tokio::time::timeout(self.config.handshake_timeout, connect_async(request))
            .await
            .context("Timed out connecting")??;

        let (mut write, mut read) = ws_stream.split();

        let setup_json = serde_json::to_string(&ClientMessage::Setup(setup.clone()))?;
        debug!("Sending setup: {}", setup_json);
        write.send(Message::Text(setup_json.into())).await?;

        tokio::time::timeout(self.config.handshake_timeout, await_setup(&mut read))
            .await
            .context("Timed out waiting for setup acknowledgement")??;

        info!("Transport handshake complete");

        let (out_tx, out_rx) = mpsc::channel::<ClientMessage>(self.config.queue_depth.max(1));
        let (in_tx, in_rx) = mpsc::channel::<InboundEvent>(self.config.queue_depth.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            if let Err(e) = pump(write, read, out_rx, in_tx.clone(), shutdown_rx).await {
                error!("Transport error: {:#}", e);
                let _ = in_tx
                    .send(InboundEvent::Error {
                        reason: format!("{:#}", e),
                    })
                    .await;
            }
            info!("Transport task stopped");
        });
        self.task = Some(task);
        self.shutdown = Some(shutdown_tx);

        Ok(TransportLink {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

/// Wait for `setupComplete`, failing on anything else meaningful
async fn await_setup<R>(read: &mut R) -> Result<()>
where
    R: Stream<Item = Result<Message, WsError>> + Unpin,
{
    while let Some(msg) = read.next().await {
        match msg? {
            Message::Text(text) => match InboundEvent::parse(text.as_str()) {
                InboundEvent::SetupComplete => return Ok(()),
                InboundEvent::Error { reason } => bail!("Setup rejected: {}", reason),
                other => bail!("Unexpected message during setup: {:?}", other),
            },
            Message::Close(frame) => bail!("Server closed connection during setup: {:?}", frame),
            _ => {}
        }
    }
    bail!("Connection closed during setup")
}

/// Move messages between the socket and the session channels
async fn pump<W, R>(
    mut write: W,
    mut read: R,
    mut out_rx: mpsc::Receiver<ClientMessage>,
    in_tx: mpsc::Sender<InboundEvent>,
    mut shutdown: oneshot::Receiver<()>,
) -> Result<()>
where
    W: Sink<Message> + Unpin + Send,
    W::Error: std::error::Error + Send + Sync + 'static,
    R: Stream<Item = Result<Message, WsError>> + Unpin + Send,
{
    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if in_tx.send(InboundEvent::parse(text.as_str())).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        let event = InboundEvent::Audio { data: codec::encode(&data) };
                        if in_tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!("Server closed connection: {:?}", frame);
                        let _ = in_tx.send(InboundEvent::Closed).await;
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                    None => return Err(anyhow!("Connection closed")),
                }
            }
            cmd = out_rx.recv() => {
                match cmd {
                    Some(message) => {
                        let json = serde_json::to_string(&message)?;
                        write.send(Message::Text(json.into())).await?;
                    }
                    None => {
                        // Session released its sender
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
            _ = &mut shutdown => {
                debug!("Closing socket");
                let _ = write.send(Message::Close(None)).await;
                break;
            }
        }
    }
    Ok(())
}

#[async_trait::async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&mut self, setup: &SessionSetup) -> Result<TransportLink, VoiceError> {
        if self.task.is_some() {
            return Err(VoiceError::TransportError("Already connected".to_string()));
        }
        self.open(setup)
            .await
            .map_err(|e| VoiceError::TransportError(format!("{:#}", e)))
    }

    fn close(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        let Some(mut task) = self.task.take() else {
            return;
        };

        // Grace period for the close frame. Outside a runtime nothing can
        // drive the pump any more.
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if tokio::time::timeout(CLOSE_GRACE, &mut task).await.is_err() {
                        warn!("Transport did not close in time, aborting");
                        task.abort();
                    }
                });
            }
            Err(_) => task.abort(),
        }
        info!("Transport closed");
    }

    fn name(&self) -> &str {
        "websocket"
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.close();
    }
}

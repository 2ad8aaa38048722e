//! # Client
//!
//! One connection to a distributor, from handshake to close.
//!
//! ## Lifecycle
//! 1. **Authenticating**: the authenticator's handshake payload (if any) is
//!    written and flushed on the raw stream.
//! 2. **Heartbeat subscription**: with heartbeat monitoring on, a
//!    subscription to `__admin__`/`heartbeat` is queued.
//! 3. **Running**: the [`Multiplexer`] yields inbound frames, each routed to
//!    the [`ClientHandler`] before the next one is decoded.
//! 4. **Closed**: after a clean stop the queued outbound messages are flushed
//!    and the write side is shut down; after a fault the stream is abandoned.
//!    `on_closed(is_faulted)` runs exactly once either way.
//!
//! ## Example
//! ```rust,no_run
//! use messagebus_client::protocol::handler::CallbackHandler;
//! use messagebus_client::service::client::Client;
//!
//! # async fn run() -> messagebus_client::error::Result<()> {
//! let client = Client::connect("localhost", 9001, None, None, true).await?;
//! client.add_subscription("LSE", "SBRY")?;
//!
//! let mut handler = CallbackHandler::new();
//! handler.add_data_handler(|data| async move {
//!     println!("{}/{} image={}", data.feed, data.topic, data.is_image);
//!     Ok(())
//! });
//!
//! let handle = client.handle();
//! tokio::spawn(async move {
//!     tokio::time::sleep(std::time::Duration::from_secs(60)).await;
//!     handle.stop();
//! });
//!
//! client.start(&mut handler).await
//! # }
//! ```

use std::ops::Deref;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::{ClientConfig, HEARTBEAT_FEED, HEARTBEAT_TOPIC};
use crate::core::codec::MessageCodec;
use crate::core::packet::{DataPacket, Entitlements};
use crate::error::{ProtocolError, Result};
use crate::protocol::dispatcher::dispatch;
use crate::protocol::handler::ClientHandler;
use crate::protocol::handshake::Authenticator;
use crate::protocol::message::{
    AuthorizationResponse, Message, MulticastData, NotificationRequest, SubscriptionRequest,
    UnicastData,
};
use crate::service::multiplexer::Multiplexer;
use crate::transport::tcp::{self, BoxedStream};
use crate::transport::tls::TlsClientConfig;
use crate::utils::metrics::ConnectionMetrics;

/// Cloneable control surface of a connection.
///
/// Outbound operations only enqueue; they never wait for the network. They
/// fail with [`ProtocolError::ConnectionClosed`] once the connection has
/// shut down.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    sender: UnboundedSender<Message>,
    token: CancellationToken,
    metrics: Arc<ConnectionMetrics>,
}

impl ClientHandle {
    /// Queue any message for sending.
    ///
    /// Empty packet lists, entitlement sets and payloads are replaced with
    /// `None` first, since that is how the peer will decode them.
    pub fn enqueue(&self, message: impl Into<Message>) -> Result<()> {
        let message = message.into().normalized();
        let kind = message.message_type();
        self.sender
            .send(message)
            .map_err(|_| ProtocolError::ConnectionClosed)?;
        self.metrics.frame_enqueued();
        debug!(%kind, "Frame enqueued");
        Ok(())
    }

    /// Answer an authorization request.
    pub fn authorize(
        &self,
        client_id: Uuid,
        feed: impl Into<String>,
        topic: impl Into<String>,
        is_authorization_required: bool,
        entitlements: Option<Entitlements>,
    ) -> Result<()> {
        self.enqueue(AuthorizationResponse {
            client_id,
            feed: feed.into(),
            topic: topic.into(),
            is_authorization_required,
            entitlements,
        })
    }

    /// Publish to every subscriber of `feed`/`topic`.
    pub fn publish(
        &self,
        feed: impl Into<String>,
        topic: impl Into<String>,
        is_image: bool,
        data_packets: Option<Vec<DataPacket>>,
    ) -> Result<()> {
        self.enqueue(MulticastData {
            feed: feed.into(),
            topic: topic.into(),
            is_image,
            data_packets,
        })
    }

    /// Send to a single client.
    pub fn send(
        &self,
        client_id: Uuid,
        feed: impl Into<String>,
        topic: impl Into<String>,
        is_image: bool,
        data_packets: Option<Vec<DataPacket>>,
    ) -> Result<()> {
        self.enqueue(UnicastData {
            client_id,
            feed: feed.into(),
            topic: topic.into(),
            is_image,
            data_packets,
        })
    }

    pub fn add_subscription(&self, feed: impl Into<String>, topic: impl Into<String>) -> Result<()> {
        self.subscription(feed.into(), topic.into(), true)
    }

    pub fn remove_subscription(
        &self,
        feed: impl Into<String>,
        topic: impl Into<String>,
    ) -> Result<()> {
        self.subscription(feed.into(), topic.into(), false)
    }

    /// Ask to be told when other clients subscribe to `feed`.
    pub fn add_notification(&self, feed: impl Into<String>) -> Result<()> {
        self.notification(feed.into(), true)
    }

    pub fn remove_notification(&self, feed: impl Into<String>) -> Result<()> {
        self.notification(feed.into(), false)
    }

    /// Request a clean close. Returns immediately; the run loop exits at its
    /// next suspension point.
    pub fn stop(&self) {
        if !self.token.is_cancelled() {
            info!("Stop requested");
        }
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn metrics(&self) -> &ConnectionMetrics {
        &self.metrics
    }

    fn subscription(&self, feed: String, topic: String, is_add: bool) -> Result<()> {
        self.enqueue(SubscriptionRequest {
            feed,
            topic,
            is_add,
        })
    }

    fn notification(&self, feed: String, is_add: bool) -> Result<()> {
        self.enqueue(NotificationRequest { feed, is_add })
    }
}

/// A connection that has not started yet.
///
/// Derefs to its [`ClientHandle`], so outbound operations may be queued
/// before [`start`](Client::start); they are sent once the run loop begins.
pub struct Client<S> {
    stream: S,
    authenticator: Option<Arc<dyn Authenticator>>,
    monitor_heartbeat: bool,
    codec: MessageCodec,
    queue: UnboundedReceiver<Message>,
    handle: ClientHandle,
}

impl Client<BoxedStream> {
    /// Connect over TCP, wrapped in TLS when `tls` is given.
    #[instrument(skip(authenticator, tls), fields(tls = tls.is_some()))]
    pub async fn connect(
        host: &str,
        port: u16,
        authenticator: Option<Arc<dyn Authenticator>>,
        tls: Option<TlsClientConfig>,
        monitor_heartbeat: bool,
    ) -> Result<Self> {
        let stream = tcp::connect(host, port, tls.as_ref()).await?;
        Ok(Client::new(stream, authenticator, monitor_heartbeat))
    }

    /// Connect using a [`ClientConfig`].
    pub async fn connect_with_config(
        config: &ClientConfig,
        authenticator: Option<Arc<dyn Authenticator>>,
    ) -> Result<Self> {
        let tls = config
            .tls
            .as_ref()
            .map(|settings| settings.to_client_config(&config.host))
            .transpose()?;

        let client = Self::connect(
            &config.host,
            config.port,
            authenticator,
            tls,
            config.monitor_heartbeat,
        )
        .await?;
        Ok(client.with_max_field_length(config.max_field_length))
    }
}

impl<S> Client<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    /// Wrap an already established stream.
    pub fn new(
        stream: S,
        authenticator: Option<Arc<dyn Authenticator>>,
        monitor_heartbeat: bool,
    ) -> Self {
        let (sender, queue) = mpsc::unbounded_channel();
        Self {
            stream,
            authenticator,
            monitor_heartbeat,
            codec: MessageCodec::new(),
            queue,
            handle: ClientHandle {
                sender,
                token: CancellationToken::new(),
                metrics: Arc::new(ConnectionMetrics::new()),
            },
        }
    }

    /// Reject inbound length prefixes above `max_field_length` bytes.
    pub fn with_max_field_length(mut self, max_field_length: usize) -> Self {
        self.codec = MessageCodec::with_max_field_length(max_field_length);
        self
    }

    pub fn handle(&self) -> ClientHandle {
        self.handle.clone()
    }

    /// Run the connection until it is stopped or faults.
    ///
    /// `handler.on_closed` is called exactly once. Returns the fault that
    /// closed the connection, or the error `on_closed` itself returned.
    #[instrument(skip_all, fields(heartbeat = self.monitor_heartbeat))]
    pub async fn start<H: ClientHandler>(self, handler: &mut H) -> Result<()> {
        let Client {
            mut stream,
            authenticator,
            monitor_heartbeat,
            codec,
            queue,
            handle,
        } = self;

        let outcome = async {
            if let Some(authenticator) = &authenticator {
                authenticate(&mut stream, authenticator.as_ref(), &handle.metrics).await?;
            }

            if monitor_heartbeat {
                handle.add_subscription(HEARTBEAT_FEED, HEARTBEAT_TOPIC)?;
            }

            info!("Client running");
            let mut mux = Multiplexer::new(
                stream,
                codec,
                queue,
                handle.token.clone(),
                handle.metrics.clone(),
            );

            while let Some(message) = mux.next().await {
                if let Err(err) = dispatch(handler, message).await {
                    mux.fail(err);
                    break;
                }
                handle.metrics.event_dispatched();
            }

            let outbound = mux.finish().await?;
            outbound.shutdown().await?;
            Ok::<(), ProtocolError>(())
        }
        .await;

        let is_faulted = outcome.is_err();
        if let Err(err) = &outcome {
            warn!(error = %err, "Connection closed with fault");
        } else {
            info!("Connection closed");
        }
        handle.metrics.log_metrics();

        let closed = handler.on_closed(is_faulted).await;
        outcome.and(closed)
    }
}

impl<S> Deref for Client<S> {
    type Target = ClientHandle;

    fn deref(&self) -> &ClientHandle {
        &self.handle
    }
}

async fn authenticate<S>(
    stream: &mut S,
    authenticator: &dyn Authenticator,
    metrics: &ConnectionMetrics,
) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    let mut payload = BytesMut::new();
    authenticator.write_handshake(&mut payload)?;

    if !payload.is_empty() {
        stream
            .write_all(&payload)
            .await
            .map_err(|e| ProtocolError::HandshakeError(e.to_string()))?;
        stream
            .flush()
            .await
            .map_err(|e| ProtocolError::HandshakeError(e.to_string()))?;
    }

    metrics.handshake_written(payload.len() as u64);
    debug!(
        authenticator = authenticator.name(),
        bytes = payload.len(),
        "Handshake written"
    );
    Ok(())
}

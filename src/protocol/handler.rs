//! Application extension points.
//!
//! Inbound frames surface through [`ClientHandler`]. Implement the trait
//! directly to override one method per event, or use [`CallbackHandler`] to
//! register any number of async closures per event. A [`CallbackHandler`]'s
//! lists can be cleared between connections.
//!
//! Handlers run to completion, in registration order, before the next inbound
//! frame is decoded. A slow handler therefore applies backpressure to the
//! connection. An error returned from any handler closes the connection as
//! faulted.

use std::fmt;
use std::future::Future;

use futures::future::BoxFuture;

use crate::core::packet::DataPacket;
use crate::error::Result;
use crate::protocol::message::{
    AuthorizationRequest, ForwardedMulticastData, ForwardedSubscriptionRequest,
    ForwardedUnicastData,
};

/// Published data delivered to a subscriber. Multicast and unicast deliveries
/// share this shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataReceived {
    pub user: String,
    pub host: String,
    pub feed: String,
    pub topic: String,
    pub data_packets: Option<Vec<DataPacket>>,
    pub is_image: bool,
}

impl From<ForwardedMulticastData> for DataReceived {
    fn from(m: ForwardedMulticastData) -> Self {
        Self {
            user: m.user,
            host: m.host,
            feed: m.feed,
            topic: m.topic,
            data_packets: m.data_packets,
            is_image: m.is_image,
        }
    }
}

impl From<ForwardedUnicastData> for DataReceived {
    fn from(m: ForwardedUnicastData) -> Self {
        Self {
            user: m.user,
            host: m.host,
            feed: m.feed,
            topic: m.topic,
            data_packets: m.data_packets,
            is_image: m.is_image,
        }
    }
}

/// Receives the events of one connection.
///
/// Every method defaults to doing nothing.
pub trait ClientHandler: Send {
    /// The distributor asks whether `request.client_id` may subscribe.
    /// Answer with [`ClientHandle::authorize`](crate::service::client::ClientHandle::authorize).
    fn on_authorization(
        &mut self,
        request: AuthorizationRequest,
    ) -> impl Future<Output = Result<()>> + Send {
        let _ = request;
        async { Ok(()) }
    }

    /// Data arrived for a subscribed feed/topic.
    fn on_data(&mut self, data: DataReceived) -> impl Future<Output = Result<()>> + Send {
        let _ = data;
        async { Ok(()) }
    }

    /// Another client changed a subscription on a feed this client listens to.
    fn on_notification(
        &mut self,
        notification: ForwardedSubscriptionRequest,
    ) -> impl Future<Output = Result<()>> + Send {
        let _ = notification;
        async { Ok(()) }
    }

    /// Called exactly once when the connection ends.
    fn on_closed(&mut self, is_faulted: bool) -> impl Future<Output = Result<()>> + Send {
        let _ = is_faulted;
        async { Ok(()) }
    }
}

type Callback<E> = Box<dyn FnMut(E) -> BoxFuture<'static, Result<()>> + Send>;

fn boxed<E, F, Fut>(mut f: F) -> Callback<E>
where
    F: FnMut(E) -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Box::new(move |event| Box::pin(f(event)))
}

async fn run_all<E: Clone>(callbacks: &mut [Callback<E>], event: E) -> Result<()> {
    for callback in callbacks.iter_mut() {
        callback(event.clone()).await?;
    }
    Ok(())
}

/// [`ClientHandler`] that forwards each event to ordered lists of closures.
///
/// ```rust
/// use messagebus_client::protocol::handler::CallbackHandler;
///
/// let mut handler = CallbackHandler::new();
/// handler
///     .add_data_handler(|data| async move {
///         println!("{}/{}: {:?}", data.feed, data.topic, data.data_packets);
///         Ok(())
///     })
///     .add_closed_handler(|is_faulted| async move {
///         println!("closed, faulted={is_faulted}");
///         Ok(())
///     });
/// ```
#[derive(Default)]
pub struct CallbackHandler {
    authorization: Vec<Callback<AuthorizationRequest>>,
    data: Vec<Callback<DataReceived>>,
    notification: Vec<Callback<ForwardedSubscriptionRequest>>,
    closed: Vec<Callback<bool>>,
}

impl CallbackHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_authorization_handler<F, Fut>(&mut self, f: F) -> &mut Self
    where
        F: FnMut(AuthorizationRequest) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.authorization.push(boxed(f));
        self
    }

    pub fn add_data_handler<F, Fut>(&mut self, f: F) -> &mut Self
    where
        F: FnMut(DataReceived) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.data.push(boxed(f));
        self
    }

    pub fn add_notification_handler<F, Fut>(&mut self, f: F) -> &mut Self
    where
        F: FnMut(ForwardedSubscriptionRequest) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.notification.push(boxed(f));
        self
    }

    pub fn add_closed_handler<F, Fut>(&mut self, f: F) -> &mut Self
    where
        F: FnMut(bool) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.closed.push(boxed(f));
        self
    }

    pub fn clear_authorization_handlers(&mut self) -> &mut Self {
        self.authorization.clear();
        self
    }

    pub fn clear_data_handlers(&mut self) -> &mut Self {
        self.data.clear();
        self
    }

    pub fn clear_notification_handlers(&mut self) -> &mut Self {
        self.notification.clear();
        self
    }

    pub fn clear_closed_handlers(&mut self) -> &mut Self {
        self.closed.clear();
        self
    }
}

impl fmt::Debug for CallbackHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackHandler")
            .field("authorization", &self.authorization.len())
            .field("data", &self.data.len())
            .field("notification", &self.notification.len())
            .field("closed", &self.closed.len())
            .finish()
    }
}

impl ClientHandler for CallbackHandler {
    async fn on_authorization(&mut self, request: AuthorizationRequest) -> Result<()> {
        run_all(&mut self.authorization, request).await
    }

    async fn on_data(&mut self, data: DataReceived) -> Result<()> {
        run_all(&mut self.data, data).await
    }

    async fn on_notification(&mut self, notification: ForwardedSubscriptionRequest) -> Result<()> {
        run_all(&mut self.notification, notification).await
    }

    async fn on_closed(&mut self, is_faulted: bool) -> Result<()> {
        run_all(&mut self.closed, is_faulted).await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::error::ProtocolError;
    use std::sync::{Arc, Mutex};

    fn sample() -> DataReceived {
        DataReceived {
            user: "srv".into(),
            host: "h".into(),
            feed: "LSE".into(),
            topic: "SBRY".into(),
            data_packets: None,
            is_image: true,
        }
    }

    #[tokio::test]
    async fn handlers_run_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut handler = CallbackHandler::new();
        for id in 0..3 {
            let log = log.clone();
            handler.add_data_handler(move |data| {
                let log = log.clone();
                async move {
                    log.lock().unwrap().push((id, data.topic));
                    Ok(())
                }
            });
        }

        handler.on_data(sample()).await.unwrap();
        let seen = log.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![(0, "SBRY".to_string()), (1, "SBRY".into()), (2, "SBRY".into())]
        );
    }

    #[tokio::test]
    async fn failing_handler_stops_the_chain() {
        let calls = Arc::new(Mutex::new(0));
        let mut handler = CallbackHandler::new();
        handler.add_closed_handler(|_| async { Err(ProtocolError::handler("boom")) });
        let counter = calls.clone();
        handler.add_closed_handler(move |_| {
            let counter = counter.clone();
            async move {
                *counter.lock().unwrap() += 1;
                Ok(())
            }
        });

        let err = handler.on_closed(true).await.unwrap_err();
        assert!(matches!(err, ProtocolError::Handler(_)));
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn cleared_handlers_no_longer_run() {
        let calls = Arc::new(Mutex::new(0));
        let mut handler = CallbackHandler::new();
        let counter = calls.clone();
        handler.add_data_handler(move |_| {
            let counter = counter.clone();
            async move {
                *counter.lock().unwrap() += 1;
                Ok(())
            }
        });
        handler.add_closed_handler(|_| async { Err(ProtocolError::handler("stale")) });

        handler.on_data(sample()).await.unwrap();
        handler.clear_data_handlers().clear_closed_handlers();
        handler.on_data(sample()).await.unwrap();
        handler.on_closed(false).await.unwrap();

        assert_eq!(*calls.lock().unwrap(), 1);
        assert_eq!(
            format!("{handler:?}"),
            "CallbackHandler { authorization: 0, data: 0, notification: 0, closed: 0 }"
        );
    }

    #[tokio::test]
    async fn empty_lists_are_no_ops() {
        let mut handler = CallbackHandler::new();
        handler.on_data(sample()).await.unwrap();
        handler.on_closed(false).await.unwrap();
        assert_eq!(
            format!("{handler:?}"),
            "CallbackHandler { authorization: 0, data: 0, notification: 0, closed: 0 }"
        );
    }

    #[test]
    fn unicast_and_multicast_normalize_identically() {
        let multicast = ForwardedMulticastData {
            user: "srv".into(),
            host: "h".into(),
            feed: "LSE".into(),
            topic: "SBRY".into(),
            is_image: true,
            data_packets: None,
        };
        let unicast = ForwardedUnicastData {
            user: "srv".into(),
            host: "h".into(),
            client_id: uuid::Uuid::nil(),
            feed: "LSE".into(),
            topic: "SBRY".into(),
            is_image: true,
            data_packets: None,
        };
        assert_eq!(DataReceived::from(multicast), DataReceived::from(unicast));
    }
}

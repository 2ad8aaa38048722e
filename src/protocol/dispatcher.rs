//! # Dispatch
//!
//! Routes decoded frames to [`ClientHandler`] methods. A distributor only
//! sends a client four kinds of frame: authorization requests, forwarded
//! multicast and unicast data, and forwarded subscription changes.

use tracing::{debug, warn};

use crate::error::{ProtocolError, Result};
use crate::protocol::handler::ClientHandler;
use crate::protocol::message::Message;

/// Route one inbound frame to exactly one handler method.
///
/// Frames a client must never receive are a protocol violation and fail with
/// [`ProtocolError::UnexpectedMessage`].
pub async fn dispatch<H: ClientHandler>(handler: &mut H, message: Message) -> Result<()> {
    let kind = message.message_type();
    debug!(%kind, "Dispatching frame");

    match message {
        Message::AuthorizationRequest(request) => handler.on_authorization(request).await,
        Message::ForwardedMulticastData(data) => handler.on_data(data.into()).await,
        Message::ForwardedUnicastData(data) => handler.on_data(data.into()).await,
        Message::ForwardedSubscriptionRequest(notification) => {
            handler.on_notification(notification).await
        }
        Message::MulticastData(_)
        | Message::UnicastData(_)
        | Message::NotificationRequest(_)
        | Message::SubscriptionRequest(_)
        | Message::AuthorizationResponse(_) => {
            warn!(%kind, "Received a frame only a distributor should receive");
            Err(ProtocolError::UnexpectedMessage(kind))
        }
    }
}

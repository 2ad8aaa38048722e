//! # Stream Multiplexer
//!
//! Merges the three activities of one connection into a single ordered
//! sequence of inbound messages:
//!
//! - **read**: decode the next frame from the stream
//! - **drain**: take the next queued outbound message and write it
//! - **cancel**: wait for [`ClientHandle::stop`](crate::service::client::ClientHandle::stop)
//!
//! Each activity is a standing operation that owns its half of the connection
//! for as long as it is pending and hands it back on completion. All pending
//! operations sit in one [`FuturesUnordered`], which is the "first of N"
//! wait: every call to [`Multiplexer::next`] polls them together on the
//! caller's task and reacts to whichever finishes first. A completed read or
//! drain is re-issued with the half it returned.
//!
//! Inbound frames come out in wire order and outbound messages go out in
//! enqueue order. Nothing orders one direction against the other.

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::core::codec::MessageCodec;
use crate::error::{ProtocolError, Result};
use crate::protocol::message::Message;
use crate::utils::metrics::ConnectionMetrics;

type Reader<S> = FramedRead<ReadHalf<S>, MessageCodec>;
type Writer<S> = FramedWrite<WriteHalf<S>, MessageCodec>;

/// Write side of a connection together with its outbound queue.
pub struct Outbound<S> {
    writer: Writer<S>,
    queue: UnboundedReceiver<Message>,
    metrics: Arc<ConnectionMetrics>,
}

impl<S> Outbound<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    async fn send(&mut self, message: Message) -> Result<()> {
        let kind = message.message_type();
        self.writer.send(message).await?;
        self.metrics.frame_sent();
        debug!(%kind, "Frame sent");
        Ok(())
    }

    /// Write whatever is still queued, then signal end-of-stream.
    ///
    /// The queue is closed first, so enqueueing after this point fails with
    /// [`ProtocolError::ConnectionClosed`]. Returns how many queued messages
    /// were flushed.
    pub async fn shutdown(mut self) -> Result<usize> {
        self.queue.close();

        let mut flushed = 0;
        while let Ok(message) = self.queue.try_recv() {
            self.writer.feed(message).await?;
            self.metrics.frame_sent();
            flushed += 1;
        }

        // Flushes buffered frames, then shuts down the write half.
        self.writer.close().await?;
        info!(flushed, "Writer shut down");
        Ok(flushed)
    }
}

enum Completion<S> {
    /// A read finished: a frame, a decode fault, or `None` for EOF.
    Received {
        reader: Reader<S>,
        frame: Option<Result<Message>>,
    },
    /// The read was abandoned because the connection is stopping.
    ReaderParked,
    /// One queued message was written (or failed to be).
    Sent {
        outbound: Outbound<S>,
        result: Result<()>,
    },
    /// The drain found nothing more to do: stopping, or every sender is gone.
    WriterParked(Outbound<S>),
    Cancelled,
}

type Pending<S> = FuturesUnordered<BoxFuture<'static, Completion<S>>>;

async fn read_one<S>(mut reader: Reader<S>, token: CancellationToken) -> Completion<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    // `FramedRead` keeps partial frames in its own buffer, so abandoning
    // `next()` loses no bytes.
    let frame = tokio::select! {
        biased;
        _ = token.cancelled() => return Completion::ReaderParked,
        frame = reader.next() => frame,
    };
    Completion::Received { reader, frame }
}

async fn drain_one<S>(mut outbound: Outbound<S>, token: CancellationToken) -> Completion<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let next = tokio::select! {
        biased;
        _ = token.cancelled() => None,
        message = outbound.queue.recv() => message,
    };

    match next {
        // A send that has started always runs to completion.
        Some(message) => {
            let result = outbound.send(message).await;
            Completion::Sent { outbound, result }
        }
        None => Completion::WriterParked(outbound),
    }
}

async fn wait_for_cancel<S>(token: CancellationToken) -> Completion<S> {
    token.cancelled().await;
    Completion::Cancelled
}

/// Runs the standing operations of one connection.
pub struct Multiplexer<S> {
    pending: Pending<S>,
    token: CancellationToken,
    parked: Option<Outbound<S>>,
    metrics: Arc<ConnectionMetrics>,
    cancelled: bool,
    fault: Option<ProtocolError>,
}

impl<S> Multiplexer<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    /// Split `stream` and start the read, drain and cancel operations.
    pub fn new(
        stream: S,
        codec: MessageCodec,
        queue: UnboundedReceiver<Message>,
        token: CancellationToken,
        metrics: Arc<ConnectionMetrics>,
    ) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        let reader = FramedRead::new(read_half, codec.clone());
        let outbound = Outbound {
            writer: FramedWrite::new(write_half, codec),
            queue,
            metrics: metrics.clone(),
        };

        let pending: Pending<S> = FuturesUnordered::new();
        pending.push(Box::pin(read_one(reader, token.clone())));
        pending.push(Box::pin(drain_one(outbound, token.clone())));
        pending.push(Box::pin(wait_for_cancel(token.clone())));

        Self {
            pending,
            token,
            parked: None,
            metrics,
            cancelled: false,
            fault: None,
        }
    }

    /// Next inbound message in wire order.
    ///
    /// Returns `None` once the connection is cancelled or faulted; after
    /// that it keeps returning `None`.
    pub async fn next(&mut self) -> Option<Message> {
        while !self.cancelled && self.fault.is_none() {
            match self.pending.next().await? {
                Completion::Received { reader, frame } => match frame {
                    Some(Ok(message)) => {
                        self.metrics.frame_received();
                        self.pending
                            .push(Box::pin(read_one(reader, self.token.clone())));
                        return Some(message);
                    }
                    Some(Err(err)) => self.fail(err),
                    None => self.fail(ProtocolError::ConnectionClosed),
                },
                Completion::Sent { outbound, result } => match result {
                    Ok(()) => self
                        .pending
                        .push(Box::pin(drain_one(outbound, self.token.clone()))),
                    Err(err) => self.fail(err),
                },
                Completion::WriterParked(outbound) => self.parked = Some(outbound),
                Completion::ReaderParked | Completion::Cancelled => {
                    debug!("Multiplexer cancelled");
                    self.cancelled = true;
                }
            }
        }
        None
    }

    /// Mark the connection faulted. The first fault wins.
    pub fn fail(&mut self, err: ProtocolError) {
        self.metrics.fault(&err);
        error!(error = %err, "Connection faulted");
        if self.fault.is_none() {
            self.fault = Some(err);
        }
    }

    pub fn is_faulted(&self) -> bool {
        self.fault.is_some()
    }

    /// Wind down the standing operations.
    ///
    /// After a fault the pending operations are dropped and the fault is
    /// returned. Otherwise every operation is asked to stop and awaited, and
    /// the recovered write side is returned for an orderly shutdown. A send
    /// that fails while winding down is reported as a fault.
    pub async fn finish(mut self) -> Result<Outbound<S>> {
        if let Some(err) = self.fault.take() {
            return Err(err);
        }

        self.token.cancel();
        while let Some(completion) = self.pending.next().await {
            match completion {
                Completion::Sent { outbound, result } => {
                    if let Err(err) = result {
                        self.metrics.fault(&err);
                        return Err(err);
                    }
                    self.parked = Some(outbound);
                }
                Completion::WriterParked(outbound) => self.parked = Some(outbound),
                Completion::Received { .. } | Completion::ReaderParked | Completion::Cancelled => {}
            }
        }

        self.parked.ok_or(ProtocolError::ConnectionClosed)
    }
}

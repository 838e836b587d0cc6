//! Live output: model text and progress events on one stream.
//!
//! [`StreamMerger`] runs one producer task per source, both feeding a bounded
//! channel that the [`MergedStream`] reads. Each source keeps its own order;
//! between sources whichever item is ready first goes first. Dropping or
//! cancelling the merged stream aborts both producers.

pub mod vercel;


use futures::{Stream, StreamExt};
use std::pin::{Pin, pin};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, info};

use crate::events::{BusError, EventBus, ProgressEvent};

const DEFAULT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    Text(String),
    Event(ProgressEvent),
}

pub struct StreamMerger {
    bus: Arc<EventBus>,
    mark_done_on_text_end: bool,
    capacity: usize,
}

impl StreamMerger {
    #[inline]
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            mark_done_on_text_end: true,
            capacity: DEFAULT_CAPACITY,
        }
    }

    /// Whether the end of the text stream marks the bus done (default `true`).
    /// When off, the merged stream runs until someone else calls `mark_done`.
    /// When on, the text stream must outlive event production: events
    /// emitted after the text ends may never reach the merged stream.
    #[inline]
    pub fn mark_done_on_text_end(mut self, enabled: bool) -> Self {
        self.mark_done_on_text_end = enabled;
        self
    }

    #[inline]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Start both producers. Fails if the bus has already been drained.
    #[inline]
    pub fn merge<S>(self, tokens: S) -> Result<MergedStream, BusError>
    where
        S: Stream<Item = String> + Send + 'static,
    {
        let mut events = self.bus.drain()?;
        let (sender, receiver) = mpsc::channel(self.capacity);

        let text_sender = sender.clone();
        let bus = Arc::clone(&self.bus);
        let mark_done = self.mark_done_on_text_end;
        let text_task = tokio::spawn(async move {
            let mut tokens = pin!(tokens);
            while let Some(token) = tokens.next().await {
                if text_sender.send(StreamItem::Text(token)).await.is_err() {
                    debug!("Merged stream closed, stopping text producer");
                    break;
                }
            }
            if mark_done {
                bus.mark_done();
            }
        });

        let event_task = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if sender.send(StreamItem::Event(event)).await.is_err() {
                    debug!("Merged stream closed, stopping event producer");
                    break;
                }
            }
        });

        Ok(MergedStream {
            receiver,
            producers: vec![text_task.abort_handle(), event_task.abort_handle()],
        })
    }
}

/// Output of [`StreamMerger::merge`]. Ends when both producers are finished.
pub struct MergedStream {
    receiver: mpsc::Receiver<StreamItem>,
    producers: Vec<AbortHandle>,
}

impl MergedStream {
    /// Stop both producers. Items already buffered are still yielded.
    #[inline]
    pub fn cancel(&mut self) {
        for producer in &self.producers {
            producer.abort();
        }
        self.receiver.close();
    }
}

impl Stream for MergedStream {
    type Item = StreamItem;

    #[inline]
    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for MergedStream {
    fn drop(&mut self) {
        for producer in &self.producers {
            producer.abort();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpOutcome {
    /// Both sources finished; every frame was written
    Completed { frames: usize },
    /// A write failed. Producers were cancelled.
    Disconnected { frames: usize },
}

/// Write `merged` to `writer` as data-stream frames until it ends or the
/// client goes away
#[inline]
pub async fn pump<W>(mut merged: MergedStream, writer: &mut W) -> PumpOutcome
where
    W: AsyncWrite + Unpin,
{
    let mut frames = 0;

    if let Err(e) = write_frame(writer, vercel::PREAMBLE).await {
        info!("Client disconnected before streaming started: {}", e);
        merged.cancel();
        return PumpOutcome::Disconnected { frames };
    }

    while let Some(item) = merged.next().await {
        let Some(frame) = vercel::encode(&item) else {
            continue;
        };
        if let Err(e) = write_frame(writer, &frame).await {
            info!("Client disconnected after {} frames: {}", frames, e);
            merged.cancel();
            return PumpOutcome::Disconnected { frames };
        }
        frames += 1;
    }

    PumpOutcome::Completed { frames }
}

async fn write_frame<W>(writer: &mut W, frame: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame.as_bytes()).await?;
    writer.flush().await
}

// Per-run event bus
// Many writers, one reader. The reader takes the queue once and sees every event exactly once.


use std::sync::{Mutex, PoisonError};

use futures::stream::{self, BoxStream, StreamExt};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{EventKind, ProgressEvent};

#[derive(Debug, Error)]
pub enum BusError {
    #[error("Events for run {0} have already been drained")]
    AlreadyDrained(Uuid),
}

/// Events in arrival order. Ends once the bus is done and the queue is empty.
pub type EventStream = BoxStream<'static, ProgressEvent>;

pub struct EventBus {
    run_id: Uuid,
    sender: mpsc::UnboundedSender<ProgressEvent>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<ProgressEvent>>>,
    done: watch::Sender<bool>,
}

impl Default for EventBus {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    #[inline]
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (done, _) = watch::channel(false);
        Self {
            run_id: Uuid::new_v4(),
            sender,
            receiver: Mutex::new(Some(receiver)),
            done,
        }
    }

    #[inline]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Queue an event. Never blocks. Returns `false` when the event was
    /// dropped, either because it has no message or because the reader is gone.
    #[inline]
    pub fn emit(&self, kind: EventKind) -> bool {
        if kind.to_response().is_none() {
            debug!("Dropping event without a message: {:?}", kind);
            return false;
        }
        if self.is_done() {
            warn!("Event emitted after run {} was marked done", self.run_id);
        }

        self.sender
            .send(ProgressEvent::new(self.run_id, kind))
            .is_ok()
    }

    /// Signal that no more events will be emitted. Safe to call repeatedly.
    #[inline]
    pub fn mark_done(&self) {
        self.done.send_replace(true);
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        *self.done.borrow()
    }

    /// Take the event stream. Only the first call succeeds.
    #[inline]
    pub fn drain(&self) -> Result<EventStream, BusError> {
        let receiver = self
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(BusError::AlreadyDrained(self.run_id))?;

        let done = self.done.subscribe();
        Ok(stream::unfold((receiver, done), |(mut receiver, mut done)| async move {
            loop {
                if let Ok(event) = receiver.try_recv() {
                    return Some((event, (receiver, done)));
                }
                if *done.borrow_and_update() {
                    // An emit racing with mark_done may land after the first check
                    return receiver
                        .try_recv()
                        .ok()
                        .map(|event| (event, (receiver, done)));
                }

                tokio::select! {
                    event = receiver.recv() => {
                        return event.map(|event| (event, (receiver, done)));
                    }
                    changed = done.changed() => {
                        if changed.is_err() {
                            // Bus dropped: flush what is buffered, then end
                            return receiver
                                .try_recv()
                                .ok()
                                .map(|event| (event, (receiver, done)));
                        }
                    }
                }
            }
        })
        .boxed())
    }
}

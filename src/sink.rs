//! Outbound notifications: the [`FrameSink`] capability, the [`Dispatcher`]
//! that decides which thread a notification runs on, and a channel-backed
//! sink for callers that prefer pulling events.

use crate::types::{ConnectionState, StereoFrame};
use crate::{Result, SmartCamError};
use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;

/// Consumer of connection-state changes and received frames.
///
/// Calls arrive on whatever thread the client's [`Dispatcher`] runs them on;
/// with the default [`InlineDispatcher`] that is the session thread.
pub trait FrameSink: Send + Sync {
    fn on_connection_state(&self, state: ConnectionState);
    fn on_frame(&self, frame: StereoFrame);
}

/// A unit of work posted across the sink boundary.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Runs sink notifications on a chosen execution context.
pub trait Dispatcher: Send + Sync {
    fn post(&self, job: Job);
}

/// Runs each notification immediately on the posting (session) thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineDispatcher;

impl Dispatcher for InlineDispatcher {
    fn post(&self, job: Job) {
        job();
    }
}

/// Posts notifications into a [`DispatchQueue`] drained by another thread,
/// typically a UI or event loop.
#[derive(Clone)]
pub struct QueueDispatcher {
    sender: Sender<Job>,
}

impl Dispatcher for QueueDispatcher {
    fn post(&self, job: Job) {
        if self.sender.send(job).is_err() {
            log::debug!("Dispatch queue dropped, discarding notification");
        }
    }
}

/// Receiving half of a [`QueueDispatcher`]. Jobs run in posting order on
/// the thread that drains the queue.
pub struct DispatchQueue {
    receiver: Receiver<Job>,
}

impl DispatchQueue {
    /// Run every job queued so far without blocking. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut count = 0;
        while let Ok(job) = self.receiver.try_recv() {
            job();
            count += 1;
        }
        count
    }

    /// Wait up to `timeout` for one job and run it. Returns false on timeout
    /// or once every dispatcher is gone.
    pub fn run_one_timeout(&self, timeout: Duration) -> bool {
        match self.receiver.recv_timeout(timeout) {
            Ok(job) => {
                job();
                true
            }
            Err(_) => false,
        }
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

/// Create a linked dispatcher/queue pair.
pub fn dispatch_queue() -> (QueueDispatcher, DispatchQueue) {
    let (sender, receiver) = crossbeam_channel::unbounded();
    (QueueDispatcher { sender }, DispatchQueue { receiver })
}

/// Sink and dispatcher bound together, as held by a running session.
#[derive(Clone)]
pub(crate) struct Notifier {
    sink: Arc<dyn FrameSink>,
    dispatcher: Arc<dyn Dispatcher>,
}

impl Notifier {
    pub fn new(sink: Arc<dyn FrameSink>, dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self { sink, dispatcher }
    }

    pub fn state(&self, state: ConnectionState) {
        let sink = self.sink.clone();
        self.dispatcher
            .post(Box::new(move || sink.on_connection_state(state)));
    }

    pub fn frame(&self, frame: StereoFrame) {
        let sink = self.sink.clone();
        self.dispatcher.post(Box::new(move || sink.on_frame(frame)));
    }
}

/// A notification delivered through an [`EventStream`].
#[derive(Debug, Clone)]
pub enum Event {
    State(ConnectionState),
    Frame(StereoFrame),
}

/// Sink that forwards notifications into a bounded channel.
///
/// State changes wait for room in the channel. Frames are dropped when the
/// channel is full, so a slow consumer skips frames instead of stalling the
/// camera session.
pub struct ChannelSink {
    sender: Sender<Event>,
}

impl FrameSink for ChannelSink {
    fn on_connection_state(&self, state: ConnectionState) {
        if self.sender.send(Event::State(state)).is_err() {
            log::debug!("Event stream dropped, discarding state change");
        }
    }

    fn on_frame(&self, frame: StereoFrame) {
        if let Err(e) = self.sender.try_send(Event::Frame(frame)) {
            match e {
                crossbeam_channel::TrySendError::Full(_) => {
                    log::trace!("Event channel full, dropping frame");
                }
                crossbeam_channel::TrySendError::Disconnected(_) => {
                    log::debug!("Event stream dropped, discarding frame");
                }
            }
        }
    }
}

/// Pull-style handle over the events of one client.
pub struct EventStream {
    receiver: Receiver<Event>,
}

impl EventStream {
    /// Receive the next event (blocks until available).
    pub fn recv(&self) -> Result<Event> {
        self.receiver
            .recv()
            .map_err(|_| SmartCamError::StreamStopped)
    }

    /// Try to receive an event without blocking.
    pub fn try_recv(&self) -> Option<Event> {
        self.receiver.try_recv().ok()
    }

    /// Receive an event with a timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Event> {
        self.receiver.recv_timeout(timeout).map_err(|e| match e {
            crossbeam_channel::RecvTimeoutError::Timeout => SmartCamError::Timeout,
            crossbeam_channel::RecvTimeoutError::Disconnected => SmartCamError::StreamStopped,
        })
    }

    /// Iterate over events until every sender is gone.
    pub fn iter(&self) -> impl Iterator<Item = Event> + '_ {
        self.receiver.iter()
    }
}

/// Create a channel-backed sink and its event stream. `capacity` bounds the
/// number of undelivered events.
pub fn event_channel(capacity: usize) -> (ChannelSink, EventStream) {
    let (sender, receiver) = crossbeam_channel::bounded(capacity.max(1));
    (ChannelSink { sender }, EventStream { receiver })
}

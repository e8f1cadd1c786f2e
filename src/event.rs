//! Events and the global work queue (spec §4.3).
//!
//! Exactly one worker drains this queue; producers (transport receive
//! callbacks, the worker posting its own pongs) may enqueue from any
//! context. Enqueue takes a short lock and never blocks on user code.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::bus::BusId;
use crate::frame::Frame;

/// A protocol event produced while decoding a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TypedEvent {
    Ping(Frame),
    Pong(Frame),
    Request(Frame),
    Response(Frame),
}

/// An entry on the global event queue (spec §3 "Event").
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Event {
    /// New bytes are sitting in a bus's ring, waiting to be decoded.
    DataReceived(BusId),
    /// A previously started transport write finished. Reserved for future
    /// backpressure (spec §4.3); currently a no-op when drained.
    WriteComplete(BusId),
    /// A bus's late-init hook should run, exactly once.
    LateInit(BusId),
    /// One of the four protocol events decoded from a frame.
    Typed(BusId, TypedEvent),
}

impl Event {
    fn bus(&self) -> BusId {
        match self {
            Event::DataReceived(b) | Event::WriteComplete(b) | Event::LateInit(b) => *b,
            Event::Typed(b, _) => *b,
        }
    }

    /// Coalescing key for the untyped events: `DataReceived`,
    /// `WriteComplete`, and `LateInit` may be de-duplicated when they'd sit
    /// back-to-back in the FIFO for the same bus (spec §4.3 "Ping
    /// coalescing" — drain is idempotent, so a duplicate buys nothing).
    /// `Typed` events return `None` and are never coalesced.
    fn coalesce_tag(&self) -> Option<u8> {
        match self {
            Event::DataReceived(_) => Some(0),
            Event::WriteComplete(_) => Some(1),
            Event::LateInit(_) => Some(2),
            Event::Typed(..) => None,
        }
    }
}

struct QueueState {
    queue: Mutex<VecDeque<Event>>,
    condvar: Condvar,
    stopped: AtomicBool,
}

/// The global FIFO. Cheaply `Clone`-able (an `Arc` underneath) so every bus
/// can hold a handle to enqueue into without going back through the
/// registry.
#[derive(Clone)]
pub(crate) struct EventQueue {
    state: Arc<QueueState>,
}

impl EventQueue {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(QueueState {
                queue: Mutex::new(VecDeque::new()),
                condvar: Condvar::new(),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    /// Push an event, coalescing it with an already-pending, same-kind,
    /// same-bus event sitting at the back of the queue.
    pub(crate) fn enqueue(&self, event: Event) {
        let mut q = self.state.queue.lock().unwrap();
        if let Some(tag) = event.coalesce_tag() {
            let bus = event.bus();
            for existing in q.iter().rev() {
                if existing.bus() == bus {
                    if existing.coalesce_tag() == Some(tag) {
                        return;
                    }
                    break;
                }
            }
        }
        q.push_back(event);
        self.state.condvar.notify_one();
    }

    /// Block until an event is available or the queue is shut down.
    /// Returns `None` only after [`EventQueue::shutdown`] has been called
    /// and the queue has drained.
    pub(crate) fn pop_blocking(&self) -> Option<Event> {
        let mut q = self.state.queue.lock().unwrap();
        loop {
            if let Some(event) = q.pop_front() {
                return Some(event);
            }
            if self.state.stopped.load(Ordering::Acquire) {
                return None;
            }
            let (guard, _timeout) = self
                .state
                .condvar
                .wait_timeout(q, Duration::from_millis(200))
                .unwrap();
            q = guard;
        }
    }

    /// Wake the worker so it notices [`EventQueue::shutdown`] promptly.
    pub(crate) fn shutdown(&self) {
        self.state.stopped.store(true, Ordering::Release);
        self.state.condvar.notify_all();
    }
}

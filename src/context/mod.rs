//! Cancellation scopes shared by every blocking call of the election engine.
//!
//! A `Context` ends when it is cancelled explicitly (`cancel`), when its deadline passes, or
//! when its parent ends. Ending disconnects the `done` channel, so any worker blocked in
//! `select!` on it wakes up at once. `err` tells which of the two reasons applied.

use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use crate::errors::{ElectionError, ErrorKind, Result};

#[derive(Clone, Debug)]
pub struct Context {
    inner: Arc<ContextInner>,
}

#[derive(Debug)]
struct ContextInner {
    done_rx: Receiver<()>,
    deadline: Option<Instant>,
    state: Mutex<ContextState>,
    // keeps intermediate scopes alive so cancellation reaches every descendant
    _parent: Option<Arc<ContextInner>>,
}

#[derive(Debug)]
struct ContextState {
    done_tx: Option<Sender<()>>,
    // Cancelled or Timeout, set together with dropping done_tx
    ended_by: Option<ErrorKind>,
    children: Vec<Weak<ContextInner>>,
}

impl Context {
    /// Creates a root context without deadline.
    pub fn new() -> Context {
        Context::create(None, None)
    }

    fn create(deadline: Option<Instant>, parent: Option<Arc<ContextInner>>) -> Context {
        let (done_tx, done_rx): (Sender<()>, Receiver<()>) = crossbeam_channel::bounded(0);

        Context {
            inner: Arc::new(ContextInner {
                done_rx,
                deadline,
                state: Mutex::new(ContextState {
                    done_tx: Some(done_tx),
                    ended_by: None,
                    children: Vec::new(),
                }),
                _parent: parent,
            }),
        }
    }

    /// Derives a scope which is cancelled together with this context.
    pub fn child(&self) -> Context {
        self.derive(self.inner.deadline)
    }

    /// Derives a scope with a deadline no later than `timeout` from now. The scope ends by
    /// itself once the deadline passes.
    pub fn with_timeout(&self, timeout: Duration) -> Context {
        let deadline = Instant::now() + timeout;
        match self.inner.deadline {
            // the parent ends first and takes the child with it
            Some(parent_deadline) if parent_deadline <= deadline => self.derive(Some(parent_deadline)),
            _ => {
                let child = self.derive(Some(deadline));
                child.arm_deadline(deadline);
                child
            }
        }
    }

    fn derive(&self, deadline: Option<Instant>) -> Context {
        let child = Context::create(deadline, Some(self.inner.clone()));

        let mut state = self.inner.state.lock();
        let ended_by = state.ended_by;
        match ended_by {
            Some(reason) => {
                drop(state);
                child.end(reason);
            }
            None => {
                state.children.retain(|child| child.strong_count() > 0);
                state.children.push(Arc::downgrade(&child.inner));
            }
        }

        child
    }

    // The timer thread lives until the deadline or until the context ends or is dropped,
    // whichever comes first. It holds no strong reference to the context.
    fn arm_deadline(&self, deadline: Instant) {
        if self.inner.state.lock().ended_by.is_some() {
            return;
        }

        let done_rx = self.inner.done_rx.clone();
        let inner = Arc::downgrade(&self.inner);
        thread::spawn(move || {
            select!(
                recv(crossbeam_channel::at(deadline)) -> _ => {
                    if let Some(inner) = inner.upgrade() {
                        Context { inner }.end(ErrorKind::Timeout);
                    }
                },
                recv(done_rx) -> _ => {},
            )
        });
    }

    /// Cancels this context and all its descendants. Repeated calls are no-ops.
    pub fn cancel(&self) {
        self.end(ErrorKind::Cancelled);
    }

    fn end(&self, reason: ErrorKind) {
        let children = {
            let mut state = self.inner.state.lock();
            if state.ended_by.is_some() {
                return;
            }
            state.ended_by = Some(reason);
            state.done_tx = None;
            std::mem::replace(&mut state.children, Vec::new())
        };

        for child in children {
            if let Some(inner) = child.upgrade() {
                Context { inner }.end(reason);
            }
        }
    }

    /// True once the context was cancelled or its deadline passed.
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// True only for explicit cancellation of this context or an ancestor.
    pub fn is_cancelled(&self) -> bool {
        self.inner.state.lock().ended_by == Some(ErrorKind::Cancelled)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Channel disconnected once the context is cancelled or its deadline passes.
    pub fn done(&self) -> &Receiver<()> {
        &self.inner.done_rx
    }

    /// Channel firing at the deadline, or never for contexts without one.
    pub fn timer(&self) -> Receiver<Instant> {
        match self.inner.deadline {
            Some(deadline) => crossbeam_channel::at(deadline),
            None => crossbeam_channel::never(),
        }
    }

    pub fn err(&self) -> Option<ElectionError> {
        if let Some(reason) = self.inner.state.lock().ended_by {
            return Some(ended_error(reason));
        }

        match self.inner.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ended_error(ErrorKind::Timeout)),
            _ => None,
        }
    }

    pub fn check(&self) -> Result<()> {
        match self.err() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Waits for a message on `rx` unless the context ends first.
    pub fn recv<T>(&self, rx: &Receiver<T>) -> Result<T> {
        self.check()?;

        let timer = self.timer();
        select!(
            recv(rx) -> msg => msg.map_err(|err| ElectionError::new(
                ErrorKind::StreamClosed,
                "Channel disconnected".to_string(),
                err.to_string(),
            )),
            recv(self.done()) -> _ => Err(self.ended()),
            recv(timer) -> _ => Err(ended_error(ErrorKind::Timeout)),
        )
    }

    /// Sleeps for `duration`, returning early with an error if the context ends.
    pub fn sleep(&self, duration: Duration) -> Result<()> {
        self.check()?;

        let timer = self.timer();
        select!(
            recv(crossbeam_channel::after(duration)) -> _ => self.check(),
            recv(self.done()) -> _ => Err(self.ended()),
            recv(timer) -> _ => Err(ended_error(ErrorKind::Timeout)),
        )
    }

    /// Error describing why the context ended, for use after `done()` fired.
    pub fn ended(&self) -> ElectionError {
        self.err().unwrap_or_else(|| ended_error(ErrorKind::Cancelled))
    }
}

impl Default for Context {
    fn default() -> Self {
        Context::new()
    }
}

fn ended_error(reason: ErrorKind) -> ElectionError {
    match reason {
        ErrorKind::Timeout => {
            ElectionError::new(ErrorKind::Timeout, "Context deadline exceeded".to_string(), String::new())
        }
        _ => ElectionError::new(ErrorKind::Cancelled, "Context cancelled".to_string(), String::new()),
    }
}

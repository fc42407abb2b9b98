//! Callback-driven traversals with deferred fault reporting.
//!
//! Native enumeration functions call back synchronously, and nothing may
//! unwind across them. Every callback body therefore runs inside
//! [`Traversal::callback`], which catches both `Err` returns and panics. The
//! first fault is stored, the traversal asks native code to stop at its next
//! opportunity, and [`Traversal::finish`] re-raises the fault once the native
//! call has returned.

use crate::error::{Error, Result};
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use tether_log::{debug, warn};

/// Where a callback currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackPhase {
    /// Building wrapper objects for native arguments.
    ConstructingWrapper,
    /// Running the caller's handler.
    InvokingUserHandler,
    /// Tearing down the callback scope before returning to native code.
    ReturningToNative,
}

/// Lifecycle of one traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalState {
    NotStarted,
    /// Inside the native call, between callbacks.
    Running,
    /// Inside a callback.
    InCallback(CallbackPhase),
    /// The native call returned and no callback failed.
    Completed,
    /// A callback failed, or the native call reported an error.
    Faulted,
}

enum Fault {
    Error(Error),
    Panic(Box<dyn Any + Send + 'static>),
}

/// State shared by the callbacks of one native enumeration call.
pub(crate) struct Traversal {
    operation: &'static str,
    state: Rc<Cell<TraversalState>>,
    fault: RefCell<Option<Fault>>,
    callbacks: Cell<u64>,
}

impl Traversal {
    pub(crate) fn new(operation: &'static str) -> Self {
        Self::observed(operation, Rc::new(Cell::new(TraversalState::NotStarted)))
    }

    /// A traversal that publishes its state through `state`.
    pub(crate) fn observed(operation: &'static str, state: Rc<Cell<TraversalState>>) -> Self {
        state.set(TraversalState::NotStarted);
        Traversal {
            operation,
            state,
            fault: RefCell::new(None),
            callbacks: Cell::new(0),
        }
    }

    pub(crate) fn start(&self) {
        debug!("{}: traversal started", self.operation);
        self.state.set(TraversalState::Running);
    }

    pub(crate) fn state(&self) -> TraversalState {
        self.state.get()
    }

    /// Whether a callback has failed. Native code should be asked to stop.
    pub(crate) fn is_faulted(&self) -> bool {
        self.fault.borrow().is_some()
    }

    pub(crate) fn callbacks(&self) -> u64 {
        self.callbacks.get()
    }

    /// Marks the move from wrapper construction to user code.
    pub(crate) fn invoking_handler(&self) {
        self.state
            .set(TraversalState::InCallback(CallbackPhase::InvokingUserHandler));
    }

    /// Runs one callback body, capturing any failure.
    ///
    /// Returns `None` without running `body` if an earlier callback already
    /// failed, and `None` if this one fails.
    pub(crate) fn callback<R>(&self, body: impl FnOnce() -> Result<R>) -> Option<R> {
        if self.is_faulted() {
            return None;
        }
        self.callbacks.set(self.callbacks.get() + 1);
        self.state
            .set(TraversalState::InCallback(CallbackPhase::ConstructingWrapper));

        let outcome = panic::catch_unwind(AssertUnwindSafe(body));

        self.state
            .set(TraversalState::InCallback(CallbackPhase::ReturningToNative));
        let result = match outcome {
            Ok(Ok(value)) => Some(value),
            Ok(Err(err)) => {
                self.capture(Fault::Error(err));
                None
            }
            Err(payload) => {
                self.capture(Fault::Panic(payload));
                None
            }
        };
        self.state.set(TraversalState::Running);
        result
    }

    fn capture(&self, fault: Fault) {
        match &fault {
            Fault::Error(err) => warn!("{}: callback failed, stopping traversal: {err}", self.operation),
            Fault::Panic(payload) => warn!(
                "{}: callback panicked, stopping traversal: {}",
                self.operation,
                panic_message(payload.as_ref())
            ),
        }
        let mut slot = self.fault.borrow_mut();
        if slot.is_none() {
            *slot = Some(fault);
        }
    }

    /// Ends the traversal after the native call has returned.
    ///
    /// A captured callback fault wins over `native`: errors are returned and
    /// panics resume unwinding on the caller's side of the native call.
    pub(crate) fn finish(&self, native: Result<()>) -> Result<()> {
        let fault = self.fault.borrow_mut().take();
        let faulted = fault.is_some() || native.is_err();
        self.state.set(if faulted {
            TraversalState::Faulted
        } else {
            TraversalState::Completed
        });
        debug!(
            "{}: traversal {} after {} callback(s)",
            self.operation,
            if faulted { "faulted" } else { "completed" },
            self.callbacks()
        );

        match fault {
            Some(Fault::Error(err)) => Err(err),
            Some(Fault::Panic(payload)) => panic::resume_unwind(payload),
            None => native,
        }
    }
}

impl fmt::Debug for Traversal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Traversal")
            .field("operation", &self.operation)
            .field("state", &self.state())
            .field("faulted", &self.is_faulted())
            .field("callbacks", &self.callbacks())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

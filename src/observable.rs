//! Single-value broadcast channel with replay-latest semantics.
//!
//! [`Subject`] holds the last published value and a list of observers.
//! Publishing overwrites the value and notifies every observer synchronously,
//! on the caller's stack. There is no buffering: an observer only ever sees
//! the latest value.
//!
//! Each price level owns three subjects (quantity, cumulative depth and depth
//! share), so a display binding can follow one cell of the ladder without
//! diffing whole snapshots.
//!
//! # Example
//!
//! ```rust
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use depth_ladder::observable::Subject;
//!
//! let subject = Subject::new(1u32);
//! let seen = Rc::new(Cell::new(0));
//!
//! let sink = Rc::clone(&seen);
//! let sub = subject.subscribe(move |v| sink.set(*v));
//!
//! subject.publish(7);
//! assert_eq!(seen.get(), 7);
//! assert_eq!(subject.current_value(), 7);
//!
//! sub.cancel();
//! subject.publish(9);
//! assert_eq!(seen.get(), 7);
//! ```

use std::cell::RefCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

type Observer<T> = Rc<dyn Fn(&T)>;

struct Inner<T> {
    value: T,
    next_id: u64,
    observers: Vec<(u64, Observer<T>)>,
}

/// Single-writer, many-reader value cell with synchronous notification.
///
/// Cloning a `Subject` yields another handle to the same channel; use
/// [`Subject::ptr_eq`] to test identity.
///
/// Not thread-safe: all publication happens on the thread that drives
/// reconciliation.
pub struct Subject<T> {
    inner: Rc<RefCell<Inner<T>>>,
}

impl<T: Clone + 'static> Subject<T> {
    /// Create a channel holding `value`
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                value,
                next_id: 0,
                observers: Vec::new(),
            })),
        }
    }

    /// Replace the current value and notify all registered observers.
    ///
    /// Observers are called with a stable copy of the observer list taken
    /// before the first call, so an observer that subscribes or cancels
    /// during notification neither skips nor double-calls the others.
    /// A panicking observer is logged and skipped; the stored value is
    /// already updated when observers run.
    pub fn publish(&self, value: T) {
        let observers: Vec<Observer<T>> = {
            let mut inner = self.inner.borrow_mut();
            inner.value = value.clone();
            inner.observers.iter().map(|(_, o)| Rc::clone(o)).collect()
        };

        for observer in observers {
            notify(&observer, &value);
        }
    }

    /// Register an observer for future publications.
    ///
    /// Every call is a distinct registration, even for identical closures.
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&T) + 'static,
    {
        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.observers.push((id, Rc::new(observer)));
            id
        };

        let weak: Weak<RefCell<Inner<T>>> = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.borrow_mut().observers.retain(|(oid, _)| *oid != id);
            }
        })
    }

    /// Call `observer` with the current value right away, then subscribe it.
    ///
    /// This is the usual shape of a display binding: render what is there
    /// now, then follow every change.
    pub fn watch<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&T) + 'static,
    {
        let observer: Observer<T> = Rc::new(observer);
        notify(&observer, &self.current_value());
        self.subscribe(move |v| observer(v))
    }

    /// Last published value (or the initial one)
    pub fn current_value(&self) -> T {
        self.inner.borrow().value.clone()
    }

    /// Number of registered observers
    pub fn observer_count(&self) -> usize {
        self.inner.borrow().observers.len()
    }

    /// Whether two handles refer to the same channel
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }
}

fn notify<T>(observer: &Observer<T>, value: &T) {
    if panic::catch_unwind(AssertUnwindSafe(|| observer(value))).is_err() {
        tracing::warn!("observer panicked during notification, continuing with the rest");
    }
}

impl<T> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Subject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Subject")
            .field("value", &inner.value)
            .field("observers", &inner.observers.len())
            .finish()
    }
}

/// Handle returned by a subscription; [`cancel`](Subscription::cancel)
/// removes exactly that registration.
///
/// Cancelling is idempotent. Dropping the handle does not cancel.
pub struct Subscription {
    cancel: RefCell<Option<Box<dyn FnOnce()>>>,
}

impl Subscription {
    pub(crate) fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: RefCell::new(Some(Box::new(cancel))),
        }
    }

    /// Remove the registration. Later calls do nothing.
    pub fn cancel(&self) {
        // release the borrow before running the closure; it may re-enter
        let cancel = self.cancel.borrow_mut().take();
        if let Some(cancel) = cancel {
            cancel();
        }
    }

    /// Whether [`cancel`](Subscription::cancel) has run
    pub fn is_cancelled(&self) -> bool {
        self.cancel.borrow().is_none()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

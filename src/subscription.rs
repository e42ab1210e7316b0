//! Cancellation handles.

use std::{cell::Cell, fmt, rc::Rc};

/// Returned by [`Observable::actual_subscribe`](crate::observable::Observable)
/// to stop a stream before it terminates.
pub trait Subscription {
  fn unsubscribe(self);

  fn is_closed(&self) -> bool;
}

/// The subscription of a stream that was already finished when subscribe
/// returned.
impl Subscription for () {
  #[inline]
  fn unsubscribe(self) {}

  #[inline]
  fn is_closed(&self) -> bool { true }
}

impl<S: Subscription> Subscription for Option<S> {
  fn unsubscribe(self) {
    if let Some(s) = self {
      s.unsubscribe();
    }
  }

  fn is_closed(&self) -> bool { self.as_ref().is_none_or(Subscription::is_closed) }
}

/// Runs a closure on unsubscribe.
pub struct ClosureSubscription<F: FnOnce()> {
  teardown: Option<F>,
  closed: Rc<Cell<bool>>,
}

impl<F: FnOnce()> ClosureSubscription<F> {
  pub fn new(teardown: F) -> Self {
    Self { teardown: Some(teardown), closed: Rc::new(Cell::new(false)) }
  }
}

impl<F: FnOnce()> Subscription for ClosureSubscription<F> {
  fn unsubscribe(mut self) {
    self.closed.set(true);
    if let Some(teardown) = self.teardown.take() {
      teardown();
    }
  }

  fn is_closed(&self) -> bool { self.closed.get() }
}

/// Lets `Box<dyn ..>` call the by-value `unsubscribe`.
pub trait BoxedSubscriptionInner {
  fn boxed_unsubscribe(self: Box<Self>);
  fn boxed_is_closed(&self) -> bool;
}

impl<T: Subscription> BoxedSubscriptionInner for T {
  #[inline]
  fn boxed_unsubscribe(self: Box<Self>) { (*self).unsubscribe() }

  #[inline]
  fn boxed_is_closed(&self) -> bool { self.is_closed() }
}

/// A type-erased subscription, used where differently typed streams are
/// stored together (for example the windows opened by
/// [`ExpectObservable::within`](crate::harness::ExpectObservable::within)).
pub struct BoxedSubscription(Box<dyn BoxedSubscriptionInner>);

impl BoxedSubscription {
  pub fn new(subscription: impl Subscription + 'static) -> Self { Self(Box::new(subscription)) }
}

impl Subscription for BoxedSubscription {
  #[inline]
  fn unsubscribe(self) { self.0.boxed_unsubscribe() }

  #[inline]
  fn is_closed(&self) -> bool { self.0.boxed_is_closed() }
}

impl fmt::Debug for BoxedSubscription {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("BoxedSubscription").field("is_closed", &self.is_closed()).finish()
  }
}

//! Observer traits and the adapters the sources and recorder build on.
//!
//! An [`Observer`] receives `next` any number of times and at most one of
//! `error` or `complete`. The terminal methods take `self`, so delivering a
//! second terminal is a type error rather than a runtime check.

use std::{cell::RefCell, convert::Infallible, rc::Rc};

pub trait Observer<Item, Err> {
  fn next(&mut self, value: Item);

  fn error(self, err: Err);

  fn complete(self);

  /// `true` once the observer will not accept more values. Sources check it
  /// to stop emitting early.
  fn is_closed(&self) -> bool;
}

/// Emission facade handed to [`create`](crate::observable::create)
/// closures.
///
/// Every method takes `&mut self`, so `&mut dyn Emitter` can stand in for
/// whatever observer subscribed without boxing it. Calls after a terminal
/// notification are ignored.
pub trait Emitter<Item, Err> {
  fn next(&mut self, value: Item);
  fn error(&mut self, err: Err);
  fn complete(&mut self);
}

/// Object-safe mirror of [`Observer`].
pub trait DynObserver<Item, Err> {
  fn box_next(&mut self, value: Item);
  fn box_error(self: Box<Self>, err: Err);
  fn box_complete(self: Box<Self>);
  fn box_is_closed(&self) -> bool;
}

impl<T, Item, Err> DynObserver<Item, Err> for T
where
  T: Observer<Item, Err>,
{
  fn box_next(&mut self, value: Item) { self.next(value); }
  fn box_error(self: Box<Self>, err: Err) { self.error(err); }
  fn box_complete(self: Box<Self>) { self.complete(); }
  fn box_is_closed(&self) -> bool { self.is_closed() }
}

/// A type-erased observer. Hot sources keep one per subscriber.
pub type BoxedObserver<'a, Item, Err> = Box<dyn DynObserver<Item, Err> + 'a>;

impl<'a, Item, Err> Observer<Item, Err> for BoxedObserver<'a, Item, Err> {
  #[inline]
  fn next(&mut self, value: Item) { (**self).box_next(value) }

  #[inline]
  fn error(self, err: Err) { self.box_error(err) }

  #[inline]
  fn complete(self) { self.box_complete() }

  #[inline]
  fn is_closed(&self) -> bool { (**self).box_is_closed() }
}

/// `None` ignores everything; `Some` delegates.
impl<O, Item, Err> Observer<Item, Err> for Option<O>
where
  O: Observer<Item, Err>,
{
  fn next(&mut self, value: Item) {
    if let Some(inner) = self {
      inner.next(value);
    }
  }

  fn error(self, err: Err) {
    if let Some(inner) = self {
      inner.error(err);
    }
  }

  fn complete(self) {
    if let Some(inner) = self {
      inner.complete();
    }
  }

  fn is_closed(&self) -> bool { self.as_ref().is_none_or(Observer::is_closed) }
}

/// An observer shared between several producers, such as the inner streams
/// of a flattening operator. The first terminal notification consumes the
/// inner observer; everything after it is dropped.
pub struct SharedObserver<O>(Rc<RefCell<Option<O>>>);

impl<O> SharedObserver<O> {
  pub fn new(observer: O) -> Self { Self(Rc::new(RefCell::new(Some(observer)))) }

  /// Drops the inner observer without notifying it.
  pub fn close(&self) { self.0.borrow_mut().take(); }
}

impl<O> Clone for SharedObserver<O> {
  fn clone(&self) -> Self { Self(self.0.clone()) }
}

impl<O, Item, Err> Observer<Item, Err> for SharedObserver<O>
where
  O: Observer<Item, Err>,
{
  fn next(&mut self, value: Item) {
    if let Some(inner) = self.0.borrow_mut().as_mut() {
      inner.next(value);
    }
  }

  fn error(self, err: Err) {
    let inner = self.0.borrow_mut().take();
    inner.error(err);
  }

  fn complete(self) {
    let inner = self.0.borrow_mut().take();
    inner.complete();
  }

  fn is_closed(&self) -> bool { self.0.borrow().as_ref().is_none_or(Observer::is_closed) }
}

/// Wraps a closure as a `next`-only observer.
#[derive(Clone)]
pub struct FnMutObserver<F>(pub F);

impl<F, Item> Observer<Item, Infallible> for FnMutObserver<F>
where
  F: FnMut(Item),
{
  #[inline]
  fn next(&mut self, v: Item) { (self.0)(v); }

  #[inline]
  fn error(self, _err: Infallible) {}

  #[inline]
  fn complete(self) {}

  #[inline]
  fn is_closed(&self) -> bool { false }
}

/// Delivers to an `Option<O>`, taking the observer on the first terminal.
pub(crate) struct OptionEmitter<O>(pub(crate) Option<O>);

impl<O, Item, Err> Emitter<Item, Err> for OptionEmitter<O>
where
  O: Observer<Item, Err>,
{
  #[inline]
  fn next(&mut self, value: Item) {
    if let Some(observer) = &mut self.0 {
      observer.next(value);
    }
  }

  #[inline]
  fn error(&mut self, err: Err) {
    if let Some(observer) = self.0.take() {
      observer.error(err);
    }
  }

  #[inline]
  fn complete(&mut self) {
    if let Some(observer) = self.0.take() {
      observer.complete();
    }
  }
}

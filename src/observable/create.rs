use std::marker::PhantomData;

use crate::{
  observable::Observable,
  observer::{Emitter, Observer, OptionEmitter},
  subscription::Subscription,
};

/// An observable that hands its subscriber to `f` synchronously. Subscribing
/// consumes it; clone it (which needs a `Clone` closure) to subscribe again.
///
/// ```rust
/// use std::{cell::RefCell, convert::Infallible, rc::Rc};
///
/// use rxrust_marbles::prelude::*;
///
/// let seen = Rc::new(RefCell::new(vec![]));
/// let c_seen = seen.clone();
/// create(|emitter: &mut dyn Emitter<i32, Infallible>| {
///   emitter.next(1);
///   emitter.complete();
///   emitter.next(2);
/// })
/// .actual_subscribe(FnMutObserver(move |v| c_seen.borrow_mut().push(v)));
/// assert_eq!(*seen.borrow(), vec![1]);
/// ```
pub fn create<Item, Err, F, U>(f: F) -> Create<F, Item, Err>
where
  F: FnOnce(&mut dyn Emitter<Item, Err>) -> U,
  U: Subscription,
{
  Create { f, _marker: PhantomData }
}

/// Created by [`create`].
pub struct Create<F, Item, Err> {
  f: F,
  _marker: PhantomData<fn() -> (Item, Err)>,
}

impl<F: Clone, Item, Err> Clone for Create<F, Item, Err> {
  fn clone(&self) -> Self { Self { f: self.f.clone(), _marker: PhantomData } }
}

impl<F, Item, Err, U> Observable<Item, Err> for Create<F, Item, Err>
where
  F: FnOnce(&mut dyn Emitter<Item, Err>) -> U,
  U: Subscription + 'static,
{
  type Unsub = U;

  fn actual_subscribe<O>(self, observer: O) -> U
  where
    O: Observer<Item, Err> + 'static,
  {
    let mut emitter = OptionEmitter(Some(observer));
    (self.f)(&mut emitter)
  }
}

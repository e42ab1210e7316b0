//! Minimal operators built on the `Observable` seam, enough to exercise the
//! marble harness the way a reactive library would.

#![allow(dead_code)]

use std::{cell::RefCell, collections::VecDeque, marker::PhantomData, rc::Rc};

use rxrust_marbles::prelude::*;

// ==================== Creation ====================

/// Emits `values` and completes, all on the subscription frame.
pub fn of<V, Err>(values: Vec<V>) -> impl Observable<V, Err>
where
  V: 'static,
  Err: 'static,
{
  create(move |emitter: &mut dyn Emitter<V, Err>| {
    for v in values {
      emitter.next(v);
    }
    emitter.complete();
  })
}

/// Errors immediately.
pub fn throw<V, Err>(err: Err) -> impl Observable<V, Err>
where
  V: 'static,
  Err: 'static,
{
  create(move |emitter: &mut dyn Emitter<V, Err>| emitter.error(err))
}

/// Emits 0, 1, 2, ... every `period` on `scheduler`.
pub struct Interval {
  period: Duration,
  scheduler: TestScheduler,
}

pub fn interval(period: Duration, scheduler: &TestScheduler) -> Interval {
  Interval { period, scheduler: scheduler.clone() }
}

impl<Err> Observable<usize, Err> for Interval {
  type Unsub = TaskHandle;

  fn actual_subscribe<O>(self, observer: O) -> TaskHandle
  where
    O: Observer<usize, Err> + 'static,
  {
    let frames = self.scheduler.config().frames_ceil(self.period).max(1);
    let mut observer = observer;
    let mut count = 0;
    self.scheduler.schedule_in(frames, move || {
      observer.next(count);
      count += 1;
      if observer.is_closed() { TaskState::Finished } else { TaskState::SleepFrames(frames) }
    })
  }
}

// ==================== map / filter ====================

pub struct Map<S, F, In> {
  source: S,
  f: F,
  _in: PhantomData<fn(In)>,
}

pub fn map<S, F, In, Out, Err>(source: S, f: F) -> Map<S, F, In>
where
  S: Observable<In, Err>,
  F: FnMut(In) -> Out,
{
  Map { source, f, _in: PhantomData }
}

pub fn map_to<S, In, Out, Err>(source: S, value: Out) -> impl Observable<Out, Err>
where
  S: Observable<In, Err>,
  In: 'static,
  Out: Clone + 'static,
  Err: 'static,
{
  map::<S, _, In, Out, Err>(source, move |_: In| value.clone())
}

impl<S, F, In, Out, Err> Observable<Out, Err> for Map<S, F, In>
where
  S: Observable<In, Err>,
  F: FnMut(In) -> Out + 'static,
  Out: 'static,
  Err: 'static,
{
  type Unsub = S::Unsub;

  fn actual_subscribe<O>(self, observer: O) -> S::Unsub
  where
    O: Observer<Out, Err> + 'static,
  {
    self.source.actual_subscribe(MapObserver { observer, f: self.f, _out: PhantomData })
  }
}

struct MapObserver<O, F, Out> {
  observer: O,
  f: F,
  _out: PhantomData<fn() -> Out>,
}

impl<O, F, In, Out, Err> Observer<In, Err> for MapObserver<O, F, Out>
where
  O: Observer<Out, Err>,
  F: FnMut(In) -> Out,
{
  fn next(&mut self, value: In) { self.observer.next((self.f)(value)) }

  fn error(self, err: Err) { self.observer.error(err) }

  fn complete(self) { self.observer.complete() }

  fn is_closed(&self) -> bool { self.observer.is_closed() }
}

pub struct Filter<S, F> {
  source: S,
  predicate: F,
}

pub fn filter<S, F, V, Err>(source: S, predicate: F) -> Filter<S, F>
where
  S: Observable<V, Err>,
  F: FnMut(&V) -> bool,
{
  Filter { source, predicate }
}

impl<S, F, V, Err> Observable<V, Err> for Filter<S, F>
where
  S: Observable<V, Err>,
  F: FnMut(&V) -> bool + 'static,
  V: 'static,
  Err: 'static,
{
  type Unsub = S::Unsub;

  fn actual_subscribe<O>(self, observer: O) -> S::Unsub
  where
    O: Observer<V, Err> + 'static,
  {
    self.source.actual_subscribe(FilterObserver { observer, predicate: self.predicate })
  }
}

struct FilterObserver<O, F> {
  observer: O,
  predicate: F,
}

impl<O, F, V, Err> Observer<V, Err> for FilterObserver<O, F>
where
  O: Observer<V, Err>,
  F: FnMut(&V) -> bool,
{
  fn next(&mut self, value: V) {
    if (self.predicate)(&value) {
      self.observer.next(value);
    }
  }

  fn error(self, err: Err) { self.observer.error(err) }

  fn complete(self) { self.observer.complete() }

  fn is_closed(&self) -> bool { self.observer.is_closed() }
}

// ==================== take / take_while ====================

/// Completes after `count` values. Upstream sees the observer close.
pub struct Take<S> {
  source: S,
  count: usize,
}

pub fn take<S>(source: S, count: usize) -> Take<S> { Take { source, count } }

impl<S, V, Err> Observable<V, Err> for Take<S>
where
  S: Observable<V, Err>,
  V: 'static,
  Err: 'static,
{
  type Unsub = S::Unsub;

  fn actual_subscribe<O>(self, observer: O) -> S::Unsub
  where
    O: Observer<V, Err> + 'static,
  {
    let remaining = self.count;
    self.source.actual_subscribe(TakeWhileObserver {
      observer: Some(observer),
      predicate: Counter(remaining),
    })
  }
}

pub struct TakeWhile<S, F> {
  source: S,
  predicate: F,
}

pub fn take_while<S, F, V, Err>(source: S, predicate: F) -> TakeWhile<S, F>
where
  S: Observable<V, Err>,
  F: FnMut(&V) -> bool,
{
  TakeWhile { source, predicate }
}

impl<S, F, V, Err> Observable<V, Err> for TakeWhile<S, F>
where
  S: Observable<V, Err>,
  F: FnMut(&V) -> bool + 'static,
  V: 'static,
  Err: 'static,
{
  type Unsub = S::Unsub;

  fn actual_subscribe<O>(self, observer: O) -> S::Unsub
  where
    O: Observer<V, Err> + 'static,
  {
    self.source.actual_subscribe(TakeWhileObserver {
      observer: Some(observer),
      predicate: Predicate(self.predicate),
    })
  }
}

/// Decides, per value, whether to pass it and whether to complete after it.
trait Gate<V> {
  /// `(pass, complete_after)`
  fn check(&mut self, value: &V) -> (bool, bool);
}

struct Counter(usize);

impl<V> Gate<V> for Counter {
  fn check(&mut self, _: &V) -> (bool, bool) {
    self.0 = self.0.saturating_sub(1);
    (true, self.0 == 0)
  }
}

struct Predicate<F>(F);

impl<V, F: FnMut(&V) -> bool> Gate<V> for Predicate<F> {
  fn check(&mut self, value: &V) -> (bool, bool) {
    let pass = (self.0)(value);
    (pass, !pass)
  }
}

struct TakeWhileObserver<O, G> {
  observer: Option<O>,
  predicate: G,
}

impl<O, G, V, Err> Observer<V, Err> for TakeWhileObserver<O, G>
where
  O: Observer<V, Err>,
  G: Gate<V>,
{
  fn next(&mut self, value: V) {
    if self.observer.is_none() {
      return;
    }
    let (pass, done) = self.predicate.check(&value);
    if pass {
      Observer::<V, Err>::next(&mut self.observer, value);
    }
    if done {
      if let Some(observer) = self.observer.take() {
        observer.complete();
      }
    }
  }

  fn error(self, err: Err) { Observer::<V, Err>::error(self.observer, err) }

  fn complete(self) { Observer::<V, Err>::complete(self.observer) }

  fn is_closed(&self) -> bool { Observer::<V, Err>::is_closed(&self.observer) }
}

// ==================== delay ====================

/// Shifts every notification `delay` later on `scheduler`.
pub struct Delay<S> {
  source: S,
  delay: Duration,
  scheduler: TestScheduler,
}

pub fn delay<S>(source: S, delay: Duration, scheduler: &TestScheduler) -> Delay<S> {
  Delay { source, delay, scheduler: scheduler.clone() }
}

impl<S, V, Err> Observable<V, Err> for Delay<S>
where
  S: Observable<V, Err>,
  V: 'static,
  Err: 'static,
{
  type Unsub = S::Unsub;

  fn actual_subscribe<O>(self, observer: O) -> S::Unsub
  where
    O: Observer<V, Err> + 'static,
  {
    let frames = self.scheduler.config().frames_ceil(self.delay);
    self.source.actual_subscribe(DelayObserver {
      observer: SharedObserver::new(observer),
      scheduler: self.scheduler,
      frames,
    })
  }
}

struct DelayObserver<O> {
  observer: SharedObserver<O>,
  scheduler: TestScheduler,
  frames: Frame,
}

impl<O, V, Err> Observer<V, Err> for DelayObserver<O>
where
  O: Observer<V, Err> + 'static,
  V: 'static,
  Err: 'static,
{
  fn next(&mut self, value: V) {
    let mut observer = self.observer.clone();
    let mut value = Some(value);
    self.scheduler.schedule_in(self.frames, move || {
      if let Some(value) = value.take() {
        Observer::<V, Err>::next(&mut observer, value);
      }
      TaskState::Finished
    });
  }

  fn error(self, err: Err) {
    let mut pending = Some((self.observer, err));
    self.scheduler.schedule_in(self.frames, move || {
      if let Some((observer, err)) = pending.take() {
        Observer::<V, Err>::error(observer, err);
      }
      TaskState::Finished
    });
  }

  fn complete(self) {
    let mut pending = Some(self.observer);
    self.scheduler.schedule_in(self.frames, move || {
      if let Some(observer) = pending.take() {
        Observer::<V, Err>::complete(observer);
      }
      TaskState::Finished
    });
  }

  fn is_closed(&self) -> bool { Observer::<V, Err>::is_closed(&self.observer) }
}

// ==================== switch_map / concat_map ====================

#[derive(Clone, Copy, PartialEq, Eq)]
enum Flatten {
  /// A new outer value cancels the running inner stream.
  Switch,
  /// Outer values wait until the running inner stream completes.
  Concat,
}

pub struct FlatMap<S, F, In> {
  source: S,
  f: F,
  mode: Flatten,
  _in: PhantomData<fn(In)>,
}

pub fn switch_map<S, F, In, Inner, Out, Err>(source: S, f: F) -> FlatMap<S, F, In>
where
  S: Observable<In, Err>,
  F: FnMut(In) -> Inner,
  Inner: Observable<Out, Err>,
{
  FlatMap { source, f, mode: Flatten::Switch, _in: PhantomData }
}

pub fn concat_map<S, F, In, Inner, Out, Err>(source: S, f: F) -> FlatMap<S, F, In>
where
  S: Observable<In, Err>,
  F: FnMut(In) -> Inner,
  Inner: Observable<Out, Err>,
{
  FlatMap { source, f, mode: Flatten::Concat, _in: PhantomData }
}

struct FlatState<In, F> {
  f: F,
  buffer: VecDeque<In>,
  active: bool,
  outer_done: bool,
  /// Bumped for every inner stream; only the latest may emit.
  generation: u64,
}

struct FlatLink<O, F, In, Out> {
  downstream: SharedObserver<O>,
  state: Rc<RefCell<FlatState<In, F>>>,
  current: Rc<RefCell<Option<BoxedSubscription>>>,
  mode: Flatten,
  _out: PhantomData<fn() -> Out>,
}

impl<O, F, In, Out> Clone for FlatLink<O, F, In, Out> {
  fn clone(&self) -> Self {
    Self {
      downstream: self.downstream.clone(),
      state: self.state.clone(),
      current: self.current.clone(),
      mode: self.mode,
      _out: PhantomData,
    }
  }
}

impl<S, F, In, Inner, Out, Err> Observable<Out, Err> for FlatMap<S, F, In>
where
  S: Observable<In, Err>,
  F: FnMut(In) -> Inner + 'static,
  Inner: Observable<Out, Err>,
  In: 'static,
  Out: 'static,
  Err: 'static,
{
  type Unsub = FlatSubscription<S::Unsub>;

  fn actual_subscribe<O>(self, observer: O) -> Self::Unsub
  where
    O: Observer<Out, Err> + 'static,
  {
    let link = FlatLink {
      downstream: SharedObserver::new(observer),
      state: Rc::new(RefCell::new(FlatState {
        f: self.f,
        buffer: VecDeque::new(),
        active: false,
        outer_done: false,
        generation: 0,
      })),
      current: Rc::default(),
      mode: self.mode,
      _out: PhantomData,
    };
    let current = link.current.clone();
    let outer = self.source.actual_subscribe(FlatOuter(link));
    FlatSubscription { outer, current }
  }
}

fn start_inner<O, F, In, Inner, Out, Err>(link: &FlatLink<O, F, In, Out>, value: In)
where
  O: Observer<Out, Err> + 'static,
  F: FnMut(In) -> Inner + 'static,
  Inner: Observable<Out, Err>,
  In: 'static,
  Out: 'static,
  Err: 'static,
{
  let (inner, generation) = {
    let mut state = link.state.borrow_mut();
    state.active = true;
    state.generation += 1;
    ((state.f)(value), state.generation)
  };
  let subscription = inner.actual_subscribe(FlatInner { link: link.clone(), generation });
  let state = link.state.borrow();
  if state.active && state.generation == generation {
    *link.current.borrow_mut() = Some(BoxedSubscription::new(subscription));
  }
}

struct FlatOuter<O, F, In, Out>(FlatLink<O, F, In, Out>);

impl<O, F, In, Inner, Out, Err> Observer<In, Err> for FlatOuter<O, F, In, Out>
where
  O: Observer<Out, Err> + 'static,
  F: FnMut(In) -> Inner + 'static,
  Inner: Observable<Out, Err>,
  In: 'static,
  Out: 'static,
  Err: 'static,
{
  fn next(&mut self, value: In) {
    let link = &self.0;
    match link.mode {
      Flatten::Switch => {
        let previous = link.current.borrow_mut().take();
        if let Some(previous) = previous {
          previous.unsubscribe();
        }
        start_inner::<O, F, In, Inner, Out, Err>(link, value);
      }
      Flatten::Concat => {
        let busy = link.state.borrow().active;
        if busy {
          link.state.borrow_mut().buffer.push_back(value);
        } else {
          start_inner::<O, F, In, Inner, Out, Err>(link, value);
        }
      }
    }
  }

  fn error(self, err: Err) { Observer::<Out, Err>::error(self.0.downstream, err) }

  fn complete(self) {
    let idle = {
      let mut state = self.0.state.borrow_mut();
      state.outer_done = true;
      !state.active && state.buffer.is_empty()
    };
    if idle {
      Observer::<Out, Err>::complete(self.0.downstream);
    }
  }

  fn is_closed(&self) -> bool { Observer::<Out, Err>::is_closed(&self.0.downstream) }
}

struct FlatInner<O, F, In, Out> {
  link: FlatLink<O, F, In, Out>,
  generation: u64,
}

impl<O, F, In, Out> FlatInner<O, F, In, Out> {
  fn is_current(&self) -> bool { self.link.state.borrow().generation == self.generation }
}

impl<O, F, In, Inner, Out, Err> Observer<Out, Err> for FlatInner<O, F, In, Out>
where
  O: Observer<Out, Err> + 'static,
  F: FnMut(In) -> Inner + 'static,
  Inner: Observable<Out, Err>,
  In: 'static,
  Out: 'static,
  Err: 'static,
{
  fn next(&mut self, value: Out) {
    if self.is_current() {
      Observer::<Out, Err>::next(&mut self.link.downstream, value);
    }
  }

  fn error(self, err: Err) {
    if self.is_current() {
      Observer::<Out, Err>::error(self.link.downstream, err);
    }
  }

  fn complete(self) {
    if !self.is_current() {
      return;
    }
    let queued = {
      let mut state = self.link.state.borrow_mut();
      state.active = false;
      match self.link.mode {
        Flatten::Concat => state.buffer.pop_front(),
        Flatten::Switch => None,
      }
    };
    let finished = self.link.current.borrow_mut().take();
    drop(finished);
    match queued {
      Some(value) => start_inner::<O, F, In, Inner, Out, Err>(&self.link, value),
      None => {
        if self.link.state.borrow().outer_done {
          Observer::<Out, Err>::complete(self.link.downstream);
        }
      }
    }
  }

  fn is_closed(&self) -> bool { Observer::<Out, Err>::is_closed(&self.link.downstream) }
}

/// Unsubscribes the outer stream and the running inner one.
pub struct FlatSubscription<U> {
  outer: U,
  current: Rc<RefCell<Option<BoxedSubscription>>>,
}

impl<U: Subscription> Subscription for FlatSubscription<U> {
  fn unsubscribe(self) {
    self.outer.unsubscribe();
    let current = self.current.borrow_mut().take();
    if let Some(current) = current {
      current.unsubscribe();
    }
  }

  fn is_closed(&self) -> bool { self.outer.is_closed() && self.current.borrow().is_none() }
}

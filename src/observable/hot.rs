//! Hot marble sources.
//!
//! A hot source plays its timeline once, on the scheduler's absolute clock,
//! whether or not anyone is subscribed. Frame 0 of the timeline (the `^`
//! marker) is the frame the source was created on. Subscribers only see what
//! is emitted while they are subscribed; one that arrives after the source
//! terminated gets the terminal notification straight away.

use std::{
  cell::{Cell, RefCell},
  rc::Rc,
};

use smallvec::SmallVec;
use tracing::debug;

use crate::{
  error::TestError,
  notification::{Frame, NotificationKind, Timeline},
  observable::Observable,
  observer::{BoxedObserver, Observer},
  recorder::SubscriptionLogs,
  scheduler::{TaskState, TestScheduler},
  subscription::Subscription,
};

/// A source sharing one timeline between all subscribers.
///
/// Clones share the timeline, the subscribers and the subscription log.
pub struct HotObservable<V, E = TestError> {
  inner: Rc<HotInner<V, E>>,
}

struct HotInner<V, E> {
  timeline: Timeline<V, E>,
  scheduler: TestScheduler,
  logs: SubscriptionLogs,
  subscribers: RefCell<Vec<Slot<V, E>>>,
  terminal: RefCell<Option<NotificationKind<V, E>>>,
  next_id: Cell<u64>,
}

struct Slot<V, E> {
  id: u64,
  /// `None` while a notification is being delivered to it.
  observer: Option<BoxedObserver<'static, V, E>>,
  log: usize,
}

impl<V, E> Clone for HotObservable<V, E> {
  fn clone(&self) -> Self { Self { inner: self.inner.clone() } }
}

impl<V, E> HotObservable<V, E>
where
  V: Clone + 'static,
  E: Clone + 'static,
{
  /// Starts playing `timeline` with its frame 0 on the scheduler's current
  /// frame. Notifications already in the past are never delivered, but a
  /// terminal among them still ends the source.
  pub fn new(timeline: Timeline<V, E>, scheduler: TestScheduler) -> Self {
    let origin = scheduler.now();
    let inner = Rc::new(HotInner {
      timeline,
      scheduler: scheduler.clone(),
      logs: SubscriptionLogs::default(),
      subscribers: RefCell::new(Vec::new()),
      terminal: RefCell::new(None),
      next_id: Cell::new(0),
    });

    let notifications = inner.timeline.notifications();
    let mut cursor = notifications.iter().take_while(|n| n.frame < 0).count();
    if let Some(missed) = notifications[..cursor].iter().rev().find(|n| n.is_terminal()) {
      *inner.terminal.borrow_mut() = Some(missed.kind.clone());
    } else if let Some(first) = notifications.get(cursor) {
      let task_inner = inner.clone();
      scheduler.schedule_at(origin + first.frame, move || {
        let now = task_inner.scheduler.now() - origin;
        while let Some(n) = task_inner.timeline.notifications().get(cursor) {
          if n.frame > now {
            return TaskState::SleepFrames(n.frame - now);
          }
          cursor += 1;
          match &n.kind {
            NotificationKind::Next(v) => task_inner.broadcast(v),
            terminal => {
              task_inner.finish(terminal.clone());
              return TaskState::Finished;
            }
          }
        }
        TaskState::Finished
      });
    }
    Self { inner }
  }
}

impl<V, E> HotObservable<V, E> {
  pub fn timeline(&self) -> &Timeline<V, E> { &self.inner.timeline }

  pub fn subscriptions(&self) -> SubscriptionLogs { self.inner.logs.clone() }

  pub fn subscriber_count(&self) -> usize { self.inner.subscribers.borrow().len() }

  pub fn is_terminated(&self) -> bool { self.inner.terminal.borrow().is_some() }
}

impl<V: Clone, E: Clone> HotInner<V, E> {
  fn broadcast(&self, value: &V) {
    let ids: SmallVec<[u64; 4]> = self.subscribers.borrow().iter().map(|s| s.id).collect();
    for id in ids {
      let taken = self
        .subscribers
        .borrow_mut()
        .iter_mut()
        .find(|s| s.id == id)
        .and_then(|s| s.observer.take());
      let Some(mut observer) = taken else {
        continue;
      };
      observer.next(value.clone());
      // A slot that vanished meanwhile was unsubscribed; its observer is
      // dropped here.
      if let Some(slot) = self.subscribers.borrow_mut().iter_mut().find(|s| s.id == id) {
        slot.observer = Some(observer);
      }
    }
  }

  fn finish(&self, terminal: NotificationKind<V, E>) {
    let now = self.scheduler.now();
    debug!(frame = now, subscribers = self.subscribers.borrow().len(), "hot source terminated");
    *self.terminal.borrow_mut() = Some(terminal.clone());
    let slots = std::mem::take(&mut *self.subscribers.borrow_mut());
    for slot in slots {
      self.logs.close(slot.log, now);
      if let Some(observer) = slot.observer {
        deliver_terminal(observer, terminal.clone());
      }
    }
  }
}

fn deliver_terminal<V, E>(observer: impl Observer<V, E>, terminal: NotificationKind<V, E>) {
  match terminal {
    NotificationKind::Error(err) => observer.error(err),
    NotificationKind::Complete => observer.complete(),
    NotificationKind::Next(_) => {}
  }
}

impl<V, E> Observable<V, E> for HotObservable<V, E>
where
  V: Clone + 'static,
  E: Clone + 'static,
{
  type Unsub = HotSubscription<V, E>;

  fn actual_subscribe<O>(self, observer: O) -> HotSubscription<V, E>
  where
    O: Observer<V, E> + 'static,
  {
    let inner = self.inner;
    let now = inner.scheduler.now();
    let log = inner.logs.open(now);

    let terminal = inner.terminal.borrow().clone();
    if let Some(terminal) = terminal {
      debug!(frame = now, "subscribed to a terminated hot source");
      inner.logs.close(log, now);
      deliver_terminal(observer, terminal);
      return HotSubscription { inner, id: None, log };
    }

    let id = inner.next_id.get();
    inner.next_id.set(id + 1);
    debug!(frame = now, id, "hot source subscribed");
    inner.subscribers.borrow_mut().push(Slot { id, observer: Some(Box::new(observer)), log });
    HotSubscription { inner, id: Some(id), log }
  }
}

/// Ends one subscription to a [`HotObservable`].
pub struct HotSubscription<V, E> {
  inner: Rc<HotInner<V, E>>,
  id: Option<u64>,
  log: usize,
}

impl<V, E> Subscription for HotSubscription<V, E> {
  fn unsubscribe(self) {
    let now: Frame = self.inner.scheduler.now();
    if let Some(id) = self.id {
      // Dropped outside the borrow: observers may own other subscriptions.
      let removed = {
        let mut subscribers = self.inner.subscribers.borrow_mut();
        subscribers.iter().position(|s| s.id == id).map(|index| subscribers.remove(index))
      };
      if removed.is_some() {
        debug!(frame = now, id, "hot source unsubscribed");
      }
      drop(removed);
    }
    self.inner.logs.close(self.log, now);
  }

  fn is_closed(&self) -> bool { !self.inner.logs.is_open(self.log) }
}

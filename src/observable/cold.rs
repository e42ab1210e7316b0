//! Cold marble sources.
//!
//! Every subscription replays the whole timeline, shifted so that frame 0
//! is the frame the subscription happened on.

use std::rc::Rc;

use tracing::debug;

use crate::{
  error::TestError,
  notification::{Frame, NotificationKind, Timeline},
  observable::Observable,
  observer::Observer,
  recorder::SubscriptionLogs,
  scheduler::{TaskHandle, TaskState, TestScheduler},
  subscription::Subscription,
};

/// A source replaying a timeline per subscriber.
///
/// Clones share the timeline and the subscription log.
pub struct ColdObservable<V, E = TestError> {
  inner: Rc<ColdInner<V, E>>,
}

struct ColdInner<V, E> {
  timeline: Timeline<V, E>,
  scheduler: TestScheduler,
  logs: SubscriptionLogs,
}

impl<V, E> Clone for ColdObservable<V, E> {
  fn clone(&self) -> Self { Self { inner: self.inner.clone() } }
}

impl<V, E> ColdObservable<V, E> {
  pub fn new(timeline: Timeline<V, E>, scheduler: TestScheduler) -> Self {
    Self { inner: Rc::new(ColdInner { timeline, scheduler, logs: SubscriptionLogs::default() }) }
  }

  pub fn timeline(&self) -> &Timeline<V, E> { &self.inner.timeline }

  /// The windows in which this source has been subscribed, shared with the
  /// source so later subscriptions show up too.
  pub fn subscriptions(&self) -> SubscriptionLogs { self.inner.logs.clone() }
}

impl<V, E> Observable<V, E> for ColdObservable<V, E>
where
  V: Clone + 'static,
  E: Clone + 'static,
{
  type Unsub = ColdSubscription;

  fn actual_subscribe<O>(self, observer: O) -> ColdSubscription
  where
    O: Observer<V, E> + 'static,
  {
    let inner = self.inner;
    let subscribed_at = inner.scheduler.now();
    let log = inner.logs.open(subscribed_at);
    debug!(frame = subscribed_at, notifications = inner.timeline.len(), "cold source subscribed");

    let Some(first) = inner.timeline.iter().next().map(|n| n.frame.max(0)) else {
      return ColdSubscription {
        handle: TaskHandle::finished(),
        logs: inner.logs.clone(),
        log,
        scheduler: inner.scheduler.clone(),
      };
    };

    let scheduler = inner.scheduler.clone();
    let logs = inner.logs.clone();
    let mut observer = Some(observer);
    let mut cursor = 0;
    let handle = scheduler.schedule_at(subscribed_at + first, move || {
      let now = inner.scheduler.now();
      let offset: Frame = now - subscribed_at;
      let notifications = inner.timeline.notifications();
      while let Some(n) = notifications.get(cursor) {
        if n.frame > offset {
          return TaskState::SleepFrames(n.frame - offset);
        }
        cursor += 1;
        match &n.kind {
          NotificationKind::Next(v) => {
            if let Some(observer) = observer.as_mut() {
              observer.next(v.clone());
            }
          }
          NotificationKind::Error(e) => {
            inner.logs.close(log, now);
            if let Some(observer) = observer.take() {
              observer.error(e.clone());
            }
            return TaskState::Finished;
          }
          NotificationKind::Complete => {
            inner.logs.close(log, now);
            if let Some(observer) = observer.take() {
              observer.complete();
            }
            return TaskState::Finished;
          }
        }
        if !inner.logs.is_open(log) || observer.as_ref().is_none_or(Observer::is_closed) {
          return TaskState::Finished;
        }
      }
      TaskState::Finished
    });

    ColdSubscription { handle, logs, log, scheduler }
  }
}

/// Ends one subscription to a [`ColdObservable`].
pub struct ColdSubscription {
  handle: TaskHandle,
  logs: SubscriptionLogs,
  log: usize,
  scheduler: TestScheduler,
}

impl Subscription for ColdSubscription {
  fn unsubscribe(self) {
    let frame = self.scheduler.now();
    if self.logs.is_open(self.log) {
      debug!(frame, "cold source unsubscribed");
    }
    self.logs.close(self.log, frame);
    self.handle.cancel();
  }

  fn is_closed(&self) -> bool { !self.logs.is_open(self.log) }
}

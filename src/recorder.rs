//! Capturing what streams emit and when sources were subscribed.

use std::{cell::RefCell, rc::Rc};

use tracing::{trace, warn};

use crate::{
  notification::{Frame, Notification, SubscriptionLog, Timeline},
  observer::Observer,
  scheduler::TestScheduler,
};

/// A timeline filled in while the scheduler runs. Clones share storage.
pub struct RecordedTimeline<V, E>(Rc<RefCell<Timeline<V, E>>>);

impl<V, E> Clone for RecordedTimeline<V, E> {
  fn clone(&self) -> Self { Self(self.0.clone()) }
}

impl<V, E> Default for RecordedTimeline<V, E> {
  fn default() -> Self { Self(Rc::new(RefCell::new(Timeline::new()))) }
}

impl<V, E> RecordedTimeline<V, E> {
  pub fn new() -> Self { Self::default() }

  /// Everything recorded so far.
  pub fn snapshot(&self) -> Timeline<V, E>
  where
    V: Clone,
    E: Clone,
  {
    self.0.borrow().clone()
  }

  pub fn len(&self) -> usize { self.0.borrow().len() }

  pub fn is_empty(&self) -> bool { self.0.borrow().is_empty() }

  pub fn is_terminated(&self) -> bool { self.0.borrow().is_terminated() }

  fn record(&self, notification: Notification<V, E>) {
    let frame = notification.frame;
    if let Err(err) = self.0.borrow_mut().push(notification) {
      warn!(frame, %err, "dropped a notification that breaks the recorded timeline");
    }
  }
}

/// An observer that stamps every notification with the scheduler's current
/// frame.
pub struct Recorder<V, E> {
  timeline: RecordedTimeline<V, E>,
  scheduler: TestScheduler,
}

impl<V, E> Recorder<V, E> {
  pub fn new(scheduler: TestScheduler) -> Self { Self::with_timeline(RecordedTimeline::new(), scheduler) }

  /// A recorder appending to an existing timeline.
  pub fn with_timeline(timeline: RecordedTimeline<V, E>, scheduler: TestScheduler) -> Self {
    Self { timeline, scheduler }
  }

  pub fn timeline(&self) -> RecordedTimeline<V, E> { self.timeline.clone() }
}

impl<V, E> Observer<V, E> for Recorder<V, E> {
  fn next(&mut self, value: V) {
    let frame = self.scheduler.now();
    trace!(frame, "recorded next");
    self.timeline.record(Notification::next(frame, value));
  }

  fn error(self, err: E) {
    let frame = self.scheduler.now();
    trace!(frame, "recorded error");
    self.timeline.record(Notification::error(frame, err));
  }

  fn complete(self) {
    let frame = self.scheduler.now();
    trace!(frame, "recorded complete");
    self.timeline.record(Notification::complete(frame));
  }

  fn is_closed(&self) -> bool { false }
}

/// The subscription windows of one marble source. Clones share storage.
#[derive(Clone, Debug, Default)]
pub struct SubscriptionLogs(Rc<RefCell<Vec<SubscriptionLog>>>);

impl SubscriptionLogs {
  pub fn snapshot(&self) -> Vec<SubscriptionLog> { self.0.borrow().clone() }

  pub fn len(&self) -> usize { self.0.borrow().len() }

  pub fn is_empty(&self) -> bool { self.0.borrow().is_empty() }

  /// Opens a window at `frame` and returns its index.
  pub(crate) fn open(&self, frame: Frame) -> usize {
    let mut logs = self.0.borrow_mut();
    logs.push(SubscriptionLog::new(frame));
    logs.len() - 1
  }

  /// Closes window `index` at `frame`. Windows close once.
  pub(crate) fn close(&self, index: usize, frame: Frame) {
    if let Some(log) = self.0.borrow_mut().get_mut(index).filter(|log| log.is_open()) {
      log.unsubscribed = Some(frame.max(log.subscribed));
    }
  }

  pub(crate) fn is_open(&self, index: usize) -> bool {
    self.0.borrow().get(index).is_some_and(SubscriptionLog::is_open)
  }
}

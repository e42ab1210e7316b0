//! Timed notifications and the timelines they form.
//!
//! A [`Timeline`] is what a marble diagram parses into and what a recorder
//! captures from a stream under test. Both sides of every assertion are
//! timelines, so equality here is structural (see [`crate::compare`] for the
//! error-payload policy).

use std::slice;

use crate::error::TimelineError;

/// One virtual time unit.
///
/// Frames are non-negative for everything the scheduler executes. Hot
/// diagrams report notifications preceding their `^` marker with negative
/// frames.
pub type Frame = i64;

/// What happened at a frame.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum NotificationKind<V, E> {
  Next(V),
  Error(E),
  Complete,
}

impl<V, E> NotificationKind<V, E> {
  #[inline]
  pub fn is_terminal(&self) -> bool { !matches!(self, NotificationKind::Next(_)) }
}

/// A notification stamped with the frame it was (or is expected to be)
/// emitted at.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Notification<V, E> {
  pub frame: Frame,
  pub kind: NotificationKind<V, E>,
}

impl<V, E> Notification<V, E> {
  pub fn next(frame: Frame, value: V) -> Self { Self { frame, kind: NotificationKind::Next(value) } }

  pub fn error(frame: Frame, err: E) -> Self { Self { frame, kind: NotificationKind::Error(err) } }

  pub fn complete(frame: Frame) -> Self { Self { frame, kind: NotificationKind::Complete } }

  #[inline]
  pub fn is_terminal(&self) -> bool { self.kind.is_terminal() }
}

/// The ordered notifications of one stream.
///
/// Frames never decrease, and a terminal notification, if any, is the last
/// entry. Several `Next` notifications may share a frame; their order is the
/// emission order.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Timeline<V, E> {
  notifications: Vec<Notification<V, E>>,
}

impl<V, E> Default for Timeline<V, E> {
  fn default() -> Self { Self { notifications: Vec::new() } }
}

impl<V, E> Timeline<V, E> {
  pub fn new() -> Self { Self::default() }

  #[inline]
  pub fn notifications(&self) -> &[Notification<V, E>] { &self.notifications }

  #[inline]
  pub fn len(&self) -> usize { self.notifications.len() }

  #[inline]
  pub fn is_empty(&self) -> bool { self.notifications.is_empty() }

  pub fn iter(&self) -> slice::Iter<'_, Notification<V, E>> { self.notifications.iter() }

  /// The terminal notification, if the timeline has ended.
  pub fn terminal(&self) -> Option<&Notification<V, E>> {
    self.notifications.last().filter(|n| n.is_terminal())
  }

  #[inline]
  pub fn is_terminated(&self) -> bool { self.terminal().is_some() }

  /// Appends a notification, rejecting anything that would break the
  /// ordering or single-terminal invariants.
  pub fn push(&mut self, notification: Notification<V, E>) -> Result<(), TimelineError> {
    let index = self.notifications.len();
    if self.is_terminated() {
      return Err(TimelineError::AfterTerminal { index });
    }
    if let Some(last) = self.notifications.last() {
      if notification.frame < last.frame {
        return Err(TimelineError::Unordered { index, frame: notification.frame, previous: last.frame });
      }
    }
    self.notifications.push(notification);
    Ok(())
  }

  pub fn into_notifications(self) -> Vec<Notification<V, E>> { self.notifications }

  /// Wraps notifications the caller already produced in order.
  pub(crate) fn from_ordered(notifications: Vec<Notification<V, E>>) -> Self {
    debug_assert!(notifications.windows(2).all(|w| w[0].frame <= w[1].frame));
    debug_assert!(notifications.iter().rev().skip(1).all(|n| !n.is_terminal()));
    Self { notifications }
  }
}

impl<V, E> TryFrom<Vec<Notification<V, E>>> for Timeline<V, E> {
  type Error = TimelineError;

  fn try_from(notifications: Vec<Notification<V, E>>) -> Result<Self, Self::Error> {
    let mut timeline = Timeline::new();
    for n in notifications {
      timeline.push(n)?;
    }
    Ok(timeline)
  }
}

impl<V, E> IntoIterator for Timeline<V, E> {
  type Item = Notification<V, E>;
  type IntoIter = std::vec::IntoIter<Notification<V, E>>;

  fn into_iter(self) -> Self::IntoIter { self.notifications.into_iter() }
}

impl<'a, V, E> IntoIterator for &'a Timeline<V, E> {
  type Item = &'a Notification<V, E>;
  type IntoIter = slice::Iter<'a, Notification<V, E>>;

  fn into_iter(self) -> Self::IntoIter { self.notifications.iter() }
}

/// When a source was subscribed to, and when (if ever) that subscription
/// ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionLog {
  pub subscribed: Frame,
  pub unsubscribed: Option<Frame>,
}

impl SubscriptionLog {
  pub fn new(subscribed: Frame) -> Self { Self { subscribed, unsubscribed: None } }

  pub fn closed(subscribed: Frame, unsubscribed: Frame) -> Self {
    Self { subscribed, unsubscribed: Some(unsubscribed) }
  }

  #[inline]
  pub fn is_open(&self) -> bool { self.unsubscribed.is_none() }
}

//! Structural comparison of timelines and subscription windows.
//!
//! `Next` values compare with `PartialEq`. Error payloads often have no
//! meaningful equality, so by default two errors match on kind alone; an
//! [`ErrorMatch`] policy can tighten that.

use std::{fmt, fmt::Debug, rc::Rc};

use crate::{
  error::AssertionError,
  notification::{Notification, NotificationKind, SubscriptionLog, Timeline},
  parser::{TokenValue, Values},
  render::{describe_timeline, render_subscription, render_subscriptions, render_with_values},
};

/// How error payloads are compared.
pub enum ErrorMatch<E> {
  /// Any error matches any error.
  KindOnly,
  /// Errors match when the predicate says so.
  With(Rc<dyn Fn(&E, &E) -> bool>),
}

impl<E> ErrorMatch<E> {
  pub fn with(predicate: impl Fn(&E, &E) -> bool + 'static) -> Self {
    ErrorMatch::With(Rc::new(predicate))
  }

  /// Errors match when they are equal.
  pub fn strict() -> Self
  where
    E: PartialEq + 'static,
  {
    Self::with(|a: &E, b: &E| a == b)
  }

  pub fn matches(&self, expected: &E, actual: &E) -> bool {
    match self {
      ErrorMatch::KindOnly => true,
      ErrorMatch::With(predicate) => predicate(expected, actual),
    }
  }
}

impl<E> Default for ErrorMatch<E> {
  fn default() -> Self { ErrorMatch::KindOnly }
}

impl<E> Clone for ErrorMatch<E> {
  fn clone(&self) -> Self {
    match self {
      ErrorMatch::KindOnly => ErrorMatch::KindOnly,
      ErrorMatch::With(predicate) => ErrorMatch::With(predicate.clone()),
    }
  }
}

impl<E> fmt::Debug for ErrorMatch<E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ErrorMatch::KindOnly => f.write_str("KindOnly"),
      ErrorMatch::With(_) => f.write_str("With(..)"),
    }
  }
}

pub fn notifications_match<V: PartialEq, E>(
  expected: &Notification<V, E>, actual: &Notification<V, E>, errors: &ErrorMatch<E>,
) -> bool {
  if expected.frame != actual.frame {
    return false;
  }
  match (&expected.kind, &actual.kind) {
    (NotificationKind::Next(a), NotificationKind::Next(b)) => a == b,
    (NotificationKind::Error(a), NotificationKind::Error(b)) => errors.matches(a, b),
    (NotificationKind::Complete, NotificationKind::Complete) => true,
    _ => false,
  }
}

/// Same length and positionally matching notifications.
pub fn timelines_match<V: PartialEq, E>(
  expected: &Timeline<V, E>, actual: &Timeline<V, E>, errors: &ErrorMatch<E>,
) -> bool {
  expected.len() == actual.len()
    && expected.iter().zip(actual.iter()).all(|(e, a)| notifications_match(e, a, errors))
}

/// Windows match when they start together and end together (or both stay
/// open).
pub fn subscriptions_match(expected: &[SubscriptionLog], actual: &[SubscriptionLog]) -> bool {
  expected == actual
}

/// Compares two timelines, rendering both into the error on mismatch.
///
/// `values` names `Next` values in the rendering; it is normally the value
/// map the expected diagram was parsed with.
pub fn compare_timelines<V, E>(
  label: &str, expected: &Timeline<V, E>, actual: &Timeline<V, E>, errors: &ErrorMatch<E>,
  values: Option<&Values<V>>,
) -> Result<(), AssertionError>
where
  V: PartialEq + TokenValue + Debug,
  E: Debug,
{
  if timelines_match(expected, actual, errors) {
    return Ok(());
  }
  Err(AssertionError {
    label: label.to_string(),
    expected: render_with_values(expected, values),
    actual: render_with_values(actual, values),
    expected_listing: describe_timeline(expected),
    actual_listing: describe_timeline(actual),
  })
}

pub fn compare_subscriptions(
  label: &str, expected: &[SubscriptionLog], actual: &[SubscriptionLog],
) -> Result<(), AssertionError> {
  if subscriptions_match(expected, actual) {
    return Ok(());
  }
  let diagrams = |logs: &[SubscriptionLog]| -> String {
    logs.iter().map(render_subscription).collect::<Vec<_>>().join(" | ")
  };
  Err(AssertionError {
    label: label.to_string(),
    expected: diagrams(expected),
    actual: diagrams(actual),
    expected_listing: render_subscriptions(expected),
    actual_listing: render_subscriptions(actual),
  })
}

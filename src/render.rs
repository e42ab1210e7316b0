//! Rendering timelines and subscription windows back into diagrams.
//!
//! The output parses back to the same timeline for frames `>= 0`. Hot
//! notifications before the subscription point are left out of the diagram;
//! [`describe_timeline`] lists every notification with its frame.

use std::fmt::{Debug, Write};

use crate::{
  notification::{Frame, Notification, NotificationKind, SubscriptionLog, Timeline},
  parser::{TokenValue, Values},
};

/// Draws `timeline` using `token_of` for `Next` values.
pub fn render_timeline<V, E>(timeline: &Timeline<V, E>, mut token_of: impl FnMut(&V) -> char) -> String {
  let visible: Vec<&Notification<V, E>> = timeline.iter().filter(|n| n.frame >= 0).collect();
  let mut out = String::new();
  let mut cursor: Frame = 0;

  for group in visible.chunk_by(|a, b| a.frame == b.frame) {
    let frame = group[0].frame;
    pad(&mut out, frame - cursor);
    let mut symbols = group.iter().map(|n| symbol(&n.kind, &mut token_of));
    if group.len() == 1 {
      out.extend(symbols);
    } else {
      out.push('(');
      out.extend(&mut symbols);
      out.push(')');
    }
    cursor = frame + 1;
  }
  out
}

/// Draws `timeline`, naming values after the keys of `values` where one
/// matches and after [`TokenValue::to_token`] otherwise. Values with no
/// token are drawn as `?`.
pub fn render_with_values<V, E>(timeline: &Timeline<V, E>, values: Option<&Values<V>>) -> String
where
  V: TokenValue + PartialEq,
{
  render_timeline(timeline, |v| token_for(v, values))
}

pub(crate) fn token_for<V>(value: &V, values: Option<&Values<V>>) -> char
where
  V: TokenValue + PartialEq,
{
  values
    .and_then(|map| map.iter().find(|(_, candidate)| *candidate == value))
    .map(|(token, _)| *token)
    .or_else(|| value.to_token())
    .unwrap_or('?')
}

/// `"^---!"`, `"--^"` or `"(^!)"` when both happen on the same frame.
pub fn render_subscription(log: &SubscriptionLog) -> String {
  let mut out = String::new();
  pad(&mut out, log.subscribed);
  match log.unsubscribed {
    Some(end) if end == log.subscribed => out.push_str("(^!)"),
    Some(end) => {
      out.push('^');
      pad(&mut out, end - log.subscribed - 1);
      out.push('!');
    }
    None => out.push('^'),
  }
  out
}

pub fn render_subscriptions(logs: &[SubscriptionLog]) -> String {
  let rendered: Vec<String> = logs.iter().map(render_subscription).collect();
  format!("[{}]", rendered.join(", "))
}

/// `[1: next('a'), 3: complete]`
pub fn describe_timeline<V: Debug, E: Debug>(timeline: &Timeline<V, E>) -> String {
  let mut out = String::from("[");
  for (i, n) in timeline.iter().enumerate() {
    if i > 0 {
      out.push_str(", ");
    }
    // Writing into a String cannot fail.
    let _ = match &n.kind {
      NotificationKind::Next(v) => write!(out, "{}: next({v:?})", n.frame),
      NotificationKind::Error(e) => write!(out, "{}: error({e:?})", n.frame),
      NotificationKind::Complete => write!(out, "{}: complete", n.frame),
    };
  }
  out.push(']');
  out
}

fn symbol<V, E>(kind: &NotificationKind<V, E>, token_of: &mut impl FnMut(&V) -> char) -> char {
  match kind {
    NotificationKind::Next(v) => token_of(v),
    NotificationKind::Error(_) => '#',
    NotificationKind::Complete => '|',
  }
}

fn pad(out: &mut String, frames: Frame) {
  for _ in 0..frames.max(0) {
    out.push('-');
  }
}

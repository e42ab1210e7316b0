//! Marble diagram parser.
//!
//! | Marble | Meaning |
//! |--------|---------|
//! | ` ` | ignored, aligns diagrams |
//! | `-` | one frame passes |
//! | `a` | `Next` at the current frame, then one frame passes |
//! | `(ab)` | `a` and `b` on the same frame; the group takes one frame |
//! | `\|` | `Complete` |
//! | `#` | `Error` |
//! | `^` | subscription point; frames are reported relative to it |
//! | `!` | unsubscription point |
//! | `20ms` | time progression (`ms`, `s`, `m`), surrounded by spaces |
//!
//! Markers other than whitespace occupy a frame unless they are inside a
//! group, so `-a-^b` puts `b` one frame after the subscription point. A
//! terminal inside a group shares the group's frame (`(a|)`); one written
//! after the group lands on the next frame (`(a)|`).

use std::{collections::BTreeMap, time::Duration};

use tracing::trace;

use crate::{
  config::whole_frames,
  error::{ParseError, TestError},
  notification::{Frame, Notification, NotificationKind, SubscriptionLog, Timeline},
};

/// Substitutions for diagram tokens.
pub type Values<V> = BTreeMap<char, V>;

/// Conversion between a diagram token and a value when no [`Values`] entry
/// covers it.
///
/// Both methods default to `None`, so payload types that only ever come from
/// a value map can opt in with an empty `impl`.
pub trait TokenValue: Sized {
  fn from_token(token: char) -> Option<Self> {
    let _ = token;
    None
  }

  /// The token this value is drawn with when rendering a timeline.
  fn to_token(&self) -> Option<char> { None }
}

impl TokenValue for char {
  fn from_token(token: char) -> Option<Self> { Some(token) }

  fn to_token(&self) -> Option<char> { Some(*self) }
}

impl TokenValue for String {
  fn from_token(token: char) -> Option<Self> { Some(token.to_string()) }

  fn to_token(&self) -> Option<char> { single_char(self) }
}

impl TokenValue for &'static str {
  fn to_token(&self) -> Option<char> { single_char(self) }
}

fn single_char(s: &str) -> Option<char> {
  let mut chars = s.chars();
  let c = chars.next()?;
  chars.next().is_none().then_some(c)
}

macro_rules! impl_token_value_for_int {
  ($($t:ty),*) => {$(
    impl TokenValue for $t {
      fn from_token(token: char) -> Option<Self> {
        token.to_digit(10).and_then(|d| <$t>::try_from(d).ok())
      }

      fn to_token(&self) -> Option<char> {
        u32::try_from(*self).ok().and_then(|d| char::from_digit(d, 10))
      }
    }
  )*};
}

impl_token_value_for_int!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

macro_rules! impl_token_value_for_float {
  ($($t:ty),*) => {$(
    impl TokenValue for $t {
      fn from_token(token: char) -> Option<Self> { token.to_digit(10).map(|d| d as $t) }

      fn to_token(&self) -> Option<char> {
        if self.fract() == 0.0 && (0.0..10.0).contains(self) {
          char::from_digit(*self as u32, 10)
        } else {
          None
        }
      }
    }
  )*};
}

impl_token_value_for_float!(f32, f64);

/// A diagram together with its value map and error payload.
///
/// ```rust
/// use rxrust_marbles::prelude::*;
///
/// let values = Values::from([('a', 1)]);
/// let parsed = Marbles::new("-a-#")
///   .values(&values)
///   .error(TestError::new("Oops!"))
///   .parse(Duration::from_millis(10))
///   .unwrap();
/// assert_eq!(parsed.timeline.len(), 2);
/// ```
#[derive(Clone, Debug)]
pub struct Marbles<'a, V, E = TestError> {
  diagram: &'a str,
  values: Option<&'a Values<V>>,
  error: Option<E>,
}

impl<'a, V, E> Marbles<'a, V, E> {
  pub fn new(diagram: &'a str) -> Self { Self { diagram, values: None, error: None } }

  pub fn values(mut self, values: &'a Values<V>) -> Self {
    self.values = Some(values);
    self
  }

  /// The payload `#` produces. Without one, `E::default()` is used.
  pub fn error(mut self, error: E) -> Self {
    self.error = Some(error);
    self
  }

  #[inline]
  pub fn diagram(&self) -> &'a str { self.diagram }

  #[inline]
  pub fn value_map(&self) -> Option<&'a Values<V>> { self.values }

  pub fn parse(self, frame_duration: Duration) -> Result<ParsedMarbles<V, E>, ParseError>
  where
    V: TokenValue + Clone,
    E: Default,
  {
    parse_marbles(self.diagram, self.values, self.error, frame_duration)
  }
}

/// The result of parsing an observable diagram.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedMarbles<V, E> {
  pub timeline: Timeline<V, E>,
  /// Frame of the `^` marker. Always `Some(0)` when present since the
  /// timeline is expressed relative to it.
  pub subscribed: Option<Frame>,
  /// Frame of the `!` marker, on the same scale as the timeline.
  pub unsubscribed: Option<Frame>,
}

/// Parses an observable diagram.
///
/// Tokens resolve through `values` first and [`TokenValue::from_token`]
/// second. `#` yields `error`, or `E::default()` when none is given.
pub fn parse_marbles<V, E>(
  diagram: &str, values: Option<&Values<V>>, error: Option<E>, frame_duration: Duration,
) -> Result<ParsedMarbles<V, E>, ParseError>
where
  V: TokenValue + Clone,
  E: Default,
{
  let lexemes = lex(diagram, frame_duration)?;
  let walk = walk(&lexemes)?;
  let origin = walk.subscribed.map_or(0, |(frame, _)| frame);

  let mut error = error;
  let mut notifications = Vec::with_capacity(walk.emissions.len());
  for Emission { frame, position, mark } in walk.emissions {
    let kind = match mark {
      Mark::Token(token) => NotificationKind::Next(resolve(token, position, values)?),
      Mark::Error => NotificationKind::Error(error.take().unwrap_or_default()),
      Mark::Complete => NotificationKind::Complete,
    };
    notifications.push(Notification { frame: frame - origin, kind });
  }

  let parsed = ParsedMarbles {
    timeline: Timeline::from_ordered(notifications),
    subscribed: walk.subscribed.map(|(frame, _)| frame - origin),
    unsubscribed: walk.unsubscribed.map(|(frame, _)| frame - origin),
  };
  trace!(diagram, notifications = parsed.timeline.len(), "parsed marble diagram");
  Ok(parsed)
}

/// Parses a subscription diagram such as `"--^---!"`.
///
/// Only time (`-`, groups, progressions), `^` and `!` are allowed, `^` is
/// required, and frames are absolute rather than relative to `^`.
pub fn parse_subscription_marbles(
  diagram: &str, frame_duration: Duration,
) -> Result<SubscriptionLog, ParseError> {
  let lexemes = lex(diagram, frame_duration)?;
  let walk = walk(&lexemes)?;

  if let Some(emission) = walk.emissions.first() {
    let marker = match emission.mark {
      Mark::Token(token) => token,
      Mark::Complete => '|',
      Mark::Error => '#',
    };
    return Err(ParseError::UnexpectedMarker {
      marker,
      position: emission.position,
      context: "subscription",
    });
  }

  let (subscribed, _) =
    walk.subscribed.ok_or(ParseError::MissingSubscription { position: diagram.len() })?;
  let log = match walk.unsubscribed {
    Some((unsubscribed, position)) if unsubscribed < subscribed => {
      return Err(ParseError::UnexpectedMarker { marker: '!', position, context: "subscription" });
    }
    Some((unsubscribed, _)) => SubscriptionLog::closed(subscribed, unsubscribed),
    None => SubscriptionLog::new(subscribed),
  };
  trace!(diagram, ?log, "parsed subscription diagram");
  Ok(log)
}

fn resolve<V>(token: char, position: usize, values: Option<&Values<V>>) -> Result<V, ParseError>
where
  V: TokenValue + Clone,
{
  values
    .and_then(|map| map.get(&token))
    .cloned()
    .or_else(|| V::from_token(token))
    .ok_or(ParseError::UnmappedToken { token, position })
}

// ==================== Lexing ====================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Lexeme {
  Advance(Frame),
  Open,
  Close,
  Complete,
  Error,
  Subscribe,
  Unsubscribe,
  Token(char),
}

#[derive(Clone, Copy, Debug)]
struct Lexed {
  position: usize,
  ch: char,
  lexeme: Lexeme,
}

fn lex(diagram: &str, frame_duration: Duration) -> Result<Vec<Lexed>, ParseError> {
  let mut lexemes = Vec::with_capacity(diagram.len());
  let mut after_space = true;
  let mut chars = diagram.char_indices();

  while let Some((position, ch)) = chars.next() {
    if ch.is_whitespace() {
      after_space = true;
      continue;
    }
    let at_boundary = std::mem::replace(&mut after_space, false);

    let lexeme = match ch {
      '-' => Lexeme::Advance(1),
      '(' => Lexeme::Open,
      ')' => Lexeme::Close,
      '|' => Lexeme::Complete,
      '#' => Lexeme::Error,
      '^' => Lexeme::Subscribe,
      '!' => Lexeme::Unsubscribe,
      c if at_boundary && c.is_ascii_digit() => {
        match time_progression(&diagram[position..], position, frame_duration)? {
          Some((len, frames)) => {
            // The progression is ASCII, so its remaining bytes are chars.
            for _ in 1..len {
              chars.next();
            }
            Lexeme::Advance(frames)
          }
          None => Lexeme::Token(c),
        }
      }
      c => Lexeme::Token(c),
    };
    lexemes.push(Lexed { position, ch, lexeme });
  }
  Ok(lexemes)
}

const NANOS_PER_MS: u128 = 1_000_000;
const NANOS_PER_S: u128 = 1_000_000_000;
const NANOS_PER_MIN: u128 = 60_000_000_000;

/// Recognizes `<digits>[.<digits>](ms|s|m)` followed by whitespace or the end
/// of input. Returns the byte length and the number of frames it spans.
fn time_progression(
  rest: &str, position: usize, frame_duration: Duration,
) -> Result<Option<(usize, Frame)>, ParseError> {
  let bytes = rest.as_bytes();
  let int_len = bytes.iter().take_while(|b| b.is_ascii_digit()).count();
  let mut end = int_len;
  let mut frac_len = 0;
  if bytes.get(end) == Some(&b'.') {
    frac_len = bytes[end + 1..].iter().take_while(|b| b.is_ascii_digit()).count();
    if frac_len == 0 {
      return Ok(None);
    }
    end += 1 + frac_len;
  }

  let number_end = end;
  let unit = &rest[number_end..];
  let (unit_len, unit_nanos) = if unit.starts_with("ms") {
    (2, NANOS_PER_MS)
  } else if unit.starts_with('s') {
    (1, NANOS_PER_S)
  } else if unit.starts_with('m') {
    (1, NANOS_PER_MIN)
  } else {
    return Ok(None);
  };
  end += unit_len;
  if rest[end..].chars().next().is_some_and(|c| !c.is_whitespace()) {
    return Ok(None);
  }

  let text = &rest[..end];
  let unaligned =
    || ParseError::UnalignedDuration { text: text.to_string(), position, frame: frame_duration };

  let digits: String = rest[..number_end].chars().filter(char::is_ascii_digit).collect();
  let scale = u32::try_from(frac_len)
    .ok()
    .and_then(|exp| 10u128.checked_pow(exp))
    .ok_or_else(unaligned)?;
  let scaled = digits
    .parse::<u128>()
    .ok()
    .and_then(|n| n.checked_mul(unit_nanos))
    .ok_or_else(unaligned)?;
  if scaled % scale != 0 {
    return Err(unaligned());
  }
  let nanos = scaled / scale;
  let secs = u64::try_from(nanos / NANOS_PER_S).map_err(|_| unaligned())?;
  let duration = Duration::new(secs, (nanos % NANOS_PER_S) as u32);
  let frames = whole_frames(duration, frame_duration).ok_or_else(unaligned)?;
  Ok(Some((end, frames)))
}

// ==================== Frame assignment ====================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mark {
  Token(char),
  Complete,
  Error,
}

#[derive(Clone, Copy, Debug)]
struct Emission {
  frame: Frame,
  position: usize,
  mark: Mark,
}

#[derive(Debug, Default)]
struct Walk {
  emissions: Vec<Emission>,
  subscribed: Option<(Frame, usize)>,
  unsubscribed: Option<(Frame, usize)>,
}

fn walk(lexemes: &[Lexed]) -> Result<Walk, ParseError> {
  let mut walk = Walk::default();
  let mut frame: Frame = 0;
  // (frame the group started on, position of its `(`)
  let mut group: Option<(Frame, usize)> = None;
  let mut terminated = false;

  for &Lexed { position, ch, lexeme } in lexemes {
    let at = group.map_or(frame, |(start, _)| start);
    let step = if group.is_some() { 0 } else { 1 };

    match lexeme {
      Lexeme::Advance(frames) => {
        if group.is_some() {
          return Err(ParseError::AdvanceInsideGroup { marker: ch, position });
        }
        frame = advance(frame, frames, position)?;
      }
      Lexeme::Open => {
        if group.is_some() {
          return Err(ParseError::NestedGroup { position });
        }
        group = Some((frame, position));
      }
      Lexeme::Close => {
        if group.take().is_none() {
          return Err(ParseError::UnmatchedClose { position });
        }
        frame = advance(frame, 1, position)?;
      }
      Lexeme::Token(token) => {
        if terminated {
          return Err(ParseError::EmissionAfterTerminal { token, position });
        }
        walk.emissions.push(Emission { frame: at, position, mark: Mark::Token(token) });
        frame = advance(frame, step, position)?;
      }
      Lexeme::Complete | Lexeme::Error => {
        if terminated {
          return Err(ParseError::MultipleTerminals { marker: ch, position });
        }
        terminated = true;
        let mark = if lexeme == Lexeme::Complete { Mark::Complete } else { Mark::Error };
        walk.emissions.push(Emission { frame: at, position, mark });
        frame = advance(frame, step, position)?;
      }
      Lexeme::Subscribe | Lexeme::Unsubscribe => {
        let slot = if lexeme == Lexeme::Subscribe {
          &mut walk.subscribed
        } else {
          &mut walk.unsubscribed
        };
        if slot.is_some() {
          return Err(ParseError::RepeatedMarker { marker: ch, position });
        }
        *slot = Some((at, position));
        frame = advance(frame, step, position)?;
      }
    }
  }

  if let Some((_, position)) = group {
    return Err(ParseError::UnclosedGroup { position });
  }
  Ok(walk)
}

fn advance(frame: Frame, by: Frame, position: usize) -> Result<Frame, ParseError> {
  frame.checked_add(by).ok_or(ParseError::FrameOverflow { position })
}

#[cfg(test)]
mod tests {
  use super::*;

  const TEN_MS: Duration = Duration::from_millis(10);
  const ONE_MS: Duration = Duration::from_millis(1);

  type N<V> = Notification<V, TestError>;

  fn parse<V: TokenValue + Clone>(diagram: &str) -> Result<ParsedMarbles<V, TestError>, ParseError> {
    parse_marbles(diagram, None, None, TEN_MS)
  }

  fn notifications<V: TokenValue + Clone>(diagram: &str) -> Vec<N<V>> {
    parse::<V>(diagram).unwrap().timeline.into_notifications()
  }

  #[rxrust_marbles_macro::test]
  fn values_from_map() {
    let values = Values::from([('a', 1)]);
    let parsed = parse_marbles::<_, TestError>("-a-|", Some(&values), None, TEN_MS).unwrap();
    assert_eq!(parsed.timeline.notifications(), &[N::next(1, 1), N::complete(3)]);
    assert_eq!(parsed.subscribed, None);
  }

  #[rxrust_marbles_macro::test]
  fn unmapped_tokens_fall_back_to_chars() {
    assert_eq!(notifications::<char>("-a-b|"), vec![
      N::next(1, 'a'),
      N::next(3, 'b'),
      N::complete(4)
    ]);
  }

  #[rxrust_marbles_macro::test]
  fn digits_coerce_to_numbers() {
    assert_eq!(notifications::<i32>("  -1--3-|"), vec![
      N::next(1, 1),
      N::next(4, 3),
      N::complete(6)
    ]);
  }

  #[rxrust_marbles_macro::test]
  fn unmapped_letter_for_numeric_value() {
    assert_eq!(parse::<i32>("-a"), Err(ParseError::UnmappedToken { token: 'a', position: 1 }));
  }

  #[rxrust_marbles_macro::test]
  fn whitespace_takes_no_time() {
    assert_eq!(notifications::<char>("   --"), vec![]);
    assert_eq!(notifications::<char>(" a  b "), notifications::<char>("ab"));
  }

  #[rxrust_marbles_macro::test]
  fn group_shares_one_frame() {
    assert_eq!(notifications::<char>("-(abc)d"), vec![
      N::next(1, 'a'),
      N::next(1, 'b'),
      N::next(1, 'c'),
      N::next(2, 'd'),
    ]);
  }

  #[rxrust_marbles_macro::test]
  fn terminal_inside_group_shares_its_frame() {
    assert_eq!(notifications::<char>("(abc|)"), vec![
      N::next(0, 'a'),
      N::next(0, 'b'),
      N::next(0, 'c'),
      N::complete(0),
    ]);
  }

  #[rxrust_marbles_macro::test]
  fn terminal_after_group_takes_next_frame() {
    assert_eq!(notifications::<char>("(abc)|"), vec![
      N::next(0, 'a'),
      N::next(0, 'b'),
      N::next(0, 'c'),
      N::complete(1),
    ]);
  }

  #[rxrust_marbles_macro::test]
  fn error_uses_default_or_given_payload() {
    assert_eq!(notifications::<char>("--#"), vec![N::error(2, TestError::default())]);

    let parsed =
      parse_marbles::<char, _>("--#", None, Some(TestError::new("Oops!")), TEN_MS).unwrap();
    assert_eq!(parsed.timeline.notifications(), &[N::error(2, TestError::new("Oops!"))]);
  }

  #[rxrust_marbles_macro::test]
  fn hot_frames_are_relative_to_subscription_point() {
    let values = Values::from([('a', 5), ('b', 6), ('c', 7)]);
    let parsed =
      parse_marbles::<_, TestError>("-a-^b---c-|", Some(&values), None, TEN_MS).unwrap();
    assert_eq!(parsed.subscribed, Some(0));
    assert_eq!(parsed.timeline.notifications(), &[
      N::next(-2, 5),
      N::next(1, 6),
      N::next(5, 7),
      N::complete(7),
    ]);
  }

  #[rxrust_marbles_macro::test]
  fn unsubscription_point_does_not_terminate() {
    let parsed = parse::<char>("^-a-!-b").unwrap();
    assert_eq!(parsed.unsubscribed, Some(4));
    assert_eq!(parsed.timeline.notifications(), &[N::next(2, 'a'), N::next(6, 'b')]);
  }

  #[rxrust_marbles_macro::test]
  fn time_progressions() {
    let parsed =
      parse_marbles::<char, TestError>("20ms (a|)", None, None, ONE_MS).unwrap().timeline;
    assert_eq!(parsed.notifications(), &[N::next(20, 'a'), N::complete(20)]);

    let values = Values::from([('a', 0), ('b', 2)]);
    let parsed =
      parse_marbles::<_, TestError>("10ms a 19ms b 9ms |", Some(&values), None, ONE_MS).unwrap();
    assert_eq!(parsed.timeline.notifications(), &[
      N::next(10, 0),
      N::next(30, 2),
      N::complete(40)
    ]);

    let parsed = parse_marbles::<char, TestError>("1.5s a", None, None, TEN_MS).unwrap();
    assert_eq!(parsed.timeline.notifications(), &[N::next(150, 'a')]);

    let parsed = parse_marbles::<char, TestError>("1m |", None, None, Duration::from_secs(1));
    assert_eq!(parsed.unwrap().timeline.notifications(), &[N::complete(60)]);
  }

  #[rxrust_marbles_macro::test]
  fn digits_not_shaped_like_time_are_tokens() {
    assert_eq!(notifications::<char>("12ms-"), vec![
      N::next(0, '1'),
      N::next(1, '2'),
      N::next(2, 'm'),
      N::next(3, 's')
    ]);
    assert_eq!(notifications::<char>("-1ms"), vec![
      N::next(1, '1'),
      N::next(2, 'm'),
      N::next(3, 's')
    ]);
  }

  #[rxrust_marbles_macro::test]
  fn unaligned_time_progression() {
    assert_eq!(
      parse::<char>("15ms a"),
      Err(ParseError::UnalignedDuration { text: "15ms".into(), position: 0, frame: TEN_MS })
    );
  }

  #[rxrust_marbles_macro::test]
  fn frames_past_the_clock_range_are_rejected() {
    assert_eq!(
      parse::<char>("50000000000000000s 50000000000000000s a"),
      Err(ParseError::FrameOverflow { position: 19 })
    );
    assert!(parse::<char>("50000000000000000s a").is_ok());
  }

  #[rxrust_marbles_macro::test]
  fn malformed_groups() {
    assert_eq!(parse::<char>("-(ab"), Err(ParseError::UnclosedGroup { position: 1 }));
    assert_eq!(parse::<char>("ab)"), Err(ParseError::UnmatchedClose { position: 2 }));
    assert_eq!(parse::<char>("((a))"), Err(ParseError::NestedGroup { position: 1 }));
    assert_eq!(
      parse::<char>("(a-b)"),
      Err(ParseError::AdvanceInsideGroup { marker: '-', position: 2 })
    );
  }

  #[rxrust_marbles_macro::test]
  fn malformed_terminals_and_markers() {
    assert_eq!(
      parse::<char>("-|-#"),
      Err(ParseError::MultipleTerminals { marker: '#', position: 3 })
    );
    assert_eq!(
      parse::<char>("-|a"),
      Err(ParseError::EmissionAfterTerminal { token: 'a', position: 2 })
    );
    assert_eq!(parse::<char>("^-^"), Err(ParseError::RepeatedMarker { marker: '^', position: 2 }));
    assert_eq!(parse::<char>("!-!"), Err(ParseError::RepeatedMarker { marker: '!', position: 2 }));
  }

  #[rxrust_marbles_macro::test]
  fn parsing_is_pure() {
    let values = Values::from([('a', "x"), ('b', "y")]);
    let first = parse_marbles::<_, TestError>("-a-(ab)-b-#", Some(&values), None, TEN_MS);
    let second = parse_marbles::<_, TestError>("-a-(ab)-b-#", Some(&values), None, TEN_MS);
    assert_eq!(first, second);
  }

  #[rxrust_marbles_macro::test]
  fn subscription_diagrams() {
    assert_eq!(parse_subscription_marbles("^------!", TEN_MS), Ok(SubscriptionLog::closed(0, 7)));
    assert_eq!(parse_subscription_marbles("  --^--", TEN_MS), Ok(SubscriptionLog::new(2)));
    assert_eq!(parse_subscription_marbles("(^!)", TEN_MS), Ok(SubscriptionLog::closed(0, 0)));
    assert_eq!(parse_subscription_marbles("5ms ^ 20ms !", Duration::from_millis(5)), Ok(
      SubscriptionLog::closed(1, 6)
    ));
  }

  #[rxrust_marbles_macro::test]
  fn malformed_subscription_diagrams() {
    assert_eq!(
      parse_subscription_marbles("^-a-!", TEN_MS),
      Err(ParseError::UnexpectedMarker { marker: 'a', position: 2, context: "subscription" })
    );
    assert_eq!(
      parse_subscription_marbles("---", TEN_MS),
      Err(ParseError::MissingSubscription { position: 3 })
    );
    assert_eq!(
      parse_subscription_marbles("!-^", TEN_MS),
      Err(ParseError::UnexpectedMarker { marker: '!', position: 0, context: "subscription" })
    );
  }
}

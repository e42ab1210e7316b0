//! Errors raised while parsing diagrams, driving the virtual clock and
//! comparing timelines.

use std::{borrow::Cow, time::Duration};

use crate::notification::Frame;

/// A malformed marble diagram. Every variant names the byte offset of the
/// offending character.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
  #[error("unmatched `)` at position {position}")]
  UnmatchedClose { position: usize },

  #[error("group opened at position {position} is never closed")]
  UnclosedGroup { position: usize },

  #[error("nested `(` at position {position}")]
  NestedGroup { position: usize },

  #[error("`{marker}` at position {position} cannot appear inside a group")]
  AdvanceInsideGroup { marker: char, position: usize },

  #[error("second terminal marker `{marker}` at position {position}")]
  MultipleTerminals { marker: char, position: usize },

  #[error("emission `{token}` at position {position} follows the terminal marker")]
  EmissionAfterTerminal { token: char, position: usize },

  #[error("repeated `{marker}` marker at position {position}")]
  RepeatedMarker { marker: char, position: usize },

  #[error("`{marker}` at position {position} is not allowed in {context} diagrams")]
  UnexpectedMarker { marker: char, position: usize, context: &'static str },

  #[error("subscription diagram has no `^` marker (end of input at position {position})")]
  MissingSubscription { position: usize },

  #[error("token `{token}` at position {position} has no value mapping")]
  UnmappedToken { token: char, position: usize },

  #[error(
    "time progression `{text}` at position {position} is not a whole number of {frame:?} frames"
  )]
  UnalignedDuration { text: String, position: usize, frame: Duration },

  #[error("diagram runs past the last representable frame at position {position}")]
  FrameOverflow { position: usize },
}

impl ParseError {
  pub fn position(&self) -> usize {
    match self {
      ParseError::UnmatchedClose { position }
      | ParseError::UnclosedGroup { position }
      | ParseError::NestedGroup { position }
      | ParseError::AdvanceInsideGroup { position, .. }
      | ParseError::MultipleTerminals { position, .. }
      | ParseError::EmissionAfterTerminal { position, .. }
      | ParseError::RepeatedMarker { position, .. }
      | ParseError::UnexpectedMarker { position, .. }
      | ParseError::MissingSubscription { position }
      | ParseError::FrameOverflow { position }
      | ParseError::UnmappedToken { position, .. }
      | ParseError::UnalignedDuration { position, .. } => *position,
    }
  }
}

/// An actual timeline (or list of subscription windows) that differs from
/// the expected one. Both sides are rendered back into diagram form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
  "{label} did not match\n  expected: {expected}\n  actual:   {actual}\n  expected \
   notifications: {expected_listing}\n  actual notifications:   {actual_listing}"
)]
pub struct AssertionError {
  pub label: String,
  pub expected: String,
  pub actual: String,
  pub expected_listing: String,
  pub actual_listing: String,
}

/// The virtual clock could not drain its queue within the configured bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerOverrunError {
  #[error("a task is due at frame {next}, past the {limit} frame limit ({pending} tasks pending)")]
  MaxFrames { limit: Frame, next: Frame, pending: usize },

  #[error("{limit} tasks ran at frame {frame} without the virtual clock advancing")]
  Stalled { frame: Frame, limit: usize },
}

/// A notification that would break a timeline's invariants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TimelineError {
  #[error("notification {index} at frame {frame} precedes frame {previous}")]
  Unordered { index: usize, frame: Frame, previous: Frame },

  #[error("notification {index} follows the terminal notification")]
  AfterTerminal { index: usize },
}

/// Any failure of a marble run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarbleError {
  #[error(transparent)]
  Parse(#[from] ParseError),

  #[error(transparent)]
  Assertion(#[from] AssertionError),

  #[error(transparent)]
  Overrun(#[from] SchedulerOverrunError),
}

/// The error payload `#` produces when a diagram is not given one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, thiserror::Error)]
#[error("{message}")]
pub struct TestError {
  message: Cow<'static, str>,
}

impl TestError {
  pub fn new(message: impl Into<Cow<'static, str>>) -> Self { Self { message: message.into() } }

  pub fn message(&self) -> &str { &self.message }
}

impl Default for TestError {
  fn default() -> Self { Self::new("error") }
}

//! Scheduler configuration.
//!
//! Defaults are 10 ms per frame, a 750 frame bound and a stall limit of
//! 10 000 task runs per frame. They can be overridden for the whole process
//! through the environment:
//!
//! | Variable | Meaning |
//! |----------|---------|
//! | `RXRUST_MARBLES_FRAME_MS` | milliseconds per frame |
//! | `RXRUST_MARBLES_MAX_FRAMES` | last frame a task may be due at |
//! | `RXRUST_MARBLES_STALL_LIMIT` | task runs allowed without the clock advancing |
//!
//! The environment is read once, the first time a default configuration is
//! needed.

use std::time::Duration;

use once_cell::sync::Lazy;
use tracing::warn;

use crate::notification::Frame;

pub const DEFAULT_FRAME_DURATION: Duration = Duration::from_millis(10);
pub const DEFAULT_MAX_FRAMES: Frame = 750;
pub const DEFAULT_STALL_LIMIT: usize = 10_000;

pub const FRAME_MS_VAR: &str = "RXRUST_MARBLES_FRAME_MS";
pub const MAX_FRAMES_VAR: &str = "RXRUST_MARBLES_MAX_FRAMES";
pub const STALL_LIMIT_VAR: &str = "RXRUST_MARBLES_STALL_LIMIT";

static ENV_DEFAULTS: Lazy<SchedulerConfig> =
  Lazy::new(|| SchedulerConfig::from_lookup(|key| std::env::var(key).ok()));

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SchedulerConfig {
  /// How much time one `-` stands for. Time progressions such as `20ms` and
  /// `Duration` delays are converted with it.
  pub frame_duration: Duration,
  /// A task due after this frame aborts the run with
  /// [`SchedulerOverrunError::MaxFrames`](crate::error::SchedulerOverrunError).
  pub max_frames: Frame,
  /// Consecutive task runs allowed on a single frame.
  pub stall_limit: usize,
}

impl Default for SchedulerConfig {
  fn default() -> Self { *ENV_DEFAULTS }
}

impl SchedulerConfig {
  /// The built-in defaults, ignoring the environment.
  pub const fn builtin() -> Self {
    Self {
      frame_duration: DEFAULT_FRAME_DURATION,
      max_frames: DEFAULT_MAX_FRAMES,
      stall_limit: DEFAULT_STALL_LIMIT,
    }
  }

  /// Builds a configuration from a variable lookup, falling back to the
  /// built-in value for anything missing or malformed.
  pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
    let mut config = Self::builtin();
    if let Some(ms) = read_var::<u64>(&lookup, FRAME_MS_VAR).filter(|ms| *ms > 0) {
      config.frame_duration = Duration::from_millis(ms);
    }
    if let Some(max) = read_var::<Frame>(&lookup, MAX_FRAMES_VAR).filter(|max| *max >= 0) {
      config.max_frames = max;
    }
    if let Some(limit) = read_var::<usize>(&lookup, STALL_LIMIT_VAR).filter(|limit| *limit > 0) {
      config.stall_limit = limit;
    }
    config
  }

  /// Frames needed for `duration` to elapse, rounding partial frames up.
  pub fn frames_ceil(&self, duration: Duration) -> Frame {
    let frame = self.frame_duration.as_nanos().max(1);
    Frame::try_from(duration.as_nanos().div_ceil(frame)).unwrap_or(Frame::MAX)
  }

  pub fn duration_of(&self, frames: Frame) -> Duration {
    let frames = u32::try_from(frames.max(0)).unwrap_or(u32::MAX);
    self.frame_duration.saturating_mul(frames)
  }
}

/// Whole frames of `frame_duration` in `duration`, if it divides evenly.
pub(crate) fn whole_frames(duration: Duration, frame_duration: Duration) -> Option<Frame> {
  let frame = frame_duration.as_nanos();
  let nanos = duration.as_nanos();
  if frame == 0 || nanos % frame != 0 {
    return None;
  }
  Frame::try_from(nanos / frame).ok()
}

fn read_var<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
  let raw = lookup(key)?;
  match raw.trim().parse() {
    Ok(value) => Some(value),
    Err(_) => {
      warn!(key, value = %raw, "ignoring malformed scheduler setting");
      None
    }
  }
}

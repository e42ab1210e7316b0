//! The virtual clock.
//!
//! Each [`TestScheduler`] is an independent instance: its clock starts at
//! frame 0 and only moves when the scheduler is driven. Clones share the
//! same clock and queue, so a clone can be captured by tasks and sources
//! that need to schedule more work.
//!
//! ```rust
//! use std::{cell::RefCell, rc::Rc};
//!
//! use rxrust_marbles::prelude::*;
//!
//! let scheduler = TestScheduler::new();
//! let log = Rc::new(RefCell::new(vec![]));
//!
//! let c_log = log.clone();
//! let c_scheduler = scheduler.clone();
//! scheduler.schedule_in(3, move || {
//!   c_log.borrow_mut().push(c_scheduler.now());
//!   TaskState::Finished
//! });
//!
//! scheduler.flush().unwrap();
//! assert_eq!(*log.borrow(), vec![3]);
//! ```

use std::{
  cell::RefCell,
  cmp::Ordering,
  collections::BinaryHeap,
  future::Future,
  rc::Rc,
  task::{Context, Poll},
  time::Duration,
};

use futures::{future::LocalBoxFuture, FutureExt};
use tracing::{debug, trace, warn};

use super::{Sleep, TaskHandle, TaskState, PENDING_SLEEP};
use crate::{
  config::SchedulerConfig, error::SchedulerOverrunError, notification::Frame,
  subscription::Subscription,
};

// ==================== Internal State ====================

pub(crate) struct SchedulerState {
  now: Frame,
  queue: BinaryHeap<ScheduledTask>,
  next_seq: u64,
  next_id: u64,
  config: SchedulerConfig,
}

impl SchedulerState {
  fn new(config: SchedulerConfig) -> Self {
    Self { now: 0, queue: BinaryHeap::new(), next_seq: 0, next_id: 0, config }
  }

  fn push(&mut self, frame: Frame, task: Box<dyn FnMut() -> TaskState>, handle: TaskHandle) {
    let seq = self.next_seq;
    self.next_seq += 1;
    self.queue.push(ScheduledTask { frame, seq, task, handle });
  }

  /// Takes the queued entries of task `id` out of the queue. The caller
  /// drops them once the state is no longer borrowed.
  pub(crate) fn remove(&mut self, id: u64) -> Vec<Box<dyn FnMut() -> TaskState>> {
    let (removed, kept): (Vec<_>, Vec<_>) =
      std::mem::take(&mut self.queue).into_iter().partition(|t| t.handle.id() == id);
    self.queue = kept.into();
    removed.into_iter().map(|t| t.task).collect()
  }
}

struct ScheduledTask {
  frame: Frame,
  seq: u64,
  task: Box<dyn FnMut() -> TaskState>,
  handle: TaskHandle,
}

impl PartialEq for ScheduledTask {
  fn eq(&self, other: &Self) -> bool { self.frame == other.frame && self.seq == other.seq }
}

impl Eq for ScheduledTask {}

impl PartialOrd for ScheduledTask {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

impl Ord for ScheduledTask {
  fn cmp(&self, other: &Self) -> Ordering {
    // Min-heap: earlier frames first, then FIFO by insertion.
    other.frame.cmp(&self.frame).then_with(|| other.seq.cmp(&self.seq))
  }
}

// ==================== TestScheduler ====================

/// A deterministic, single-threaded virtual time scheduler.
#[derive(Clone)]
pub struct TestScheduler {
  state: Rc<RefCell<SchedulerState>>,
}

impl Default for TestScheduler {
  fn default() -> Self { Self::new() }
}

impl std::fmt::Debug for TestScheduler {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let state = self.state.borrow();
    f.debug_struct("TestScheduler")
      .field("now", &state.now)
      .field("pending", &state.queue.len())
      .field("config", &state.config)
      .finish()
  }
}

impl TestScheduler {
  /// A scheduler with the default (environment aware) configuration.
  pub fn new() -> Self { Self::with_config(SchedulerConfig::default()) }

  pub fn with_config(config: SchedulerConfig) -> Self {
    Self { state: Rc::new(RefCell::new(SchedulerState::new(config))) }
  }

  pub fn builder() -> SchedulerBuilder { SchedulerBuilder { config: SchedulerConfig::default() } }

  pub fn config(&self) -> SchedulerConfig { self.state.borrow().config }

  #[inline]
  pub fn frame_duration(&self) -> Duration { self.state.borrow().config.frame_duration }

  /// The current frame.
  #[inline]
  pub fn now(&self) -> Frame { self.state.borrow().now }

  /// Virtual time elapsed since frame 0.
  pub fn elapsed(&self) -> Duration {
    let state = self.state.borrow();
    state.config.duration_of(state.now)
  }

  pub fn pending_count(&self) -> usize { self.state.borrow().queue.len() }

  pub fn is_empty(&self) -> bool { self.state.borrow().queue.is_empty() }

  /// Rewinds the clock to frame 0 and cancels everything queued.
  pub fn reset(&self) {
    let dropped = {
      let mut state = self.state.borrow_mut();
      state.now = 0;
      state.next_seq = 0;
      std::mem::take(&mut state.queue)
    };
    for task in &dropped {
      task.handle.cancel();
    }
    debug!(cancelled = dropped.len(), "scheduler reset");
    // Task closures may own clones of this scheduler; drop them unborrowed.
    drop(dropped);
  }

  // ==================== Scheduling ====================

  /// Queues `task` to run at `frame`. Frames in the past mean "now".
  pub fn schedule_at(&self, frame: Frame, task: impl FnMut() -> TaskState + 'static) -> TaskHandle {
    let mut state = self.state.borrow_mut();
    let frame = frame.max(state.now);
    let id = state.next_id;
    state.next_id += 1;
    let handle = TaskHandle::new(id, Rc::downgrade(&self.state));
    state.push(frame, Box::new(task), handle.clone());
    trace!(id, frame, "task scheduled");
    handle
  }

  /// Queues `task` to run `frames` from now.
  pub fn schedule_in(&self, frames: Frame, task: impl FnMut() -> TaskState + 'static) -> TaskHandle {
    let at = self.now().saturating_add(frames.max(0));
    self.schedule_at(at, task)
  }

  /// Runs `task` once after `delay`, rounded up to whole frames.
  pub fn schedule(&self, task: impl FnOnce() + 'static, delay: Option<Duration>) -> TaskHandle {
    let frames = delay.map_or(0, |d| self.config().frames_ceil(d));
    let mut task = Some(task);
    self.schedule_in(frames, move || {
      if let Some(task) = task.take() {
        task();
      }
      TaskState::Finished
    })
  }

  /// Runs `task` every `period`, starting one period from now. The task
  /// receives the number of earlier invocations. Periods shorter than a frame
  /// are stretched to one frame.
  pub fn schedule_repeating(
    &self, period: Duration, mut task: impl FnMut(usize) + 'static,
  ) -> TaskHandle {
    let frames = self.config().frames_ceil(period).max(1);
    let mut invokes = 0;
    self.schedule_in(frames, move || {
      task(invokes);
      invokes += 1;
      TaskState::SleepFrames(frames)
    })
  }

  /// Drives `future` on the virtual clock, starting on the current frame.
  ///
  /// The future may await [`TestScheduler::sleep`]; any other pending
  /// future is polled again on the same frame, which eventually trips the
  /// stall limit if it never becomes ready.
  pub fn spawn(&self, future: impl Future<Output = ()> + 'static) -> TaskHandle {
    let mut future: LocalBoxFuture<'static, ()> = future.boxed_local();
    self.schedule_in(0, move || {
      PENDING_SLEEP.with(|cell| cell.set(None));
      let waker = futures::task::noop_waker();
      let mut cx = Context::from_waker(&waker);
      match future.as_mut().poll(&mut cx) {
        Poll::Ready(()) => TaskState::Finished,
        Poll::Pending => {
          PENDING_SLEEP.with(|cell| cell.take()).map_or(TaskState::Yield, TaskState::SleepFrames)
        }
      }
    })
  }

  /// A future that resolves after `duration`, rounded up to whole frames.
  pub fn sleep(&self, duration: Duration) -> Sleep { Sleep::new(self.config().frames_ceil(duration)) }

  pub fn sleep_frames(&self, frames: Frame) -> Sleep { Sleep::new(frames) }

  // ==================== Driving ====================

  /// Runs every queued task, including the ones queued along the way, moving
  /// the clock to each task's frame.
  pub fn flush(&self) -> Result<(), SchedulerOverrunError> { self.drain(None) }

  /// Runs everything due within the next `frames` frames and leaves the
  /// clock `frames` ahead.
  pub fn advance_by(&self, frames: Frame) -> Result<(), SchedulerOverrunError> {
    let target = self.now().saturating_add(frames.max(0));
    self.advance_to(target)
  }

  /// Runs everything due at or before `frame` and moves the clock there.
  /// The clock never moves backwards.
  pub fn advance_to(&self, frame: Frame) -> Result<(), SchedulerOverrunError> {
    self.drain(Some(frame))?;
    let mut state = self.state.borrow_mut();
    if frame > state.now {
      trace!(from = state.now, to = frame, "clock advanced");
      state.now = frame;
    }
    Ok(())
  }

  fn drain(&self, until: Option<Frame>) -> Result<(), SchedulerOverrunError> {
    let mut runs_on_frame = 0usize;
    loop {
      let mut scheduled = {
        let mut state = self.state.borrow_mut();
        let Some(frame) = state.queue.peek().map(|t| t.frame) else {
          break;
        };
        if until.is_some_and(|limit| frame > limit) {
          break;
        }
        if frame > state.config.max_frames {
          let err = SchedulerOverrunError::MaxFrames {
            limit: state.config.max_frames,
            next: frame,
            pending: state.queue.len(),
          };
          warn!(%err, "scheduler overrun");
          return Err(err);
        }
        let Some(scheduled) = state.queue.pop() else {
          break;
        };
        if scheduled.frame > state.now {
          trace!(from = state.now, to = scheduled.frame, "clock advanced");
          state.now = scheduled.frame;
          runs_on_frame = 0;
        }
        runs_on_frame += 1;
        if runs_on_frame > state.config.stall_limit {
          let err = SchedulerOverrunError::Stalled { frame: state.now, limit: state.config.stall_limit };
          state.queue.push(scheduled);
          warn!(%err, "scheduler overrun");
          return Err(err);
        }
        scheduled
      };

      if scheduled.handle.is_closed() {
        continue;
      }
      trace!(id = scheduled.handle.id(), frame = scheduled.frame, "running task");
      let result = (scheduled.task)();

      let mut state = self.state.borrow_mut();
      let now = state.now;
      let frame = match result {
        TaskState::Finished => {
          scheduled.handle.mark_finished();
          continue;
        }
        _ if scheduled.handle.is_closed() => continue,
        TaskState::Yield => now,
        TaskState::Sleeping(duration) => now.saturating_add(state.config.frames_ceil(duration)),
        TaskState::SleepFrames(frames) => now.saturating_add(frames.max(0)),
      };
      state.push(frame, scheduled.task, scheduled.handle);
    }
    Ok(())
  }
}

/// Configures a [`TestScheduler`] before creating it.
///
/// ```rust
/// use rxrust_marbles::prelude::*;
///
/// let scheduler = TestScheduler::builder()
///   .frame_duration(Duration::from_millis(1))
///   .max_frames(2_000)
///   .build();
/// assert_eq!(scheduler.config().max_frames, 2_000);
/// ```
#[derive(Clone, Debug)]
pub struct SchedulerBuilder {
  config: SchedulerConfig,
}

impl SchedulerBuilder {
  pub fn frame_duration(mut self, frame_duration: Duration) -> Self {
    if !frame_duration.is_zero() {
      self.config.frame_duration = frame_duration;
    }
    self
  }

  pub fn max_frames(mut self, max_frames: Frame) -> Self {
    self.config.max_frames = max_frames.max(0);
    self
  }

  pub fn stall_limit(mut self, stall_limit: usize) -> Self {
    self.config.stall_limit = stall_limit.max(1);
    self
  }

  pub fn build(self) -> TestScheduler { TestScheduler::with_config(self.config) }
}

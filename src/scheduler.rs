//! Virtual time scheduling.
//!
//! [`TestScheduler`] owns a clock measured in [`Frame`]s and a queue of tasks
//! ordered by `(frame, insertion order)`. Nothing runs until the scheduler is
//! driven with [`TestScheduler::flush`], [`TestScheduler::advance_by`] or
//! [`TestScheduler::run`].

use std::{
  cell::{Cell, RefCell},
  fmt,
  future::Future,
  pin::Pin,
  rc::{Rc, Weak},
  task::{Context, Poll},
  time::Duration,
};

use crate::{notification::Frame, subscription::Subscription};

mod test_scheduler;
pub(crate) use test_scheduler::SchedulerState;
pub use test_scheduler::{SchedulerBuilder, TestScheduler};

/// What a task asks for after one step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
  /// Done; the task is dropped.
  Finished,
  /// Run again on the current frame, after every task already queued for it.
  Yield,
  /// Run again once `Duration` has passed, rounded up to whole frames.
  Sleeping(Duration),
  /// Run again `n` frames from now.
  SleepFrames(Frame),
}

thread_local! {
  /// Set by [`Sleep`] while a spawned future is polled; read back by the
  /// task wrapping it.
  static PENDING_SLEEP: Cell<Option<Frame>> = const { Cell::new(None) };
}

/// Handle to a scheduled task.
///
/// Unsubscribing cancels the task: it is removed from the queue and never
/// runs again, even if it is in the middle of a step. A handle is closed once
/// the task finished or was cancelled.
#[derive(Clone)]
pub struct TaskHandle(Rc<HandleInner>);

struct HandleInner {
  id: u64,
  cancelled: Cell<bool>,
  finished: Cell<bool>,
  scheduler: Weak<RefCell<SchedulerState>>,
}

impl TaskHandle {
  pub(crate) fn new(id: u64, scheduler: Weak<RefCell<SchedulerState>>) -> Self {
    Self(Rc::new(HandleInner {
      id,
      cancelled: Cell::new(false),
      finished: Cell::new(false),
      scheduler,
    }))
  }

  /// A handle for work that completed synchronously.
  pub fn finished() -> Self {
    let handle = Self::new(u64::MAX, Weak::new());
    handle.0.finished.set(true);
    handle
  }

  #[inline]
  pub(crate) fn id(&self) -> u64 { self.0.id }

  pub(crate) fn mark_finished(&self) { self.0.finished.set(true); }

  pub fn is_finished(&self) -> bool { self.0.finished.get() }

  pub fn is_cancelled(&self) -> bool { self.0.cancelled.get() }

  /// Cancels the task without consuming the handle.
  pub fn cancel(&self) {
    if self.is_closed() {
      return;
    }
    self.0.cancelled.set(true);
    if let Some(state) = self.0.scheduler.upgrade() {
      // While the drain loop holds the queue the task is skipped instead.
      let removed = match state.try_borrow_mut() {
        Ok(mut state) => state.remove(self.0.id),
        Err(_) => Vec::new(),
      };
      // Captures may touch the scheduler when dropped.
      drop(removed);
    }
  }
}

impl Subscription for TaskHandle {
  fn unsubscribe(self) { self.cancel() }

  fn is_closed(&self) -> bool { self.0.cancelled.get() || self.0.finished.get() }
}

impl fmt::Debug for TaskHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("TaskHandle")
      .field("id", &self.0.id)
      .field("cancelled", &self.0.cancelled.get())
      .field("finished", &self.0.finished.get())
      .finish()
  }
}

/// Suspends a future spawned on a [`TestScheduler`] until a later frame.
///
/// Created by [`TestScheduler::sleep`] and [`TestScheduler::sleep_frames`].
/// Polling it outside a spawned task makes no progress.
#[derive(Debug)]
#[must_use = "futures do nothing unless awaited"]
pub struct Sleep {
  frames: Frame,
  armed: bool,
}

impl Sleep {
  pub(crate) fn new(frames: Frame) -> Self { Self { frames, armed: false } }
}

impl Future for Sleep {
  type Output = ();

  fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
    if self.armed || self.frames <= 0 {
      return Poll::Ready(());
    }
    self.armed = true;
    let frames = self.frames;
    PENDING_SLEEP.with(|cell| cell.set(Some(frames)));
    Poll::Pending
  }
}

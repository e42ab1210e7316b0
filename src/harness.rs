//! `run`: one virtual time test cycle.
//!
//! The body registers sources and expectations through [`RunHelpers`]. Once
//! it returns, the scheduler is drained and every expectation is checked.
//! Nothing is asserted inside the body; the outcome of each expectation is
//! collected into a [`RunReport`] for the caller to inspect or assert.
//!
//! Expected diagrams are read on the run's clock: frame 0 is the frame the
//! body ran on, whatever window the expectation subscribes in.
//!
//! ```rust
//! use rxrust_marbles::prelude::*;
//!
//! let report = TestScheduler::new()
//!   .run(|h| {
//!     let source = h.hot::<char>("-a-^b---c-|")?;
//!     h.expect_observable(source.clone()).to_be("-b---c-|")?;
//!     h.expect_subscriptions(source.subscriptions()).to_be(["^------!"])?;
//!     Ok(())
//!   })
//!   .unwrap();
//! report.assert();
//! ```

use std::{
  cell::{Cell, RefCell},
  fmt::Debug,
  marker::PhantomData,
  rc::Rc,
};

use tracing::{debug, info_span};

use crate::{
  compare::{compare_subscriptions, compare_timelines, ErrorMatch},
  error::{AssertionError, MarbleError, ParseError},
  notification::{Frame, SubscriptionLog, Timeline},
  observable::{ColdObservable, HotObservable, Observable},
  parser::{parse_subscription_marbles, Marbles, ParsedMarbles, TokenValue, Values},
  recorder::{RecordedTimeline, Recorder, SubscriptionLogs},
  scheduler::{TaskState, TestScheduler},
  subscription::{BoxedSubscription, Subscription},
};

impl TestScheduler {
  /// Resets the clock, lets `body` set up sources and expectations, drains
  /// the queue and checks every expectation.
  ///
  /// Parse errors and scheduler overruns abort the run with `Err`;
  /// mismatching expectations do not, they are reported in the
  /// [`RunReport`]. Panics inside scheduled work propagate.
  pub fn run<F>(&self, body: F) -> Result<RunReport, MarbleError>
  where
    F: FnOnce(&RunHelpers) -> Result<(), MarbleError>,
  {
    let span = info_span!("marble_run");
    let _guard = span.enter();

    self.reset();
    let helpers = RunHelpers {
      scheduler: self.clone(),
      expectations: RefCell::new(Vec::new()),
      observable_count: Cell::new(0),
      subscription_count: Cell::new(0),
    };
    body(&helpers)?;
    self.flush()?;

    let end_frame = self.now();
    let outcomes: Vec<Outcome> =
      helpers.expectations.into_inner().iter().map(|e| e.evaluate()).collect();
    let failed = outcomes.iter().filter(|o| !o.passed()).count();
    debug!(end_frame, expectations = outcomes.len(), failed, "marble run finished");
    Ok(RunReport { outcomes, end_frame })
  }
}

// ==================== Helpers ====================

/// Handed to the body of [`TestScheduler::run`].
pub struct RunHelpers {
  scheduler: TestScheduler,
  expectations: RefCell<Vec<Box<dyn Expectation>>>,
  observable_count: Cell<usize>,
  subscription_count: Cell<usize>,
}

impl RunHelpers {
  pub fn scheduler(&self) -> &TestScheduler { &self.scheduler }

  /// A cold source with the diagram's characters as values.
  pub fn cold<V>(&self, diagram: &str) -> Result<ColdObservable<V>, ParseError>
  where
    V: TokenValue + Clone + 'static,
  {
    self.cold_marbles(Marbles::new(diagram))
  }

  pub fn cold_with<V>(&self, diagram: &str, values: &Values<V>) -> Result<ColdObservable<V>, ParseError>
  where
    V: TokenValue + Clone + 'static,
  {
    self.cold_marbles(Marbles::new(diagram).values(values))
  }

  /// A cold source with a custom error payload type. Cold diagrams cannot
  /// contain `^` or `!`.
  pub fn cold_marbles<V, E>(&self, marbles: Marbles<'_, V, E>) -> Result<ColdObservable<V, E>, ParseError>
  where
    V: TokenValue + Clone + 'static,
    E: Default + Clone + 'static,
  {
    let diagram = marbles.diagram();
    reject_markers(diagram, &['^', '!'], "cold")?;
    let parsed = marbles.parse(self.scheduler.frame_duration())?;
    Ok(ColdObservable::new(parsed.timeline, self.scheduler.clone()))
  }

  /// A hot source whose `^` lines up with the current frame.
  pub fn hot<V>(&self, diagram: &str) -> Result<HotObservable<V>, ParseError>
  where
    V: TokenValue + Clone + 'static,
  {
    self.hot_marbles(Marbles::new(diagram))
  }

  pub fn hot_with<V>(&self, diagram: &str, values: &Values<V>) -> Result<HotObservable<V>, ParseError>
  where
    V: TokenValue + Clone + 'static,
  {
    self.hot_marbles(Marbles::new(diagram).values(values))
  }

  /// A hot source with a custom error payload type. Hot diagrams cannot
  /// contain `!`.
  pub fn hot_marbles<V, E>(&self, marbles: Marbles<'_, V, E>) -> Result<HotObservable<V, E>, ParseError>
  where
    V: TokenValue + Clone + 'static,
    E: Default + Clone + 'static,
  {
    reject_markers(marbles.diagram(), &['!'], "hot")?;
    let parsed = marbles.parse(self.scheduler.frame_duration())?;
    Ok(HotObservable::new(parsed.timeline, self.scheduler.clone()))
  }

  /// Starts an expectation on what `source` emits. It is subscribed when a
  /// `to_*` method is called (or at the start of the
  /// [`within`](ExpectObservable::within) window).
  pub fn expect_observable<V, E, S>(&self, source: S) -> ExpectObservable<'_, V, E, S>
  where
    S: Observable<V, E> + 'static,
  {
    ExpectObservable {
      helpers: self,
      source,
      window: None,
      errors: ErrorMatch::default(),
      _marker: PhantomData,
    }
  }

  /// [`expect_observable`](Self::expect_observable) subscribing at the `^`
  /// and unsubscribing at the `!` of `window`.
  pub fn expect_observable_within<V, E, S>(
    &self, source: S, window: &str,
  ) -> Result<ExpectObservable<'_, V, E, S>, ParseError>
  where
    S: Observable<V, E> + 'static,
  {
    self.expect_observable(source).within(window)
  }

  /// Starts an expectation on the subscription windows of a marble source.
  pub fn expect_subscriptions(&self, logs: SubscriptionLogs) -> ExpectSubscriptions<'_> {
    ExpectSubscriptions { helpers: self, logs }
  }

  fn next_label(&self, counter: &Cell<usize>, kind: &str) -> String {
    let n = counter.get() + 1;
    counter.set(n);
    format!("{kind} #{n}")
  }

  fn register(&self, expectation: impl Expectation + 'static) {
    self.expectations.borrow_mut().push(Box::new(expectation));
  }

  /// Subscribes `recorder` to `source` for `window`, now if the window has
  /// already started, otherwise once it does.
  fn observe<V, E, S>(&self, source: S, recorder: Recorder<V, E>, window: Option<SubscriptionLog>)
  where
    V: 'static,
    E: 'static,
    S: Observable<V, E> + 'static,
  {
    let scheduler = &self.scheduler;
    let window = window.unwrap_or(SubscriptionLog::new(scheduler.now()));
    let slot: Rc<RefCell<Option<BoxedSubscription>>> = Rc::default();

    if window.subscribed <= scheduler.now() {
      *slot.borrow_mut() = Some(BoxedSubscription::new(source.actual_subscribe(recorder)));
    } else {
      let c_slot = slot.clone();
      let mut pending = Some((source, recorder));
      scheduler.schedule_at(window.subscribed, move || {
        if let Some((source, recorder)) = pending.take() {
          let subscription = BoxedSubscription::new(source.actual_subscribe(recorder));
          *c_slot.borrow_mut() = Some(subscription);
        }
        TaskState::Finished
      });
    }

    if let Some(end) = window.unsubscribed {
      scheduler.schedule_at(end, move || {
        let subscription = slot.borrow_mut().take();
        if let Some(subscription) = subscription {
          subscription.unsubscribe();
        }
        TaskState::Finished
      });
    }
  }
}

fn reject_markers(diagram: &str, markers: &[char], context: &'static str) -> Result<(), ParseError> {
  match diagram.char_indices().find(|(_, c)| markers.contains(c)) {
    Some((position, marker)) => Err(ParseError::UnexpectedMarker { marker, position, context }),
    None => Ok(()),
  }
}

// ==================== Observable expectations ====================

/// Built by [`RunHelpers::expect_observable`].
pub struct ExpectObservable<'h, V, E, S> {
  helpers: &'h RunHelpers,
  source: S,
  window: Option<SubscriptionLog>,
  errors: ErrorMatch<E>,
  _marker: PhantomData<fn() -> V>,
}

impl<V, E, S> ExpectObservable<'_, V, E, S> {
  /// Subscribes at the `^` of `window` and unsubscribes at its `!`. The
  /// expected diagram keeps counting from frame 0, not from the `^`.
  pub fn within(mut self, window: &str) -> Result<Self, ParseError> {
    self.window = Some(parse_subscription_marbles(window, self.helpers.scheduler.frame_duration())?);
    Ok(self)
  }

  /// Compares error payloads with `predicate` instead of by kind alone.
  pub fn compare_errors_with(mut self, predicate: impl Fn(&E, &E) -> bool + 'static) -> Self {
    self.errors = ErrorMatch::with(predicate);
    self
  }

  /// Compares error payloads with `PartialEq`.
  pub fn strict_errors(mut self) -> Self
  where
    E: PartialEq + 'static,
  {
    self.errors = ErrorMatch::strict();
    self
  }
}

impl<V, E, S> ExpectObservable<'_, V, E, S>
where
  V: PartialEq + TokenValue + Clone + Debug + 'static,
  E: Debug + Clone + 'static,
  S: Observable<V, E> + 'static,
{
  /// Expects the emissions drawn in `diagram`, using the characters as
  /// values and `E::default()` for `#`.
  pub fn to_be(self, diagram: &str) -> Result<RecordedTimeline<V, E>, ParseError>
  where
    E: Default,
  {
    self.to_be_marbles(Marbles::new(diagram))
  }

  pub fn to_be_with(self, diagram: &str, values: &Values<V>) -> Result<RecordedTimeline<V, E>, ParseError>
  where
    E: Default,
  {
    self.to_be_marbles(Marbles::new(diagram).values(values))
  }

  /// Expects a diagram with its own values and error payload. Expected
  /// diagrams cannot contain `^` or `!`.
  pub fn to_be_marbles(self, marbles: Marbles<'_, V, E>) -> Result<RecordedTimeline<V, E>, ParseError>
  where
    E: Default,
  {
    reject_markers(marbles.diagram(), &['^', '!'], "expected")?;
    let values = marbles.value_map().cloned();
    let ParsedMarbles { timeline, .. } = marbles.parse(self.helpers.scheduler.frame_duration())?;
    Ok(self.register(Expected::Parsed(timeline), values))
  }

  /// Expects the same emissions as `other`, subscribed over the same window.
  pub fn to_equal<O>(self, other: O) -> RecordedTimeline<V, E>
  where
    O: Observable<V, E> + 'static,
  {
    let recorder = Recorder::new(self.helpers.scheduler.clone());
    let expected = recorder.timeline();
    self.helpers.observe(other, recorder, self.window);
    self.register(Expected::Recorded(expected), None)
  }

  fn register(self, expected: Expected<V, E>, values: Option<Values<V>>) -> RecordedTimeline<V, E> {
    let Self { helpers, source, window, errors, .. } = self;
    let label = helpers.next_label(&helpers.observable_count, "expect_observable");
    let recorder = Recorder::new(helpers.scheduler.clone());
    let actual = recorder.timeline();
    debug!(%label, ?window, "expectation registered");
    helpers.observe(source, recorder, window);
    helpers.register(ObservableExpectation { label, expected, actual: actual.clone(), errors, values });
    actual
  }
}

enum Expected<V, E> {
  Parsed(Timeline<V, E>),
  Recorded(RecordedTimeline<V, E>),
}

struct ObservableExpectation<V, E> {
  label: String,
  expected: Expected<V, E>,
  actual: RecordedTimeline<V, E>,
  errors: ErrorMatch<E>,
  values: Option<Values<V>>,
}

impl<V, E> Expectation for ObservableExpectation<V, E>
where
  V: PartialEq + TokenValue + Clone + Debug,
  E: Debug + Clone,
{
  fn evaluate(&self) -> Outcome {
    let expected = match &self.expected {
      Expected::Parsed(timeline) => timeline.clone(),
      Expected::Recorded(recorded) => recorded.snapshot(),
    };
    let actual = self.actual.snapshot();
    let values = self.values.as_ref();
    let result = compare_timelines(&self.label, &expected, &actual, &self.errors, values);
    debug!(label = %self.label, passed = result.is_ok(), "expectation checked");
    Outcome { label: self.label.clone(), result }
  }
}

// ==================== Subscription expectations ====================

/// Built by [`RunHelpers::expect_subscriptions`].
pub struct ExpectSubscriptions<'h> {
  helpers: &'h RunHelpers,
  logs: SubscriptionLogs,
}

impl ExpectSubscriptions<'_> {
  /// Expects one window per diagram, in subscription order. Diagrams use
  /// `-`, `^`, `!`, groups and time progressions, counted from frame 0.
  pub fn to_be<I, D>(self, diagrams: I) -> Result<(), ParseError>
  where
    I: IntoIterator<Item = D>,
    D: AsRef<str>,
  {
    let frame_duration = self.helpers.scheduler.frame_duration();
    let expected = diagrams
      .into_iter()
      .map(|d| parse_subscription_marbles(d.as_ref(), frame_duration))
      .collect::<Result<Vec<_>, _>>()?;
    let label = self.helpers.next_label(&self.helpers.subscription_count, "expect_subscriptions");
    debug!(%label, windows = expected.len(), "expectation registered");
    self.helpers.register(SubscriptionExpectation { label, expected, logs: self.logs });
    Ok(())
  }
}

struct SubscriptionExpectation {
  label: String,
  expected: Vec<SubscriptionLog>,
  logs: SubscriptionLogs,
}

impl Expectation for SubscriptionExpectation {
  fn evaluate(&self) -> Outcome {
    let actual = self.logs.snapshot();
    let result = compare_subscriptions(&self.label, &self.expected, &actual);
    debug!(label = %self.label, passed = result.is_ok(), "expectation checked");
    Outcome { label: self.label.clone(), result }
  }
}

// ==================== Report ====================

/// Checked at the end of a run.
trait Expectation {
  fn evaluate(&self) -> Outcome;
}

/// The result of one expectation. Diagrams are only rendered for failures,
/// into the [`AssertionError`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outcome {
  pub label: String,
  pub result: Result<(), AssertionError>,
}

impl Outcome {
  #[inline]
  pub fn passed(&self) -> bool { self.result.is_ok() }

  pub fn failure(&self) -> Option<&AssertionError> { self.result.as_ref().err() }
}

/// Every expectation of a run, in registration order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunReport {
  outcomes: Vec<Outcome>,
  end_frame: Frame,
}

impl RunReport {
  pub fn outcomes(&self) -> &[Outcome] { &self.outcomes }

  pub fn is_success(&self) -> bool { self.outcomes.iter().all(Outcome::passed) }

  /// The frame the clock stopped on once the queue drained.
  pub fn end_frame(&self) -> Frame { self.end_frame }

  /// The first failed expectation, if any.
  pub fn verify(&self) -> Result<(), AssertionError> {
    self.outcomes.iter().try_for_each(|o| o.result.clone())
  }

  /// Panics with the rendered diff of the first failed expectation.
  #[track_caller]
  pub fn assert(&self) {
    if let Err(err) = self.verify() {
      panic!("{err}");
    }
  }
}

impl From<RunReport> for Result<(), MarbleError> {
  fn from(report: RunReport) -> Self { report.verify().map_err(MarbleError::from) }
}

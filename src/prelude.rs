//! Prelude module for convenient imports
//!
//! This module re-exports commonly used types and traits for easy access.

pub use std::time::Duration;

// Comparison
pub use crate::compare::{compare_subscriptions, compare_timelines, ErrorMatch};
// Configuration
pub use crate::config::SchedulerConfig;
// Errors
pub use crate::error::{
  AssertionError, MarbleError, ParseError, SchedulerOverrunError, TestError, TimelineError,
};
// Harness
pub use crate::harness::{ExpectObservable, ExpectSubscriptions, Outcome, RunHelpers, RunReport};
// Timelines
pub use crate::notification::{Frame, Notification, NotificationKind, SubscriptionLog, Timeline};
// Sources and the reactive seam
pub use crate::observable::{
  create, ColdObservable, ColdSubscription, Create, HotObservable, HotSubscription, Observable,
};
pub use crate::observer::{BoxedObserver, Emitter, FnMutObserver, Observer, SharedObserver};
// Diagrams
pub use crate::parser::{
  parse_marbles, parse_subscription_marbles, Marbles, ParsedMarbles, TokenValue, Values,
};
pub use crate::recorder::{RecordedTimeline, Recorder, SubscriptionLogs};
pub use crate::render::{describe_timeline, render_subscription, render_timeline, render_with_values};
// Scheduler
pub use crate::scheduler::{SchedulerBuilder, Sleep, TaskHandle, TaskState, TestScheduler};
pub use crate::subscription::{BoxedSubscription, ClosureSubscription, Subscription};

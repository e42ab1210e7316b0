//! # rxrust-marbles: marble diagram testing for Rust streams
//!
//! Describe a stream as an ASCII diagram, play it on a virtual clock and
//! compare what comes out against another diagram.
//!
//! ## Quick Start
//!
//! ```rust
//! use rxrust_marbles::prelude::*;
//!
//! let report = TestScheduler::new()
//!   .run(|h| {
//!     let values = Values::from([('a', 1), ('b', 2), ('c', 3)]);
//!     let source = h.cold_with("-a-b-c-|", &values)?;
//!     h.expect_observable(source.clone()).to_be_with("-a-b-c-|", &values)?;
//!     h.expect_subscriptions(source.subscriptions()).to_be(["^------!"])?;
//!     Ok(())
//!   })
//!   .unwrap();
//! report.assert();
//! ```
//!
//! ## Key Concepts
//!
//! | Type | Description |
//! |------|-------------|
//! | [`TestScheduler`] | Virtual clock counting frames, drives everything |
//! | [`ColdObservable`] / [`HotObservable`] | Sources played from a diagram |
//! | [`RunHelpers`] | Creates sources and registers expectations inside `run` |
//! | [`Observable`] | The seam code under test plugs into |
//!
//! ## Configuration
//!
//! A frame lasts 10ms and a run may not go past frame 750 unless changed
//! with [`TestScheduler::builder`] or, process wide, the
//! `RXRUST_MARBLES_FRAME_MS`, `RXRUST_MARBLES_MAX_FRAMES` and
//! `RXRUST_MARBLES_STALL_LIMIT` environment variables.
//!
//! [`TestScheduler`]: scheduler::TestScheduler
//! [`ColdObservable`]: observable::ColdObservable
//! [`HotObservable`]: observable::HotObservable
//! [`RunHelpers`]: harness::RunHelpers
//! [`Observable`]: observable::Observable
//! [`TestScheduler::builder`]: scheduler::TestScheduler::builder

pub mod compare;
pub mod config;
pub mod error;
pub mod harness;
pub mod notification;
pub mod observable;
pub mod observer;
pub mod parser;
pub mod prelude;
pub mod recorder;
pub mod render;
pub mod scheduler;
pub mod subscription;

pub use prelude::*;

// README examples run as doctests.
#[cfg(all(doctest, not(target_arch = "wasm32")))]
mod __markdown_doctests {
  mod readme {
    #![doc = include_str!("../README.md")]
  }
}

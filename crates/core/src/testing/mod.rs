//! Testing utilities for running the pipelines without real tools.
//!
//! [`ScriptedRunner`] stands in for the external programs: each launched
//! command follows a [`Script`] that prints lines, creates files via the
//! [`fixtures`] helpers, and exits with a chosen code.
//!
//! # Example
//!
//! ```rust,ignore
//! use upscaler_core::testing::{fixtures, Script, ScriptedRunner};
//!
//! let runner = ScriptedRunner::new();
//! runner
//!     .on_program("enhancer", Script::success().with_files(fixtures::write_flag_output("-o")))
//!     .await;
//! ```

pub mod fixtures;
mod scripted_runner;

pub use scripted_runner::{FileAction, RecordedCommand, Script, ScriptedRunner, StepAction};

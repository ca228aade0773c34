//! Command Line Interface (CLI) layer for s2monitor.
//!
//! This module defines argument parsing (`args`), error types (`errors`),
//! and the orchestration logic (`runner`) for the `region`, `scenes`,
//! `series`, `export` and `preview` commands. It wires user-provided options
//! to the library functionality exposed via `s2monitor::api`.
//!
//! If you are embedding s2monitor into another application, prefer using
//! the high-level `s2monitor::api` module instead of calling the CLI code.
pub mod args;
pub mod errors;
pub mod runner;

pub use args::CliArgs;
pub use runner::run;

// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Tandem runtime: batch coordination on a cooperative executor.
//!
//! Two entry points run a keyed batch of operations side by side:
//! - `stream` : yields `(key, outcome)` pairs in completion order
//! - `concurrently` : waits for the whole batch, returns outcomes in key order
//!
//! Components:
//! - outcome      : `Outcome` / `Failure`, captured operation results
//! - continuation : single-slot suspend/resume rendezvous
//! - operation    : operation trait, registry collection, guarded invocation
//! - stream       : completion-ordered multiplexer
//! - concurrently : key-ordered barrier collector
//! - exec         : single-threaded executor, timers, virtual clock
//! - config/error : executor configuration and error types

pub mod concurrently;
pub mod config;
pub mod continuation;
pub mod error;
pub mod exec;
pub mod operation;
pub mod outcome;
pub mod stream;

pub use concurrently::{concurrently, Concurrently, Results};
pub use config::{ClockMode, ExecutorConfig};
pub use continuation::{Continuation, Deliver, Suspend};
pub use error::{ConfigError, InvariantViolation, JoinError, ResumeError, RuntimeError};
pub use exec::{yield_now, CallbackId, Executor, ExecutorStats, Handle, JoinHandle, Schedule, Sleep};
pub use operation::{boxed, from_fn, BoxOperation, Operation};
pub use outcome::{Failure, Outcome, PanicPayload};
pub use stream::{stream, Completions};

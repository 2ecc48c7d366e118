// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! CLI command implementations.

pub mod barrier;
pub mod big_pipe;
pub mod bootstrap;
pub mod failure;
pub mod repeated_defer;
pub mod suspension_order;

use std::fmt::Display;
use std::future::Future;
use std::process;
use std::time::Duration;

use tandem_rt::{boxed, BoxOperation, Continuation, Executor, Handle};
use tracing::warn;

use crate::output;

/// Width of the `[main]` / `[async]` / `[interrupt]` column.
pub const TAG_WIDTH: usize = 11;

/// Placeholder delays used when `--timings` is not given.
const DEFAULT_TIMINGS: [(u32, f64); 4] = [(1, 0.3), (2, 0.1), (3, 0.6), (4, 0.2)];

/// Print an error and exit with status 1.
pub fn fail(msg: impl Display) -> ! {
    eprintln!("{}: {}", output::error_label(), msg);
    process::exit(1);
}

/// Run `future` to completion on `exec`, exiting on executor errors.
pub fn drive<F: Future>(exec: &Executor, future: F) -> F::Output {
    exec.block_on(future).unwrap_or_else(|e| fail(e))
}

/// Drain every remaining task and timer.
pub fn finish(exec: &Executor) {
    if let Err(e) = exec.run() {
        fail(e);
    }
}

/// Whether `name` was passed. Any other argument not in `known` is rejected.
pub fn flag(args: &[String], name: &str) -> bool {
    reject_unknown(args, &[name]);
    args.iter().any(|a| a == name)
}

/// Exit if `args` holds anything outside `known`.
pub fn reject_unknown(args: &[String], known: &[&str]) {
    if let Some(arg) = args.iter().find(|a| !known.contains(&a.as_str())) {
        fail(format!("unexpected argument `{}`", arg));
    }
}

/// Read `--timings id=secs,...` (or `--timings=...`), falling back to the
/// default set.
pub fn timings(args: &[String]) -> Vec<(u32, f64)> {
    let mut spec = None;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--timings" {
            match iter.next() {
                Some(value) => spec = Some(value.as_str()),
                None => fail("`--timings` needs a value like `1=0.3,2=0.1`"),
            }
        } else if let Some(value) = arg.strip_prefix("--timings=") {
            spec = Some(value);
        } else {
            fail(format!("unexpected argument `{}`", arg));
        }
    }
    match spec {
        Some(spec) => parse_timings(spec).unwrap_or_else(|e| fail(e)),
        None => DEFAULT_TIMINGS.to_vec(),
    }
}

fn parse_timings(spec: &str) -> Result<Vec<(u32, f64)>, String> {
    spec.split(',')
        .filter(|part| !part.trim().is_empty())
        .map(|part| {
            let (id, secs) = part
                .split_once('=')
                .ok_or_else(|| format!("timing `{}` is not `id=secs`", part))?;
            let id = id
                .trim()
                .parse::<u32>()
                .map_err(|_| format!("placeholder id `{}` is not a number", id.trim()))?;
            let secs = secs
                .trim()
                .parse::<f64>()
                .map_err(|_| format!("delay `{}` is not a number", secs.trim()))?;
            if !secs.is_finite() || secs < 0.0 {
                return Err(format!("delay for placeholder {} must be a non-negative number", id));
            }
            Duration::try_from_secs_f64(secs)
                .map_err(|_| format!("delay for placeholder {} is too large", id))?;
            Ok((id, secs))
        })
        .collect()
}

/// Operation that resolves placeholder `id` from a timer after `secs`.
///
/// The timer callback resumes the operation's own continuation and keeps
/// running after the resume, so both of its lines print before the
/// operation itself continues.
pub fn placeholder(handle: &Handle, id: u32, secs: f64) -> BoxOperation<String, String> {
    let handle = handle.clone();
    boxed(move || async move {
        let resolved = Continuation::new();
        let resume = resolved.clone();
        handle.delay(Duration::from_secs_f64(secs), move || {
            println!("{} Placeholder {} executed.", output::tag("[async]", TAG_WIDTH), id);
            if let Err(e) = resume.resume(format!("Placeholder {} value.", id)) {
                warn!(placeholder = id, "{}", e);
            }
            println!("{} Placeholder {} completed.", output::tag("[async]", TAG_WIDTH), id);
        });
        Ok(resolved.suspend().await)
    })
}

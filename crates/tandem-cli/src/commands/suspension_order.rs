// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! `tandem suspension-order`: every wait gets its own continuation.

use std::time::Duration;

use tandem_rt::{Continuation, ExecutorConfig, Executor};
use tracing::warn;

pub fn cmd_suspension_order(config: ExecutorConfig, args: &[String]) {
    super::reject_unknown(args, &[]);
    let exec = Executor::with_config(config);
    let handle = exec.handle();

    let first = Continuation::new();
    let second = Continuation::new();
    resume_after(&handle, &first, Duration::from_millis(500), "Suspension 1 after 0.5s");
    resume_after(&handle, &second, Duration::from_millis(100), "Suspension 2 after 0.1s");

    super::drive(&exec, async {
        println!("Suspending on suspension 1");
        println!("Got {}", first.suspend().await);
        println!("Suspending on suspension 2");
        println!("Got {}", second.suspend().await);
    });

    super::finish(&exec);
}

fn resume_after(
    handle: &tandem_rt::Handle,
    continuation: &Continuation<&'static str>,
    after: Duration,
    value: &'static str,
) {
    let continuation = continuation.clone();
    handle.delay(after, move || {
        if let Err(e) = continuation.resume(value) {
            warn!("{}", e);
        }
    });
}

// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! `tandem big-pipe`: stream placeholders in completion order.

use std::time::Duration;

use futures::StreamExt;
use tandem_rt::{stream, ExecutorConfig, Executor, Outcome};

use super::TAG_WIDTH;
use crate::output;

pub fn cmd_big_pipe(config: ExecutorConfig, args: &[String]) {
    let timings = super::timings(args);
    let exec = Executor::with_config(config);
    let handle = exec.handle();

    super::drive(&exec, async {
        let mut operations = Vec::with_capacity(timings.len());
        for &(id, secs) in &timings {
            println!(
                "{} Scheduling placeholder {} after {} seconds.",
                output::tag("[main]", TAG_WIDTH),
                id,
                secs
            );
            operations.push((id, super::placeholder(&handle, id, secs)));
        }

        // Unrelated work keeps getting turns while the batch is in flight.
        handle.delay(Duration::from_secs_f64(0.2), || {
            println!(
                "{} Other work during concurrent batch of tasks",
                output::tag("[interrupt]", TAG_WIDTH)
            );
        });

        let mut completions = stream(&handle, operations);
        while let Some((id, result)) = completions.next().await {
            match result {
                Outcome::Ok(value) => println!(
                    "{} For {} got {} {}",
                    output::tag("[main]", TAG_WIDTH),
                    id,
                    output::success("success"),
                    value
                ),
                Outcome::Err(failure) => println!(
                    "{} For {} got {} {}",
                    output::tag("[main]", TAG_WIDTH),
                    id,
                    output::failure("exception"),
                    failure
                ),
            }
        }
    });

    super::finish(&exec);
}

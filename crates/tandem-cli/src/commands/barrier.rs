// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! `tandem barrier`: collect placeholders, print them in key order.

use std::time::Duration;

use tandem_rt::{concurrently, ExecutorConfig, Executor, Outcome};

use super::TAG_WIDTH;
use crate::output;

pub fn cmd_barrier(config: ExecutorConfig, args: &[String]) {
    let timings = super::timings(args);
    let exec = Executor::with_config(config);
    let handle = exec.handle();

    let results = super::drive(&exec, async {
        let operations: Vec<_> = timings
            .iter()
            .map(|&(id, secs)| {
                println!(
                    "{} Scheduling placeholder {} after {} seconds.",
                    output::tag("[main]", TAG_WIDTH),
                    id,
                    secs
                );
                (id, super::placeholder(&handle, id, secs))
            })
            .collect();

        handle.delay(Duration::from_secs_f64(0.2), || {
            println!(
                "{} Other work while waiting for the batch",
                output::tag("[interrupt]", TAG_WIDTH)
            );
        });

        concurrently(&handle, operations).await
    });

    println!(
        "{} All {} placeholders resolved after {:.1}s.",
        output::tag("[main]", TAG_WIDTH),
        results.len(),
        handle.elapsed().as_secs_f64()
    );
    for (id, result) in &results {
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

    super::finish(&exec);
}

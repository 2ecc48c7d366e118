// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! `tandem failure`: a failing operation arrives as an ordinary item.

use futures::StreamExt;
use tandem_rt::{boxed, from_fn, stream, BoxOperation, ExecutorConfig, Executor, Failure, Outcome};

use crate::output;

pub fn cmd_failure(config: ExecutorConfig, args: &[String]) {
    super::reject_unknown(args, &[]);
    let exec = Executor::with_config(config);
    let handle = exec.handle();

    let failed: Option<Failure<String>> = super::drive(&exec, async {
        let operations: Vec<(usize, BoxOperation<String, String>)> = vec![
            (0, boxed(from_fn(|| Ok("Success".to_string())))),
            (1, boxed(from_fn(|| Err("Something went wrong!".to_string())))),
        ];

        let mut completions = stream(&handle, operations);
        while let Some((_, result)) = completions.next().await {
            match result {
                Outcome::Ok(value) => println!(
                    "{} Executed operation successfully. Output: '{}'",
                    output::tag("[main]", 0),
                    value
                ),
                // Stop at the first failure; the rest of the batch is dropped.
                Outcome::Err(failure) => return Some(failure),
            }
        }
        None
    });

    if let Some(failure) = failed {
        super::fail(failure);
    }
    super::finish(&exec);
}

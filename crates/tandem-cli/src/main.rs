// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Tandem CLI - demos of `stream` and `concurrently` on the tandem executor.

mod commands;
mod help;
mod output;

use std::env;
use std::process;

use tandem_rt::{ClockMode, ExecutorConfig};
use tracing_subscriber::EnvFilter;

/// Log filter variable, e.g. `TANDEM_LOG=tandem_rt=trace`.
const LOG_ENV: &str = "TANDEM_LOG";

/// Options accepted anywhere on the command line.
#[derive(Debug, Default)]
struct GlobalFlags {
    virtual_time: bool,
    verbose: bool,
}

/// Remove global flags from `args`, leaving the command and its arguments.
fn take_global_flags(args: &mut Vec<String>) -> GlobalFlags {
    let mut flags = GlobalFlags::default();
    args.retain(|arg| match arg.as_str() {
        "--virtual-time" => {
            flags.virtual_time = true;
            false
        }
        "-v" | "--verbose" => {
            flags.verbose = true;
            false
        }
        _ => true,
    });
    flags
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn executor_config(flags: &GlobalFlags) -> ExecutorConfig {
    let config = match ExecutorConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {}", output::error_label(), e);
            eprintln!(
                "{}: {}",
                output::hint_label(),
                output::hint_text("set TANDEM_CLOCK to `real` or `virtual`, or unset it")
            );
            process::exit(1);
        }
    };
    if flags.virtual_time {
        config.with_clock(ClockMode::Virtual)
    } else {
        config
    }
}

fn main() {
    output::init();

    let mut args: Vec<String> = env::args().skip(1).collect();
    let flags = take_global_flags(&mut args);
    init_logging(flags.verbose);

    if args.is_empty() {
        help::print_usage();
        return;
    }

    let cmd = args.remove(0);
    if args.iter().any(|a| a == "--help" || a == "-h") {
        help::print_command_help(&cmd);
        return;
    }

    match cmd.as_str() {
        "big-pipe" => commands::big_pipe::cmd_big_pipe(executor_config(&flags), &args),
        "barrier" => commands::barrier::cmd_barrier(executor_config(&flags), &args),
        "failure" => commands::failure::cmd_failure(executor_config(&flags), &args),
        "suspension-order" => {
            commands::suspension_order::cmd_suspension_order(executor_config(&flags), &args)
        }
        "repeated-defer" => {
            commands::repeated_defer::cmd_repeated_defer(executor_config(&flags), &args)
        }
        "bootstrap" => commands::bootstrap::cmd_bootstrap(executor_config(&flags), &args),
        "help" | "--help" | "-h" => match args.first() {
            Some(topic) => help::print_command_help(topic),
            None => help::print_usage(),
        },
        "version" | "--version" | "-V" => {
            println!("tandem {}", env!("CARGO_PKG_VERSION"));
        }
        other => {
            eprintln!("{}: unknown command `{}`", output::error_label(), other);
            eprintln!();
            help::print_usage();
            process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_flags_are_removed_anywhere() {
        let mut args: Vec<String> = ["-v", "big-pipe", "--virtual-time", "--timings", "1=0.5"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let flags = take_global_flags(&mut args);
        assert!(flags.verbose);
        assert!(flags.virtual_time);
        assert_eq!(args, vec!["big-pipe", "--timings", "1=0.5"]);
    }
}

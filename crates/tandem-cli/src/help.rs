// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Help text for CLI commands.

use colored::Colorize;

use crate::output;

pub fn print_usage() {
    println!(
        "{} {} - Batch coordination on a cooperative executor",
        output::title("Tandem"),
        output::version(env!("CARGO_PKG_VERSION"))
    );
    println!();
    println!(
        "{}: {} {} {}",
        output::section_header("Usage"),
        output::command("tandem"),
        output::arg("[options] <command>"),
        output::arg("[args]")
    );
    println!();
    println!("{}", output::section_header("Demos:"));
    println!("  {} {}   Stream placeholders in completion order", output::command("big-pipe"), output::arg("[--timings]"));
    println!("  {} {}    Collect placeholders in key order", output::command("barrier"), output::arg("[--timings]"));
    println!("  {}                Stream a batch whose second operation fails", output::command("failure"));
    println!("  {}       Two waits, each with its own continuation", output::command("suspension-order"));
    println!("  {} {}  Background repeat around the main work", output::command("repeated-defer"), output::arg("[--async]"));
    println!("  {} {}    Kernel handle/send/terminate staging", output::command("bootstrap"), output::arg("[--no-loop]"));
    println!();
    println!("  {}                   Show this help", output::command("help"));
    println!("  {}                Show version", output::command("version"));

    println!();
    println!("{}", output::section_header("Options:"));
    println!("  {}     Use the virtual clock (timers fire instantly, in order)", output::arg("--virtual-time"));
    println!("  {}        Log executor activity to stderr", output::arg("-v, --verbose"));

    println!();
    println!("{}", output::section_header("Environment:"));
    println!("  {}      Clock mode: {} or {}", output::arg("TANDEM_CLOCK"), "real".dimmed(), "virtual".dimmed());
    println!("  {}        Log filter (default {})", output::arg("TANDEM_LOG"), "warn".dimmed());
}

/// Help for a single command. Unknown names fall back to the main help.
pub fn print_command_help(cmd: &str) {
    match cmd {
        "big-pipe" => print_big_pipe_help(),
        "barrier" => print_barrier_help(),
        "failure" => print_failure_help(),
        "suspension-order" => print_suspension_order_help(),
        "repeated-defer" => print_repeated_defer_help(),
        "bootstrap" => print_bootstrap_help(),
        _ => print_usage(),
    }
}

fn usage_line(cmd: &str, args: &str) {
    println!(
        "{}: {} {} {}",
        "Usage".yellow(),
        output::command("tandem"),
        output::command(cmd),
        output::arg(args)
    );
}

fn print_timings_option() {
    println!();
    println!("{}", output::section_header("Options:"));
    println!(
        "  {}  Placeholder delays in seconds (default {})",
        output::arg("--timings <id=secs,...>"),
        "1=0.3,2=0.1,3=0.6,4=0.2".dimmed()
    );
}

fn print_big_pipe_help() {
    println!("{}", output::section_header("Big pipe"));
    println!();
    println!("Resolve placeholders that take different amounts of time and print");
    println!("each one as soon as it is ready. An unrelated timer fires in between.");
    println!();
    usage_line("big-pipe", "[--timings <id=secs,...>]");
    print_timings_option();
}

fn print_barrier_help() {
    println!("{}", output::section_header("Barrier"));
    println!();
    println!("Resolve the same placeholders but wait for all of them, then print");
    println!("the results in placeholder order.");
    println!();
    usage_line("barrier", "[--timings <id=secs,...>]");
    print_timings_option();
}

fn print_failure_help() {
    println!("{}", output::section_header("Failure"));
    println!();
    println!("Stream two operations where the second fails. The failure arrives as");
    println!("an ordinary item; the command reports it and exits non-zero.");
    println!();
    usage_line("failure", "");
}

fn print_suspension_order_help() {
    println!("{}", output::section_header("Suspension order"));
    println!();
    println!("Wait on two continuations resumed after 0.5s and 0.1s. Each wait");
    println!("receives its own value, whichever timer fires first.");
    println!();
    usage_line("suspension-order", "");
}

fn print_repeated_defer_help() {
    println!("{}", output::section_header("Repeated defer"));
    println!();
    println!("Schedule a repeating background job around two units of main work.");
    println!("Blocking work never lets it run; asynchronous work gives it turns.");
    println!();
    usage_line("repeated-defer", "[--async]");
    println!();
    println!("{}", output::section_header("Options:"));
    println!("  {}  Await the main work instead of blocking the thread", output::arg("--async"));
}

fn print_bootstrap_help() {
    println!("{}", output::section_header("Bootstrap"));
    println!();
    println!("Stage a request through kernel handle, response send and kernel");
    println!("terminate. Work queued after the response is only finished when the");
    println!("loop is run to completion at the end.");
    println!();
    usage_line("bootstrap", "[--no-loop]");
    println!();
    println!("{}", output::section_header("Options:"));
    println!("  {}  Return without draining the loop", output::arg("--no-loop"));
}

// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! `tandem repeated-defer`: a background job that only runs while the main
//! work is waiting.
//!
//! The job is a zero-interval repeat. Each firing switches itself off, does
//! half a second of asynchronous work and switches itself back on, unless
//! the main work finished in the meantime.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use tandem_rt::{CallbackId, ClockMode, ExecutorConfig, Executor, Handle};

/// Units of main work.
const TASKS: usize = 2;

pub fn cmd_repeated_defer(config: ExecutorConfig, args: &[String]) {
    let asynchronous = super::flag(args, "--async");
    let exec = Executor::with_config(config);
    let handle = exec.handle();

    super::drive(&exec, async {
        let prewarm = Prewarm::start(&handle);

        if asynchronous {
            println!("Performing {} asynchronous tasks that complete after 1 second", TASKS);
            for i in 0..TASKS {
                handle.sleep(Duration::from_secs(1)).await;
                println!("Completed asynchronous task {}", i);
            }
        } else {
            println!("Performing {} synchronous tasks that block for 1 second", TASKS);
            for i in 0..TASKS {
                // A virtual clock cannot be moved by blocking the thread.
                if handle.clock_mode() == ClockMode::Real {
                    std::thread::sleep(Duration::from_secs(1));
                }
                println!("Completed synchronous task {}", i);
            }
        }

        println!("Tasks complete, cancelling pre-warming.");
        prewarm.stop();
    });

    super::finish(&exec);
}

/// Repeating pre-warm job.
struct Prewarm {
    handle: Handle,
    /// Armed repeat, `None` while a pass is running.
    current: Cell<Option<CallbackId>>,
    stopped: Cell<bool>,
}

impl Prewarm {
    fn start(handle: &Handle) -> Rc<Self> {
        let prewarm = Rc::new(Self {
            handle: handle.clone(),
            current: Cell::new(None),
            stopped: Cell::new(false),
        });
        prewarm.arm();
        prewarm
    }

    fn arm(self: &Rc<Self>) {
        let this = self.clone();
        let id = self.handle.repeat(Duration::ZERO, move |id| {
            println!("Repeat triggered");
            this.handle.cancel(id);
            this.current.set(None);

            let pass = this.clone();
            this.handle.spawn(async move {
                pass.handle.sleep(Duration::from_millis(500)).await;
                if !pass.stopped.get() {
                    pass.arm();
                    println!("Re-enabled callback");
                }
            });
        });
        self.current.set(Some(id));
    }

    fn stop(&self) {
        self.stopped.set(true);
        if let Some(id) = self.current.take() {
            self.handle.cancel(id);
        }
    }
}

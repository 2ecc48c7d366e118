// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! `tandem bootstrap`: request staging through a kernel.
//!
//! `handle` and `send` wait for their own work. `send` and `terminate` also
//! leave work behind that only runs if the loop is drained at the end.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use tandem_rt::{Continuation, ExecutorConfig, Executor, Handle};
use tracing::warn;

pub fn cmd_bootstrap(config: ExecutorConfig, args: &[String]) {
    let no_loop = super::flag(args, "--no-loop");
    let exec = Executor::with_config(config);
    let kernel = Kernel::new(exec.handle());

    super::drive(&exec, async {
        let response = kernel.handle_request().await;
        response.send().await;
        kernel.terminate(response);
    });

    if !no_loop {
        super::finish(&exec);
    }
}

struct Kernel {
    handle: Handle,
}

impl Kernel {
    fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Produce a response after three ticks of a repeating timer.
    async fn handle_request(&self) -> Response {
        println!("Kernel::handle");

        let ready = Continuation::new();
        let resume = ready.clone();
        let handle = self.handle.clone();
        let count = Rc::new(Cell::new(0));
        self.handle.repeat(Duration::from_millis(100), move |id| {
            count.set(count.get() + 1);
            println!("Repeat {}", count.get());
            if count.get() == 3 {
                handle.cancel(id);
                if let Err(e) = resume.resume(Response::new(handle.clone())) {
                    warn!("{}", e);
                }
            }
        });

        ready.suspend().await
    }

    /// Queue clean-up work that outlives the request.
    fn terminate(&self, _response: Response) {
        println!("Kernel::terminate");
        self.handle.delay(Duration::from_secs(2), || {
            println!("Delayed task executed.");
        });
    }
}

struct Response {
    handle: Handle,
}

impl Response {
    fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Send the first part, wait for it, and leave the second part queued.
    async fn send(&self) {
        println!("Response::send");

        let sent = Continuation::new();
        let resume = sent.clone();
        let handle = self.handle.clone();
        self.handle.delay(Duration::from_millis(200), move || {
            println!("Sending part 1/2");
            handle.delay(Duration::from_millis(200), || {
                println!("Sending part 2/2");
            });
            if let Err(e) = resume.resume(()) {
                warn!("{}", e);
            }
        });

        sent.suspend().await;
    }
}

//! Leaky worker demo
//!
//! Runs a tiny "test suite" under [`taskleak::verify_main`]. One test starts a
//! worker and forgets to stop it, so the run exits with code 1 and prints the
//! leaked task. Pass `--fixed` to stop the worker properly.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --example leaky-worker
//! cargo run --example leaky-worker -- --fixed
//!
//! # Also write the report as JSON
//! TASKLEAK_JSON=leaks.json cargo run --example leaky-worker
//! ```

use std::time::Duration;

use crossbeam_channel::{bounded, Sender};
use taskleak::options::{cleanup, max_sleep, pretty};
use taskleak::tracker;

struct Worker {
    stop: Sender<()>,
    handle: std::thread::JoinHandle<()>,
}

fn start_worker() -> Worker {
    let (stop, stopped) = bounded::<()>(0);
    let handle = tracker::global()
        .spawn_thread_named("queue-worker", move || {
            let _state = tracker::global().enter_state("chan receive");
            stopped.recv().ok();
        })
        .expect("spawn worker");
    Worker { stop, handle }
}

fn run_suite(fixed: bool) -> i32 {
    let worker = start_worker();
    if fixed {
        drop(worker.stop);
        worker.handle.join().ok();
    } else {
        // Forgotten shutdown
        std::mem::forget(worker);
    }
    println!("test queue::drains ... ok");
    0
}

fn main() {
    env_logger::init();
    let fixed = std::env::args().any(|arg| arg == "--fixed");

    let code = taskleak::verify_main(
        tracker::global(),
        || run_suite(fixed),
        [
            pretty(),
            max_sleep(Duration::from_millis(10)),
            cleanup(|code| println!("suite finished with exit code {code}")),
        ],
    );

    if let Ok(path) = std::env::var("TASKLEAK_JSON") {
        if let Err(taskleak::LeakError::Leaked(report)) = taskleak::find(tracker::global(), [])
        {
            let file = std::fs::File::create(&path).expect("create report file");
            report.export_json(file).expect("write report");
            println!("report written to {path}");
        }
    }

    std::process::exit(code);
}

//! Destination teardown off the engine worker
//!
//! `remove_destination` only sends a key; the slot itself is dropped by the
//! worker when it applies the command. A slot owns a 2 s delay ring and the
//! `OutputSink` whose `Drop` closes a native stream and joins its owner
//! thread, neither of which may happen inside a chunk. Slots therefore reach
//! the engine wrapped in `basedrop::Owned`: the worker's drop just queues
//! the slot and the "router-gc" thread runs the real teardown on its next
//! pass, at most [`COLLECT_INTERVAL`] later.
//!
//! Slots still held by the engine at stop are closed on the worker by
//! `ProcessingEngine::close_outputs` and collected here afterwards.

use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

use basedrop::{Collector, Handle};
use crossbeam::channel::bounded;

/// Delay between collector passes
pub const COLLECT_INTERVAL: Duration = Duration::from_millis(50);

static GC_HANDLE: OnceLock<Handle> = OnceLock::new();

fn spawn_collector() -> Handle {
    let (tx, rx) = bounded(1);

    thread::Builder::new()
        .name("router-gc".to_string())
        .spawn(move || {
            // Collector is !Sync; only this thread ever touches it
            let mut collector = Collector::new();
            tx.send(collector.handle())
                .expect("Failed to hand out collector handle");
            log::info!("Destination collector started");

            loop {
                collector.collect();
                thread::sleep(COLLECT_INTERVAL);
            }
        })
        .expect("Failed to spawn destination collector thread");

    rx.recv().expect("Destination collector exited during startup")
}

/// Handle every engine-bound `Owned` value is allocated with
pub fn gc_handle() -> Handle {
    GC_HANDLE.get_or_init(spawn_collector).clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use basedrop::Owned;
    use crossbeam::channel::{unbounded, Sender};

    /// Reports the name of the thread that dropped it
    struct DropWitness(Sender<Option<String>>);

    impl Drop for DropWitness {
        fn drop(&mut self) {
            let _ = self.0.send(thread::current().name().map(str::to_string));
        }
    }

    #[test]
    fn test_drop_runs_on_collector_thread() {
        let (tx, rx) = unbounded();
        let owned = Owned::new(&gc_handle(), DropWitness(tx));

        thread::Builder::new()
            .name("worker".to_string())
            .spawn(move || drop(owned))
            .unwrap()
            .join()
            .unwrap();

        let dropped_on = rx.recv_timeout(COLLECT_INTERVAL * 20).unwrap();
        assert_eq!(dropped_on.as_deref(), Some("router-gc"));
    }
}

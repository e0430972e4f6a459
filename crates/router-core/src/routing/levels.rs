//! Periodic level broadcast
//!
//! A background thread samples the router's meters at a fixed cadence,
//! independent of the chunk rate, and pushes a [`LevelsUpdate`] to every
//! subscriber while a session runs. Slow subscribers miss updates instead
//! of blocking the broadcast; dropped subscribers are pruned.

use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};

use super::router::Router;
use super::state::LevelsUpdate;

type Subscribers = Arc<Mutex<Vec<Sender<LevelsUpdate>>>>;

/// Handle to the broadcast thread; dropping it stops the thread
pub struct LevelBroadcaster {
    subscribers: Subscribers,
    shutdown: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl LevelBroadcaster {
    /// Start broadcasting `router`'s levels every `interval`
    ///
    /// Holds only a weak reference: the thread exits on its own once the
    /// router is dropped.
    pub fn spawn(router: &Arc<Router>, interval: Duration) -> std::io::Result<Self> {
        let subscribers: Subscribers = Arc::default();
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);

        let router = Arc::downgrade(router);
        let targets = subscribers.clone();
        let thread = thread::Builder::new()
            .name("router-levels".to_string())
            .spawn(move || run(router, targets, shutdown_rx, interval))?;

        Ok(Self {
            subscribers,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    /// Receive updates, buffering at most `capacity` of them
    pub fn subscribe(&self, capacity: usize) -> Receiver<LevelsUpdate> {
        let (tx, rx) = bounded(capacity.max(1));
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn stop(&mut self) {
        self.shutdown.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Level broadcast thread panicked");
            }
        }
    }
}

impl Drop for LevelBroadcaster {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(
    router: Weak<Router>,
    subscribers: Subscribers,
    shutdown: Receiver<()>,
    interval: Duration,
) {
    loop {
        match shutdown.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            _ => break,
        }

        let Some(router) = router.upgrade() else {
            break;
        };
        if !router.is_running() {
            continue;
        }
        let update = router.levels();
        drop(router);

        let mut subscribers = subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| match tx.try_send(update.clone()) {
            Ok(()) | Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => false,
        });
    }
    log::debug!("Level broadcast stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::MockBackend;
    use crate::config::EngineConfig;
    use crate::types::InputChunk;
    use std::time::Instant;

    const INTERVAL: Duration = Duration::from_millis(5);

    fn running_router() -> (Arc<MockBackend>, Arc<Router>) {
        let backend = Arc::new(MockBackend::new());
        let config = EngineConfig {
            chunk_size: 64,
            ..Default::default()
        };
        let router = Arc::new(Router::new(backend.clone(), config));
        router.add_destination(&MockBackend::id("Out A")).unwrap();
        router.start(&MockBackend::id("Surround In")).unwrap();
        (backend, router)
    }

    #[test]
    fn test_updates_carry_meter_values() {
        let (backend, router) = running_router();
        let broadcaster = LevelBroadcaster::spawn(&router, INTERVAL).unwrap();
        let rx = broadcaster.subscribe(4);

        backend
            .feed()
            .send(InputChunk::from_fn(64, |_, channel| 0.1 * (channel + 1) as f32))
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        let update = loop {
            let update = rx.recv_timeout(Duration::from_secs(2)).unwrap();
            if update.input_levels[5] > 0.0 || Instant::now() > deadline {
                break update;
            }
        };
        assert!((update.input_levels[5] - 0.6).abs() < 1e-6);
        assert_eq!(update.output_levels.len(), 1);
        assert_eq!(update.output_levels[0].0, MockBackend::id("Out A"));
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let (_backend, router) = running_router();
        let broadcaster = LevelBroadcaster::spawn(&router, INTERVAL).unwrap();
        let kept = broadcaster.subscribe(1);
        drop(broadcaster.subscribe(1));
        assert_eq!(broadcaster.subscriber_count(), 2);

        let deadline = Instant::now() + Duration::from_secs(2);
        while broadcaster.subscriber_count() > 1 && Instant::now() < deadline {
            thread::sleep(INTERVAL);
        }
        assert_eq!(broadcaster.subscriber_count(), 1);
        assert!(kept.recv_timeout(Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn test_exits_when_router_dropped() {
        let backend = Arc::new(MockBackend::new());
        let router = Arc::new(Router::new(backend, EngineConfig::default()));
        let mut broadcaster = LevelBroadcaster::spawn(&router, INTERVAL).unwrap();
        let rx = broadcaster.subscribe(1);
        drop(router);

        broadcaster.stop();
        assert!(rx.try_recv().is_err());
    }
}

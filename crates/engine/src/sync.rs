//! Producer/consumer rendezvous between the simulator and the renderer.
//!
//! Two frame slots are handed back and forth: the simulator fills the sender
//! slot while the renderer consumes the receiver slot, and the two swap only
//! inside the shared lock. The producer can run at most one frame ahead.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::components::CompGraphics;
use crate::coordinates::Pixels;

static SYNC_LOCK_POISON_WARNED: AtomicBool = AtomicBool::new(false);

fn warn_sync_lock_poison_once(operation: &'static str) {
    if SYNC_LOCK_POISON_WARNED
        .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
        .is_ok()
    {
        warn!(operation, "frame sync lock poisoned; recovered inner value");
    }
}

fn recover<'a, T>(
    result: Result<MutexGuard<'a, T>, PoisonError<MutexGuard<'a, T>>>,
    operation: &'static str,
) -> MutexGuard<'a, T> {
    result.unwrap_or_else(|poisoned| {
        warn_sync_lock_poison_once(operation);
        poisoned.into_inner()
    })
}

/// One simulator-to-renderer snapshot.
#[derive(Debug, Default)]
pub struct FrameData {
    pub frame_number: u64,
    pub graphic_updates: Vec<Box<CompGraphics>>,
    /// Written by the renderer, read back by the simulator at tick start.
    pub viewport: Pixels,
}

#[derive(Debug)]
struct HandoffState {
    frame_ready: bool,
    shutdown: bool,
}

#[derive(Debug)]
pub struct ThreadSynchronizer<T> {
    slots: [Mutex<T>; 2],
    sender_index: AtomicUsize,
    receiver_index: AtomicUsize,
    state: Mutex<HandoffState>,
    changed: Condvar,
}

impl<T: Default> Default for ThreadSynchronizer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Default> ThreadSynchronizer<T> {
    pub fn new() -> Self {
        Self {
            slots: [Mutex::new(T::default()), Mutex::new(T::default())],
            sender_index: AtomicUsize::new(0),
            receiver_index: AtomicUsize::new(1),
            state: Mutex::new(HandoffState {
                frame_ready: true,
                shutdown: false,
            }),
            changed: Condvar::new(),
        }
    }
}

impl<T> ThreadSynchronizer<T> {
    /// The slot the producer is filling.
    pub fn sender_frame(&self) -> MutexGuard<'_, T> {
        let index = self.sender_index.load(Ordering::Acquire);
        recover(self.slots[index].lock(), "sender_frame")
    }

    /// The slot the consumer is reading.
    pub fn receiver_frame(&self) -> MutexGuard<'_, T> {
        let index = self.receiver_index.load(Ordering::Acquire);
        recover(self.slots[index].lock(), "receiver_frame")
    }

    /// Producer side. Blocks until the consumer has picked up the previous
    /// frame, runs `critical` while holding the lock, then swaps the slots.
    /// Returns false when shut down instead.
    pub fn wait_for_receiver(&self, critical: impl FnOnce()) -> bool {
        let guard = recover(self.state.lock(), "wait_for_receiver");
        let mut guard = recover(
            self.changed
                .wait_while(guard, |state| state.frame_ready && !state.shutdown),
            "wait_for_receiver",
        );
        if guard.shutdown {
            return false;
        }
        critical();
        let sender = self.sender_index.load(Ordering::Acquire);
        let receiver = self.receiver_index.load(Ordering::Acquire);
        self.sender_index.store(receiver, Ordering::Release);
        self.receiver_index.store(sender, Ordering::Release);
        guard.frame_ready = true;
        self.changed.notify_all();
        true
    }

    /// Consumer side. Signals that the current frame is consumed and blocks
    /// until the producer publishes the next one. Returns false when shut down.
    pub fn wait_for_sender(&self) -> bool {
        let mut guard = recover(self.state.lock(), "wait_for_sender");
        guard.frame_ready = false;
        self.changed.notify_all();
        let guard = recover(
            self.changed
                .wait_while(guard, |state| !state.frame_ready && !state.shutdown),
            "wait_for_sender",
        );
        !guard.shutdown
    }

    /// Wakes both sides; every later wait returns immediately.
    pub fn shutdown(&self) {
        let mut guard = recover(self.state.lock(), "shutdown");
        if !guard.shutdown {
            guard.shutdown = true;
            debug!("frame_sync_shutdown");
        }
        self.changed.notify_all();
    }

    pub fn is_shutdown(&self) -> bool {
        recover(self.state.lock(), "is_shutdown").shutdown
    }
}

/// Shuts the synchronizer down when dropped, including during a panic, so
/// the other side never waits on a thread that is gone.
#[derive(Debug)]
pub struct ShutdownOnDrop<T> {
    sync: Arc<ThreadSynchronizer<T>>,
}

impl<T> ShutdownOnDrop<T> {
    pub fn new(sync: Arc<ThreadSynchronizer<T>>) -> Self {
        Self { sync }
    }
}

impl<T> Drop for ShutdownOnDrop<T> {
    fn drop(&mut self) {
        self.sync.shutdown();
    }
}

/// Owner side of the shared stop flag.
#[derive(Debug, Clone, Default)]
pub struct StopSource {
    requested: Arc<AtomicBool>,
}

impl StopSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> StopToken {
        StopToken {
            requested: Arc::clone(&self.requested),
        }
    }

    pub fn request_stop(&self) {
        self.requested.store(true, Ordering::Release);
    }

    pub fn stop_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone)]
pub struct StopToken {
    requested: Arc<AtomicBool>,
}

impl StopToken {
    pub fn stop_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::types::EntityId;

    #[test]
    fn panicking_producer_releases_the_waiting_consumer() {
        let sync = Arc::new(ThreadSynchronizer::<FrameData>::new());
        let guard = ShutdownOnDrop::new(Arc::clone(&sync));
        let producer = thread::spawn(move || {
            let _shutdown = guard;
            panic!("simulation failed");
        });

        assert!(!sync.wait_for_sender());
        assert!(producer.join().is_err());
        assert!(sync.is_shutdown());
    }

    #[test]
    fn receiver_sees_every_frame_in_order() {
        let sync = ThreadSynchronizer::<FrameData>::new();
        let mut seen = Vec::new();

        thread::scope(|scope| {
            scope.spawn(|| {
                for frame_number in 1..=5 {
                    sync.sender_frame().frame_number = frame_number;
                    assert!(sync.wait_for_receiver(|| {}));
                }
            });

            for _ in 0..5 {
                assert!(sync.wait_for_sender());
                seen.push(sync.receiver_frame().frame_number);
            }
            sync.shutdown();
        });

        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn producer_stays_at_most_one_frame_ahead() {
        let sync = ThreadSynchronizer::<FrameData>::new();
        let published = AtomicUsize::new(0);

        thread::scope(|scope| {
            scope.spawn(|| {
                for frame_number in 1..=3 {
                    sync.sender_frame().frame_number = frame_number;
                    if !sync.wait_for_receiver(|| {}) {
                        return;
                    }
                    published.fetch_add(1, Ordering::SeqCst);
                }
            });

            assert!(sync.wait_for_sender());
            thread::sleep(Duration::from_millis(50));
            // The consumer has taken one frame; the producer cannot publish a second.
            assert_eq!(published.load(Ordering::SeqCst), 1);
            assert_eq!(sync.receiver_frame().frame_number, 1);
            sync.shutdown();
        });
    }

    #[test]
    fn critical_section_runs_before_the_swap() {
        let sync = ThreadSynchronizer::<FrameData>::new();
        let ran = AtomicBool::new(false);

        thread::scope(|scope| {
            scope.spawn(|| {
                sync.sender_frame()
                    .graphic_updates
                    .push(Box::new(CompGraphics::new(EntityId(7))));
                assert!(sync.wait_for_receiver(|| ran.store(true, Ordering::SeqCst)));
            });
            assert!(sync.wait_for_sender());
        });

        assert!(ran.load(Ordering::SeqCst));
        let frame = sync.receiver_frame();
        assert_eq!(frame.graphic_updates.len(), 1);
        assert_eq!(frame.graphic_updates[0].entity_id, EntityId(7));
    }

    #[test]
    fn shutdown_releases_both_waiters() {
        let sync = ThreadSynchronizer::<FrameData>::new();

        thread::scope(|scope| {
            let producer = scope.spawn(|| {
                // Blocks: no consumer has taken the initial frame.
                sync.wait_for_receiver(|| {})
            });
            thread::sleep(Duration::from_millis(20));
            sync.shutdown();
            assert!(!producer.join().expect("producer thread"));
        });

        assert!(!sync.wait_for_sender());
        assert!(!sync.wait_for_receiver(|| {}));
        assert!(sync.is_shutdown());
    }

    #[test]
    fn stop_token_observes_source() {
        let source = StopSource::new();
        let token = source.token();
        assert!(!token.stop_requested());
        source.request_stop();
        assert!(token.stop_requested());
        assert!(source.stop_requested());
    }
}

//! Recycled heap objects for per-tick snapshots.
//!
//! Each thread owns a [`LocalPool`]. When one runs dry it refills half its
//! capacity from the mutex-guarded [`SharedPool`]; when it overflows it
//! offloads half. Objects therefore migrate from the renderer (which releases
//! snapshots) back to the simulator (which acquires them).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

static POOL_LOCK_POISON_WARNED: AtomicBool = AtomicBool::new(false);

fn warn_pool_lock_poison_once() {
    if POOL_LOCK_POISON_WARNED
        .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
        .is_ok()
    {
        warn!("object pool lock poisoned; recovered inner value");
    }
}

#[derive(Debug)]
pub struct SharedPool<T> {
    items: Mutex<Vec<Box<T>>>,
}

impl<T> Default for SharedPool<T> {
    fn default() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
        }
    }
}

impl<T> SharedPool<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Box<T>>> {
        self.items.lock().unwrap_or_else(|poisoned| {
            warn_pool_lock_poison_once();
            poisoned.into_inner()
        })
    }

    fn take_into(&self, count: usize, out: &mut Vec<Box<T>>) {
        let mut items = self.lock();
        let keep = items.len().saturating_sub(count);
        out.extend(items.drain(keep..));
    }

    fn give(&self, batch: impl Iterator<Item = Box<T>>) {
        self.lock().extend(batch);
    }
}

#[derive(Debug)]
pub struct LocalPool<T> {
    free: Vec<Box<T>>,
    capacity: usize,
    shared: Arc<SharedPool<T>>,
    heap_allocations: u64,
}

impl<T: Default> LocalPool<T> {
    pub fn new(capacity: usize, shared: Arc<SharedPool<T>>) -> Self {
        let capacity = capacity.max(2);
        Self {
            free: Vec::with_capacity(capacity),
            capacity,
            shared,
            heap_allocations: 0,
        }
    }

    /// Hands out a recycled object, or a fresh one if both pools are empty.
    /// Recycled objects keep their previous contents.
    pub fn acquire(&mut self) -> Box<T> {
        if self.free.is_empty() {
            self.shared.take_into(self.capacity / 2, &mut self.free);
        }
        match self.free.pop() {
            Some(item) => item,
            None => {
                self.heap_allocations += 1;
                debug!(
                    capacity = self.capacity,
                    heap_allocations = self.heap_allocations,
                    "pool_heap_fallback"
                );
                Box::default()
            }
        }
    }

    pub fn release(&mut self, item: Box<T>) {
        self.free.push(item);
        if self.free.len() > self.capacity {
            let keep = self.free.len() - self.capacity / 2;
            self.shared.give(self.free.drain(keep..));
        }
    }

    pub fn available(&self) -> usize {
        self.free.len()
    }

    pub fn heap_allocations(&self) -> u64 {
        self.heap_allocations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_pools_fall_back_to_heap() {
        let shared = SharedPool::<u64>::new();
        let mut pool = LocalPool::new(4, Arc::clone(&shared));
        let item = pool.acquire();
        assert_eq!(*item, 0);
        assert_eq!(pool.heap_allocations(), 1);
    }

    #[test]
    fn overflow_offloads_half_to_shared_pool() {
        let shared = SharedPool::<u64>::new();
        let mut pool = LocalPool::new(4, Arc::clone(&shared));
        for value in 0..5 {
            pool.release(Box::new(value));
        }
        assert_eq!(pool.available(), 3);
        assert_eq!(shared.len(), 2);
    }

    #[test]
    fn released_objects_migrate_between_threads() {
        let shared = SharedPool::<Vec<u8>>::new();
        let mut consumer = LocalPool::new(4, Arc::clone(&shared));
        std::thread::scope(|scope| {
            scope.spawn(|| {
                let mut producer = LocalPool::new(4, Arc::clone(&shared));
                for _ in 0..6 {
                    producer.release(Box::new(vec![1, 2, 3]));
                }
            });
        });
        assert!(!shared.is_empty());

        let reused = consumer.acquire();
        assert_eq!(*reused, vec![1, 2, 3]);
        assert_eq!(consumer.heap_allocations(), 0);
        assert_eq!(consumer.available(), 1);
    }
}

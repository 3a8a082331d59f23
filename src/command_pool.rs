use std::{
    collections::VecDeque,
    ops::{Deref, DerefMut},
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use crossbeam_queue::SegQueue;

use crate::{device::CommandDevice, Result, TimelineValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QueueClass {
    Graphics = 0,
    Compute = 1,
    Copy = 2,
}

impl QueueClass {
    pub const ALL: [QueueClass; 3] = [QueueClass::Graphics, QueueClass::Compute, QueueClass::Copy];
    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

/// A native command-recording memory block on loan from a [`CommandAllocatorPool`].
///
/// Ownership moves back into the pool on [`CommandAllocatorPool::release`], so a block
/// cannot be released twice.
pub struct PooledCommandBlock<B> {
    id: u64,
    queue: QueueClass,
    raw: B,
}
impl<B> PooledCommandBlock<B> {
    /// Unique for the lifetime of the pool. Survives recycling.
    pub fn id(&self) -> u64 {
        self.id
    }
    pub fn queue(&self) -> QueueClass {
        self.queue
    }
}
impl<B> Deref for PooledCommandBlock<B> {
    type Target = B;
    fn deref(&self) -> &Self::Target {
        &self.raw
    }
}
impl<B> DerefMut for PooledCommandBlock<B> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.raw
    }
}
impl<B> std::fmt::Debug for PooledCommandBlock<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledCommandBlock")
            .field("id", &self.id)
            .field("queue", &self.queue)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct CommandPoolConfig {
    /// Reclaimed blocks beyond this many idle ones per queue class are destroyed.
    pub max_available_per_class: usize,
}
impl Default for CommandPoolConfig {
    fn default() -> Self {
        Self {
            max_available_per_class: 64,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueClassStats {
    pub available: usize,
    pub pending: usize,
    /// Blocks alive in this class: available, pending and on loan.
    pub total: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandPoolStats {
    pub per_class: [QueueClassStats; 3],
    pub available: usize,
    pub pending: usize,
    pub total: usize,
}
impl CommandPoolStats {
    pub fn class(&self, queue: QueueClass) -> &QueueClassStats {
        &self.per_class[queue.index()]
    }
}

struct ClassPool<B> {
    available: SegQueue<PooledCommandBlock<B>>,
    /// Fence values are non-decreasing front to back.
    pending: Mutex<VecDeque<(PooledCommandBlock<B>, TimelineValue)>>,
    total: AtomicUsize,
}
impl<B> Default for ClassPool<B> {
    fn default() -> Self {
        Self {
            available: SegQueue::new(),
            pending: Mutex::new(VecDeque::new()),
            total: AtomicUsize::new(0),
        }
    }
}

/// Recycles command-recording memory blocks per queue class.
///
/// Blocks move `Available -> Acquired -> Pending(fence) -> Available`. A pending block
/// only becomes available once [`CommandAllocatorPool::tick`] observes its fence value.
pub struct CommandAllocatorPool<D: CommandDevice> {
    device: Arc<D>,
    config: CommandPoolConfig,
    classes: [ClassPool<D::CommandBlock>; 3],
    next_id: AtomicU64,
}

impl<D: CommandDevice> CommandAllocatorPool<D> {
    pub fn new(device: Arc<D>, config: CommandPoolConfig) -> Self {
        Self {
            device,
            config,
            classes: Default::default(),
            next_id: AtomicU64::new(0),
        }
    }
    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    /// Returns a reset block for `queue`, reusing an available one when possible.
    pub fn acquire(&self, queue: QueueClass) -> Result<PooledCommandBlock<D::CommandBlock>> {
        let class = &self.classes[queue.index()];
        if let Some(mut block) = class.available.pop() {
            match self.device.reset_command_block(&mut block.raw) {
                Ok(()) => {
                    tracing::trace!(?queue, id = block.id, "command block reused");
                    return Ok(block);
                }
                Err(err) => {
                    tracing::warn!(?queue, id = block.id, %err, "command block reset failed, discarding");
                    class.total.fetch_sub(1, Ordering::Relaxed);
                    drop(block);
                }
            }
        }
        let raw = self.device.create_command_block(queue)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        class.total.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(?queue, id, "command block created");
        Ok(PooledCommandBlock { id, queue, raw })
    }

    /// Hands `block` back. It is reused once the device timeline reaches `fence`.
    ///
    /// Blocks of one queue class must be released in submission order.
    pub fn release(
        &self,
        block: PooledCommandBlock<D::CommandBlock>,
        queue: QueueClass,
        fence: TimelineValue,
    ) {
        if block.queue != queue {
            tracing::warn!(
                id = block.id,
                acquired_on = ?block.queue,
                released_on = ?queue,
                "command block released on a different queue class"
            );
        }
        let mut pending = self.classes[block.queue.index()].pending.lock().unwrap();
        if let Some((_, last)) = pending.back() {
            if fence < *last {
                tracing::warn!(
                    queue = ?block.queue,
                    ?fence,
                    last = ?last,
                    "command block released out of submission order"
                );
            }
        }
        pending.push_back((block, fence));
    }

    /// Moves every pending block whose fence is `<= completed` back to the available set.
    /// Returns the number of blocks reclaimed.
    pub fn tick(&self, completed: TimelineValue) -> usize {
        let mut reclaimed = 0;
        for queue in QueueClass::ALL {
            let class = &self.classes[queue.index()];
            let mut pending = class.pending.lock().unwrap();
            while let Some((_, fence)) = pending.front() {
                if !fence.is_reached(completed) {
                    break;
                }
                let Some((block, _)) = pending.pop_front() else {
                    break;
                };
                reclaimed += 1;
                if class.available.len() >= self.config.max_available_per_class {
                    tracing::trace!(?queue, id = block.id, "idle command block limit reached, destroying");
                    class.total.fetch_sub(1, Ordering::Relaxed);
                    drop(block);
                } else {
                    class.available.push(block);
                }
            }
        }
        if reclaimed > 0 {
            tracing::trace!(?completed, reclaimed, "command blocks reclaimed");
        }
        reclaimed
    }

    pub fn stats(&self) -> CommandPoolStats {
        let mut stats = CommandPoolStats::default();
        for queue in QueueClass::ALL {
            let class = &self.classes[queue.index()];
            let class_stats = QueueClassStats {
                available: class.available.len(),
                pending: class.pending.lock().unwrap().len(),
                total: class.total.load(Ordering::Relaxed),
            };
            stats.available += class_stats.available;
            stats.pending += class_stats.pending;
            stats.total += class_stats.total;
            stats.per_class[queue.index()] = class_stats;
        }
        stats
    }
}

impl<D: CommandDevice> Drop for CommandAllocatorPool<D> {
    fn drop(&mut self) {
        let pending: usize = self
            .classes
            .iter_mut()
            .map(|class| class.pending.get_mut().map(|p| p.len()).unwrap_or(0))
            .sum();
        if pending > 0 {
            tracing::warn!(pending, "command allocator pool dropped with blocks still in flight");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::{prelude::VkResult, vk};
    use proptest::prelude::*;
    use std::sync::atomic::AtomicBool;

    #[derive(Default)]
    struct CountingDevice {
        created: AtomicU64,
        resets: AtomicU64,
        fail_reset: AtomicBool,
        fail_create: AtomicBool,
    }
    impl CommandDevice for CountingDevice {
        type CommandBlock = u64;
        fn create_command_block(&self, _queue: QueueClass) -> VkResult<u64> {
            if self.fail_create.load(Ordering::Relaxed) {
                return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
            }
            Ok(self.created.fetch_add(1, Ordering::Relaxed))
        }
        fn reset_command_block(&self, _block: &mut u64) -> VkResult<()> {
            self.resets.fetch_add(1, Ordering::Relaxed);
            if self.fail_reset.load(Ordering::Relaxed) {
                return Err(vk::Result::ERROR_DEVICE_LOST);
            }
            Ok(())
        }
    }

    fn pool() -> CommandAllocatorPool<CountingDevice> {
        CommandAllocatorPool::new(Arc::new(CountingDevice::default()), Default::default())
    }

    #[test]
    fn test_reclaim_after_fence() {
        let pool = pool();
        let a = pool.acquire(QueueClass::Graphics).unwrap();
        let id = a.id();
        pool.release(a, QueueClass::Graphics, TimelineValue(5));
        assert_eq!(pool.tick(TimelineValue(3)), 0);
        assert_eq!(pool.stats().class(QueueClass::Graphics).pending, 1);

        assert_eq!(pool.tick(TimelineValue(5)), 1);
        let stats = pool.stats();
        assert_eq!(stats.class(QueueClass::Graphics).available, 1);
        assert_eq!(stats.pending, 0);

        let again = pool.acquire(QueueClass::Graphics).unwrap();
        assert_eq!(again.id(), id);
        assert_eq!(pool.device().resets.load(Ordering::Relaxed), 1);
        assert_eq!(pool.device().created.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_classes_are_isolated() {
        let pool = pool();
        let a = pool.acquire(QueueClass::Compute).unwrap();
        pool.release(a, QueueClass::Compute, TimelineValue(1));
        pool.tick(TimelineValue(1));
        let b = pool.acquire(QueueClass::Copy).unwrap();
        assert_eq!(b.id(), 1);
        let stats = pool.stats();
        assert_eq!(stats.class(QueueClass::Compute).available, 1);
        assert_eq!(stats.class(QueueClass::Copy).total, 1);
        assert_eq!(stats.total, 2);
    }

    #[test]
    fn test_tick_stops_at_first_incomplete() {
        let pool = pool();
        let blocks: Vec<_> = (0..3)
            .map(|_| pool.acquire(QueueClass::Graphics).unwrap())
            .collect();
        for (block, fence) in blocks.into_iter().zip([2, 4, 6]) {
            pool.release(block, QueueClass::Graphics, TimelineValue(fence));
        }
        assert_eq!(pool.tick(TimelineValue(4)), 2);
        assert_eq!(pool.stats().pending, 1);
    }

    #[test]
    fn test_release_on_wrong_class_keeps_own_class() {
        let pool = pool();
        let a = pool.acquire(QueueClass::Compute).unwrap();
        let id = a.id();
        pool.release(a, QueueClass::Graphics, TimelineValue(1));
        let stats = pool.stats();
        assert_eq!(stats.class(QueueClass::Compute).pending, 1);
        assert_eq!(stats.class(QueueClass::Graphics).pending, 0);

        assert_eq!(pool.tick(TimelineValue(1)), 1);
        let stats = pool.stats();
        assert_eq!(stats.class(QueueClass::Compute).available, 1);
        assert_eq!(stats.class(QueueClass::Graphics).available, 0);
        assert_eq!(pool.acquire(QueueClass::Compute).unwrap().id(), id);
    }

    #[test]
    fn test_out_of_order_release_never_reclaims_early() {
        let pool = pool();
        let a = pool.acquire(QueueClass::Graphics).unwrap();
        let b = pool.acquire(QueueClass::Graphics).unwrap();
        pool.release(a, QueueClass::Graphics, TimelineValue(5));
        pool.release(b, QueueClass::Graphics, TimelineValue(3));

        // The block behind an incomplete one waits too, even though its own fence passed.
        assert_eq!(pool.tick(TimelineValue(3)), 0);
        assert_eq!(pool.stats().pending, 2);
        assert_eq!(pool.tick(TimelineValue(4)), 0);

        assert_eq!(pool.tick(TimelineValue(5)), 2);
        let stats = pool.stats();
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.available, 2);
    }

    #[test]
    fn test_reset_failure_creates_new_block() {
        let pool = pool();
        let a = pool.acquire(QueueClass::Graphics).unwrap();
        pool.release(a, QueueClass::Graphics, TimelineValue(1));
        pool.tick(TimelineValue(1));
        pool.device().fail_reset.store(true, Ordering::Relaxed);
        let b = pool.acquire(QueueClass::Graphics).unwrap();
        assert_eq!(b.id(), 1);
        let stats = pool.stats();
        assert_eq!(stats.available, 0);
        assert_eq!(stats.total, 1);
    }

    #[test]
    fn test_create_failure_surfaces() {
        let pool = pool();
        pool.device().fail_create.store(true, Ordering::Relaxed);
        assert_eq!(
            pool.acquire(QueueClass::Copy).unwrap_err(),
            crate::PoolError::BuildFailure(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY)
        );
        assert_eq!(pool.stats().total, 0);
    }

    #[test]
    fn test_idle_limit() {
        let pool = CommandAllocatorPool::new(
            Arc::new(CountingDevice::default()),
            CommandPoolConfig {
                max_available_per_class: 1,
            },
        );
        let a = pool.acquire(QueueClass::Graphics).unwrap();
        let b = pool.acquire(QueueClass::Graphics).unwrap();
        pool.release(a, QueueClass::Graphics, TimelineValue(1));
        pool.release(b, QueueClass::Graphics, TimelineValue(1));
        assert_eq!(pool.tick(TimelineValue(1)), 2);
        let stats = pool.stats();
        assert_eq!(stats.available, 1);
        assert_eq!(stats.total, 1);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Acquire(usize),
        Release(usize),
        Tick(u64),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0usize..3).prop_map(Op::Acquire),
            any::<usize>().prop_map(Op::Release),
            (0u64..4).prop_map(Op::Tick),
        ]
    }

    proptest! {
        #[test]
        fn prop_block_never_reused_before_fence(ops in proptest::collection::vec(op_strategy(), 0..128)) {
            let pool = pool();
            let mut held = Vec::new();
            let mut outstanding: std::collections::HashMap<u64, TimelineValue> = Default::default();
            let mut next_fence = TimelineValue(1);
            let mut completed = TimelineValue(0);
            for op in ops {
                match op {
                    Op::Acquire(q) => {
                        let block = pool.acquire(QueueClass::ALL[q]).unwrap();
                        if let Some(fence) = outstanding.remove(&block.id()) {
                            prop_assert!(fence.is_reached(completed));
                        }
                        held.push(block);
                    }
                    Op::Release(pick) => {
                        if !held.is_empty() {
                            let block = held.swap_remove(pick % held.len());
                            outstanding.insert(block.id(), next_fence);
                            let queue = block.queue();
                            pool.release(block, queue, next_fence);
                            next_fence = next_fence.next();
                        }
                    }
                    Op::Tick(advance) => {
                        completed = TimelineValue((completed.get() + advance).min(next_fence.get() - 1));
                        pool.tick(completed);
                    }
                }
            }
        }
    }
}

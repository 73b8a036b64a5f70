// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Per-thread pools of native command buffers.
//!
//! Every thread that creates command buffers gets its own native command pools, so that
//! allocating and recording never lock. A [`CommandBufferAlloc`] can be dropped on any thread:
//! its native command buffer is pushed onto a lock-free queue of the thread it came from, and that
//! thread takes it back the next time it allocates.

use super::{references::ObjectReferences, CommandBufferFlags, QueueType};
use crate::{
    backend::{Backend, CommandBufferLevel},
    config::GrConfig,
    sync::Fence,
    NativeError,
};
use crossbeam_queue::SegQueue;
use parking_lot::Mutex;
use std::{
    fmt,
    mem::ManuallyDrop,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    thread::{self, ThreadId},
};
use thread_local::ThreadLocal;

/// Queue type, level and batch size.
const TYPE_COUNT: usize = QueueType::COUNT * 2 * 2;

/// A native command buffer and what has to live as long as it executes.
pub(crate) struct MicroCommandBuffer<B: Backend> {
    handle: B::CommandBuffer,
    type_index: usize,
    references: ObjectReferences,
    fence: Option<Arc<Fence<B>>>,
}

impl<B: Backend> MicroCommandBuffer<B> {
    /// Returns whether the device is done with the command buffer.
    fn is_done(&self) -> bool {
        match &self.fence {
            None => true,
            Some(fence) => fence.is_signaled().unwrap_or_else(|err| {
                log::error!("failed to query fence {:?}: {}", fence.handle(), err);
                false
            }),
        }
    }
}

/// A native command buffer allocated from a [`CommandBufferFactory`].
///
/// Dropping it hands the native command buffer back to the thread that allocated it.
pub(crate) struct CommandBufferAlloc<B: Backend> {
    inner: ManuallyDrop<MicroCommandBuffer<B>>,
    flags: CommandBufferFlags,
    queue: QueueType,
    fence: Mutex<Option<Arc<Fence<B>>>>,
    home: Arc<SegQueue<MicroCommandBuffer<B>>>,
}

impl<B: Backend> CommandBufferAlloc<B> {
    #[inline]
    pub(crate) fn handle(&self) -> B::CommandBuffer {
        self.inner.handle
    }

    #[inline]
    pub(crate) fn flags(&self) -> CommandBufferFlags {
        self.flags
    }

    #[inline]
    pub(crate) fn queue(&self) -> QueueType {
        self.queue
    }

    #[inline]
    pub(crate) fn references(&self) -> &ObjectReferences {
        &self.inner.references
    }

    #[inline]
    pub(crate) fn references_mut(&mut self) -> &mut ObjectReferences {
        &mut self.inner.references
    }

    /// Ties the command buffer to the fence of its submission. It won't be reused before the
    /// fence signals.
    ///
    /// # Panics
    ///
    /// - Panics if the command buffer is a secondary one or already has a fence.
    pub(crate) fn set_fence(&self, fence: Arc<Fence<B>>) {
        assert!(!self.flags.intersects(CommandBufferFlags::SECOND_LEVEL));

        let mut slot = self.fence.lock();
        assert!(slot.is_none(), "a command buffer can only be submitted once");
        *slot = Some(fence);
    }
}

impl<B: Backend> Drop for CommandBufferAlloc<B> {
    fn drop(&mut self) {
        let mut inner = unsafe { ManuallyDrop::take(&mut self.inner) };
        inner.fence = self.fence.get_mut().take();
        self.home.push(inner);
    }
}

impl<B: Backend> fmt::Debug for CommandBufferAlloc<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandBufferAlloc")
            .field("handle", &self.inner.handle)
            .field("flags", &self.flags)
            .field("queue", &self.queue)
            .field("references", &self.inner.references)
            .finish_non_exhaustive()
    }
}

struct CommandBufferType<B: Backend> {
    /// Reset and ready to record.
    ready: Vec<MicroCommandBuffer<B>>,
    /// Handed back, but the device may still be executing them.
    in_flight: Vec<MicroCommandBuffer<B>>,
}

struct ThreadAllocator<B: Backend> {
    thread: ThreadId,
    pools: [Option<B::CommandPool>; QueueType::COUNT],
    types: [CommandBufferType<B>; TYPE_COUNT],
    returned: Arc<SegQueue<MicroCommandBuffer<B>>>,
}

impl<B: Backend> ThreadAllocator<B> {
    fn new() -> Self {
        ThreadAllocator {
            thread: thread::current().id(),
            pools: [None; QueueType::COUNT],
            types: std::array::from_fn(|_| CommandBufferType {
                ready: Vec::new(),
                in_flight: Vec::new(),
            }),
            returned: Arc::new(SegQueue::new()),
        }
    }

    /// Moves the handed back command buffers the device is done with to the ready lists, and
    /// drops their references.
    fn reclaim(&mut self) -> usize {
        while let Some(micro) = self.returned.pop() {
            self.types[micro.type_index].in_flight.push(micro);
        }

        let mut reclaimed = 0;

        for ty in &mut self.types {
            let mut i = 0;

            while i < ty.in_flight.len() {
                if ty.in_flight[i].is_done() {
                    let mut micro = ty.in_flight.swap_remove(i);
                    micro.references.clear();
                    micro.fence = None;
                    ty.ready.push(micro);
                    reclaimed += 1;
                } else {
                    i += 1;
                }
            }
        }

        reclaimed
    }
}

/// Counters of a [`CommandBufferFactory`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CommandBufferFactoryStats {
    /// Native command buffers allocated so far.
    pub created_command_buffers: u64,
    /// Command buffers handed out again after a previous use.
    pub reused_command_buffers: u64,
}

/// Recycles native command buffers, with one set of pools per thread.
///
/// Command buffers are partitioned by queue, by level and by batch size. A command buffer is
/// reused only once the fence of its last submission has signaled.
pub struct CommandBufferFactory<B: Backend> {
    backend: Arc<B>,
    general_queue_family: u32,
    compute_queue_family: Option<u32>,
    reference_search_window: usize,
    threads: ThreadLocal<Mutex<ThreadAllocator<B>>>,
    created: AtomicU64,
    reused: AtomicU64,
}

impl<B: Backend> CommandBufferFactory<B> {
    /// Creates a new `CommandBufferFactory`.
    ///
    /// Returns [`NativeError::FeatureNotEnabled`] if the backend has no general queue.
    pub fn new(backend: Arc<B>, config: &GrConfig) -> Result<Self, NativeError> {
        let general_queue_family = backend
            .queue_family_index(QueueType::General)
            .ok_or_else(|| {
                log::error!("the backend has no general queue");
                NativeError::FeatureNotEnabled
            })?;

        let compute_queue_family = if config.async_compute {
            backend.queue_family_index(QueueType::Compute)
        } else {
            None
        };

        Ok(CommandBufferFactory {
            backend,
            general_queue_family,
            compute_queue_family,
            reference_search_window: config.reference_search_window,
            threads: ThreadLocal::new(),
            created: AtomicU64::new(0),
            reused: AtomicU64::new(0),
        })
    }

    /// Returns the queue command buffers created with `flags` go to.
    pub fn queue_type(&self, flags: CommandBufferFlags) -> QueueType {
        let compute_only = flags.intersects(CommandBufferFlags::COMPUTE_WORK)
            && !flags.intersects(CommandBufferFlags::GENERAL_WORK)
            && !flags.intersects(CommandBufferFlags::SECOND_LEVEL);

        if compute_only && self.compute_queue_family.is_some() {
            QueueType::Compute
        } else {
            QueueType::General
        }
    }

    #[inline]
    pub fn queue_family_index(&self, queue: QueueType) -> u32 {
        match queue {
            QueueType::General => self.general_queue_family,
            QueueType::Compute => self
                .compute_queue_family
                .unwrap_or(self.general_queue_family),
        }
    }

    /// Returns a native command buffer of the current thread, preferably one the device is done
    /// with.
    pub(crate) fn new_command_buffer(
        &self,
        flags: CommandBufferFlags,
    ) -> Result<CommandBufferAlloc<B>, NativeError> {
        let queue = self.queue_type(flags);
        let second_level = flags.intersects(CommandBufferFlags::SECOND_LEVEL);
        let small = flags.intersects(CommandBufferFlags::SMALL_BATCH);
        let type_index = (second_level as usize * 2 + small as usize) * QueueType::COUNT
            + queue as usize;

        let mut allocator = self
            .threads
            .get_or(|| Mutex::new(ThreadAllocator::new()))
            .lock();
        allocator.reclaim();

        let micro = match allocator.types[type_index].ready.pop() {
            Some(micro) => {
                if let Err(err) = unsafe { self.backend.reset_command_buffer(micro.handle) } {
                    log::error!("failed to reset command buffer {:?}: {}", micro.handle, err);

                    // Its state is unknown, so it is never handed out again.
                    if let Some(pool) = allocator.pools[queue as usize] {
                        unsafe { self.backend.free_command_buffer(pool, micro.handle) };
                    }

                    return Err(err);
                }

                log::trace!("reusing command buffer {:?}", micro.handle);
                self.reused.fetch_add(1, Ordering::Relaxed);

                micro
            }
            None => {
                let pool = match allocator.pools[queue as usize] {
                    Some(pool) => pool,
                    None => {
                        let pool = self
                            .backend
                            .create_command_pool(self.queue_family_index(queue))
                            .inspect_err(|err| {
                                log::error!("failed to create a command pool: {}", err);
                            })?;
                        allocator.pools[queue as usize] = Some(pool);

                        pool
                    }
                };

                let level = if second_level {
                    CommandBufferLevel::Secondary
                } else {
                    CommandBufferLevel::Primary
                };

                let handle = unsafe { self.backend.allocate_command_buffer(pool, level) }
                    .inspect_err(|err| {
                        log::error!("failed to allocate a command buffer: {}", err);
                    })?;

                self.created.fetch_add(1, Ordering::Relaxed);

                MicroCommandBuffer {
                    handle,
                    type_index,
                    references: ObjectReferences::new(self.reference_search_window),
                    fence: None,
                }
            }
        };

        Ok(CommandBufferAlloc {
            inner: ManuallyDrop::new(micro),
            flags,
            queue,
            fence: Mutex::new(None),
            home: allocator.returned.clone(),
        })
    }

    /// Frees the ready command buffers of the current thread. Returns how many were freed.
    pub fn trim(&self) -> usize {
        let Some(allocator) = self.threads.get() else {
            return 0;
        };

        let mut allocator = allocator.lock();
        allocator.reclaim();

        let ThreadAllocator { pools, types, .. } = &mut *allocator;
        let mut freed = 0;

        for (type_index, ty) in types.iter_mut().enumerate() {
            let Some(pool) = pools[type_index % QueueType::COUNT] else {
                debug_assert!(ty.ready.is_empty());
                continue;
            };

            for micro in ty.ready.drain(..) {
                unsafe { self.backend.free_command_buffer(pool, micro.handle) };
                freed += 1;
            }
        }

        log::debug!("trimmed {} command buffers", freed);

        freed
    }

    /// Drops the references and fences of every command buffer handed back, on all threads.
    ///
    /// The device must be done with all of them. Primaries that executed secondaries keep those
    /// secondaries alive, and with them the factory itself, until this is called.
    pub(crate) fn release_references(&self) {
        for allocator in self.threads.iter() {
            let mut allocator = allocator.lock();
            let ThreadAllocator { types, returned, .. } = &mut *allocator;

            for ty in types.iter_mut() {
                for micro in ty.in_flight.iter_mut().chain(ty.ready.iter_mut()) {
                    micro.references.clear();
                    micro.fence = None;
                }
            }

            // Dropping a secondary above may have handed it back here.
            while let Some(mut micro) = returned.pop() {
                micro.references.clear();
                micro.fence = None;
                types[micro.type_index].in_flight.push(micro);
            }
        }
    }

    pub fn stats(&self) -> CommandBufferFactoryStats {
        CommandBufferFactoryStats {
            created_command_buffers: self.created.load(Ordering::Relaxed),
            reused_command_buffers: self.reused.load(Ordering::Relaxed),
        }
    }
}

impl<B: Backend> Drop for CommandBufferFactory<B> {
    fn drop(&mut self) {
        for allocator in self.threads.iter_mut() {
            let allocator = allocator.get_mut();

            while let Some(micro) = allocator.returned.pop() {
                allocator.types[micro.type_index].in_flight.push(micro);
            }

            for (type_index, ty) in allocator.types.iter_mut().enumerate() {
                let pool = allocator.pools[type_index % QueueType::COUNT];

                for micro in ty.ready.drain(..).chain(ty.in_flight.drain(..)) {
                    if let Some(pool) = pool {
                        unsafe { self.backend.free_command_buffer(pool, micro.handle) };
                    }
                }
            }

            for pool in allocator.pools.iter().flatten() {
                unsafe { self.backend.destroy_command_pool(*pool) };
            }

            log::trace!(
                "destroyed the command pools of thread {:?}",
                allocator.thread,
            );
        }
    }
}

impl<B: Backend> fmt::Debug for CommandBufferFactory<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandBufferFactory")
            .field("general_queue_family", &self.general_queue_family)
            .field("compute_queue_family", &self.compute_queue_family)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::CommandBufferFactory;
    use crate::{
        backend::null::NullBackend,
        command_buffer::{CommandBufferFlags, QueueType},
        resource::BufferUsage,
        sync::Fence,
        GrConfig, NativeError,
    };
    use std::{sync::Arc, thread, time::Duration};

    #[test]
    fn reuse_after_fence() {
        let backend = Arc::new(NullBackend::new());
        let factory = CommandBufferFactory::new(backend.clone(), &GrConfig::default()).unwrap();
        let fence = Fence::new(backend.clone(), Duration::from_secs(1)).unwrap();

        let first = factory
            .new_command_buffer(CommandBufferFlags::GENERAL_WORK)
            .unwrap();
        let handle = first.handle();
        first.set_fence(fence.clone());
        drop(first);

        // The fence is unsignaled, so a new one is allocated.
        let second = factory
            .new_command_buffer(CommandBufferFlags::GENERAL_WORK)
            .unwrap();
        assert_ne!(second.handle(), handle);
        drop(second);

        backend.signal_fence(fence.handle());

        let third = factory
            .new_command_buffer(CommandBufferFlags::GENERAL_WORK)
            .unwrap();
        let fourth = factory
            .new_command_buffer(CommandBufferFlags::GENERAL_WORK)
            .unwrap();
        assert!(third.handle() == handle || fourth.handle() == handle);

        let stats = factory.stats();
        assert_eq!(stats.created_command_buffers, 2);
        assert_eq!(stats.reused_command_buffers, 2);
        assert_eq!(backend.allocated_command_buffer_count(), 2);
    }

    #[test]
    fn references_live_until_fence() {
        let backend = Arc::new(NullBackend::new());
        let factory = CommandBufferFactory::new(backend.clone(), &GrConfig::default()).unwrap();
        let fence = Fence::new(backend.clone(), Duration::from_secs(1)).unwrap();
        let buffer = gr_buffer!(64, BufferUsage::UNIFORM_FRAGMENT);

        let mut cmdb = factory
            .new_command_buffer(CommandBufferFlags::GENERAL_WORK)
            .unwrap();
        cmdb.references_mut().push_arc(&buffer);
        cmdb.set_fence(fence.clone());
        drop(cmdb);
        assert_eq!(Arc::strong_count(&buffer), 2);

        drop(factory.new_command_buffer(CommandBufferFlags::GENERAL_WORK).unwrap());
        assert_eq!(Arc::strong_count(&buffer), 2);

        backend.signal_fence(fence.handle());
        drop(factory.new_command_buffer(CommandBufferFlags::GENERAL_WORK).unwrap());
        assert_eq!(Arc::strong_count(&buffer), 1);
    }

    #[test]
    fn types_are_partitioned() {
        let backend = Arc::new(NullBackend::new());
        let factory = CommandBufferFactory::new(backend.clone(), &GrConfig::default()).unwrap();

        drop(factory.new_command_buffer(CommandBufferFlags::GENERAL_WORK).unwrap());
        let second_level = CommandBufferFlags::GENERAL_WORK | CommandBufferFlags::SECOND_LEVEL;
        drop(factory.new_command_buffer(second_level).unwrap());
        let small_batch = CommandBufferFlags::GENERAL_WORK | CommandBufferFlags::SMALL_BATCH;
        drop(factory.new_command_buffer(small_batch).unwrap());
        assert_eq!(factory.stats().created_command_buffers, 3);

        drop(factory.new_command_buffer(CommandBufferFlags::GENERAL_WORK).unwrap());
        assert_eq!(factory.stats().created_command_buffers, 3);
    }

    #[test]
    fn compute_queue_selection() {
        let backend = Arc::new(NullBackend::new());
        let factory = CommandBufferFactory::new(backend.clone(), &GrConfig::default()).unwrap();
        assert_eq!(factory.queue_type(CommandBufferFlags::COMPUTE_WORK), QueueType::Compute);
        assert_eq!(
            factory.queue_type(CommandBufferFlags::COMPUTE_WORK | CommandBufferFlags::GENERAL_WORK),
            QueueType::General,
        );

        let factory = CommandBufferFactory::new(
            backend,
            &GrConfig {
                async_compute: false,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(factory.queue_type(CommandBufferFlags::COMPUTE_WORK), QueueType::General);
    }

    #[test]
    fn failed_reset_frees_command_buffer() {
        let backend = Arc::new(NullBackend::new());
        let factory = CommandBufferFactory::new(backend.clone(), &GrConfig::default()).unwrap();

        let cmdb = factory
            .new_command_buffer(CommandBufferFlags::GENERAL_WORK)
            .unwrap();
        let handle = cmdb.handle();
        drop(cmdb);
        assert_eq!(backend.live_command_buffer_count(), 1);

        backend.fail_next_command_buffer_reset();
        assert_eq!(
            factory
                .new_command_buffer(CommandBufferFlags::GENERAL_WORK)
                .unwrap_err(),
            NativeError::OutOfDeviceMemory,
        );
        assert_eq!(backend.live_command_buffer_count(), 0);

        // The next one is a new allocation.
        let cmdb = factory
            .new_command_buffer(CommandBufferFlags::GENERAL_WORK)
            .unwrap();
        assert_ne!(cmdb.handle(), handle);
        assert_eq!(factory.stats().created_command_buffers, 2);
    }

    #[test]
    fn released_on_other_thread() {
        let backend = Arc::new(NullBackend::new());
        let factory = CommandBufferFactory::new(backend.clone(), &GrConfig::default()).unwrap();

        let cmdb = factory
            .new_command_buffer(CommandBufferFlags::GENERAL_WORK)
            .unwrap();
        let handle = cmdb.handle();
        thread::spawn(move || drop(cmdb)).join().unwrap();

        let cmdb = factory
            .new_command_buffer(CommandBufferFlags::GENERAL_WORK)
            .unwrap();
        assert_eq!(cmdb.handle(), handle);
        drop(cmdb);

        assert_eq!(factory.trim(), 1);
        assert_eq!(backend.live_command_buffer_count(), 0);
    }
}

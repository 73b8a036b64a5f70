// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

use super::{DescriptorSetLayout, DescriptorType};
use crate::{
    backend::{Backend, DescriptorPoolSize, DescriptorWrite},
    config::GrConfig,
    NativeError,
};
use foldhash::{HashMap, HashMapExt};
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::{fmt, num::NonZero, sync::Arc};

/// Counters of a [`DescriptorSetFactory`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DescriptorSetFactoryStats {
    pub pools: usize,
    pub allocated_sets: u64,
    pub recycled_sets: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

struct CachedSet<S> {
    set: S,
    last_used_frame: u64,
}

/// The pools and cached sets of one layout.
struct LayoutAllocator<B: Backend> {
    layout: B::DescriptorSetLayout,
    pool_sizes: SmallVec<[DescriptorPoolSize; DescriptorType::COUNT]>,
    pools: Vec<B::DescriptorPool>,
    next_pool_capacity: u32,
    cache: HashMap<u64, CachedSet<B::DescriptorSet>>,
    /// Sets evicted from the cache, to be rewritten.
    free: Vec<B::DescriptorSet>,
}

struct Inner<B: Backend> {
    allocators: HashMap<NonZero<u64>, LayoutAllocator<B>>,
    frame: u64,
    stats: DescriptorSetFactoryStats,
}

/// Allocates native descriptor sets and caches them by content.
///
/// Every layout gets its own pools. When a pool is full a bigger one is created, growing by
/// [`descriptor_pool_size_scale`](GrConfig::descriptor_pool_size_scale). Sets are never freed:
/// a set that hasn't been used for
/// [`descriptor_frame_buffering`](GrConfig::descriptor_frame_buffering) calls to
/// [`new_frame`](Self::new_frame) is taken out of the cache and rewritten with the next new
/// content.
pub struct DescriptorSetFactory<B: Backend> {
    backend: Arc<B>,
    initial_pool_capacity: u32,
    pool_capacity_scale: f32,
    frame_buffering: u64,
    inner: Mutex<Inner<B>>,
}

impl<B: Backend> DescriptorSetFactory<B> {
    pub fn new(backend: Arc<B>, config: &GrConfig) -> Self {
        DescriptorSetFactory {
            backend,
            initial_pool_capacity: config.descriptor_pool_initial_size.max(1),
            pool_capacity_scale: config.descriptor_pool_size_scale.max(1.0),
            frame_buffering: u64::from(config.descriptor_frame_buffering),
            inner: Mutex::new(Inner {
                allocators: HashMap::new(),
                frame: 0,
                stats: DescriptorSetFactoryStats::default(),
            }),
        }
    }

    /// Returns the set whose content hashes to `hash`, and whether it was written by this call.
    /// On a miss a set is allocated, or taken from the evicted ones, and `writes` is called to
    /// fill it.
    pub(crate) fn get_or_create<'a>(
        &self,
        layout: &DescriptorSetLayout<B>,
        hash: u64,
        writes: impl FnOnce() -> SmallVec<[DescriptorWrite<'a, B>; 8]>,
    ) -> Result<(B::DescriptorSet, bool), NativeError> {
        let mut inner = self.inner.lock();
        let Inner {
            allocators,
            frame,
            stats,
        } = &mut *inner;

        let allocator = allocators
            .entry(layout.id())
            .or_insert_with(|| LayoutAllocator {
                layout: layout.handle(),
                pool_sizes: layout.pool_sizes().iter().copied().collect(),
                pools: Vec::new(),
                next_pool_capacity: self.initial_pool_capacity,
                cache: HashMap::new(),
                free: Vec::new(),
            });

        if let Some(cached) = allocator.cache.get_mut(&hash) {
            cached.last_used_frame = *frame;
            stats.cache_hits += 1;
            log::trace!("descriptor set cache hit (hash {:#018x})", hash);

            return Ok((cached.set, false));
        }

        stats.cache_misses += 1;

        let set = match allocator.free.pop() {
            Some(set) => {
                stats.recycled_sets += 1;
                set
            }
            None => {
                let set = self.allocate(allocator, stats)?;
                stats.allocated_sets += 1;
                set
            }
        };

        let writes = writes();
        unsafe { self.backend.update_descriptor_set(set, &writes) };

        allocator.cache.insert(
            hash,
            CachedSet {
                set,
                last_used_frame: *frame,
            },
        );

        Ok((set, true))
    }

    fn allocate(
        &self,
        allocator: &mut LayoutAllocator<B>,
        stats: &mut DescriptorSetFactoryStats,
    ) -> Result<B::DescriptorSet, NativeError> {
        loop {
            if let Some(&pool) = allocator.pools.last() {
                match unsafe { self.backend.allocate_descriptor_set(pool, allocator.layout) } {
                    Ok(set) => return Ok(set),
                    Err(err) if err.is_pool_exhausted() => {}
                    Err(err) => {
                        log::error!("failed to allocate a descriptor set: {}", err);
                        return Err(err);
                    }
                }
            }

            let capacity = allocator.next_pool_capacity;
            let pool_sizes: SmallVec<[DescriptorPoolSize; DescriptorType::COUNT]> = allocator
                .pool_sizes
                .iter()
                .map(|size| DescriptorPoolSize {
                    ty: size.ty,
                    descriptor_count: size.descriptor_count * capacity,
                })
                .collect();

            let pool = self
                .backend
                .create_descriptor_pool(capacity, &pool_sizes)
                .inspect_err(|err| {
                    log::error!(
                        "failed to create a descriptor pool of {} sets: {}",
                        capacity,
                        err,
                    );
                })?;

            log::debug!(
                "created descriptor pool {:?} of {} sets for layout {:?}",
                pool,
                capacity,
                allocator.layout,
            );

            allocator.pools.push(pool);
            allocator.next_pool_capacity =
                (capacity as f32 * self.pool_capacity_scale).ceil() as u32;
            stats.pools += 1;
        }
    }

    /// Advances the frame counter and evicts the sets that went unused for the configured
    /// number of frames.
    pub fn new_frame(&self) {
        let mut inner = self.inner.lock();
        inner.frame += 1;

        let frame = inner.frame;
        let frame_buffering = self.frame_buffering;

        for allocator in inner.allocators.values_mut() {
            let free = &mut allocator.free;

            allocator.cache.retain(|_, cached| {
                let keep = frame - cached.last_used_frame < frame_buffering;

                if !keep {
                    free.push(cached.set);
                }

                keep
            });
        }
    }

    pub fn stats(&self) -> DescriptorSetFactoryStats {
        self.inner.lock().stats
    }
}

impl<B: Backend> Drop for DescriptorSetFactory<B> {
    fn drop(&mut self) {
        for (_, allocator) in self.inner.get_mut().allocators.drain() {
            for pool in allocator.pools {
                unsafe { self.backend.destroy_descriptor_pool(pool) };
            }
        }
    }
}

impl<B: Backend> fmt::Debug for DescriptorSetFactory<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorSetFactory")
            .field("initial_pool_capacity", &self.initial_pool_capacity)
            .field("pool_capacity_scale", &self.pool_capacity_scale)
            .field("frame_buffering", &self.frame_buffering)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::DescriptorSetFactory;
    use crate::{
        backend::null::{NullBackend, NullHandle},
        descriptor_set::{
            DescriptorBindingInfo, DescriptorSetLayout, DescriptorSetState, DescriptorType,
        },
        resource::BufferUsage,
        shader::ShaderStages,
        GrConfig,
    };
    use std::sync::Arc;

    fn layout() -> Arc<DescriptorSetLayout<NullBackend>> {
        DescriptorSetLayout::from_handle(
            NullHandle::new(),
            [DescriptorBindingInfo {
                binding: 0,
                ty: DescriptorType::StorageBuffer,
                array_size: 1,
                stages: ShaderStages::COMPUTE,
            }],
        )
    }

    #[test]
    fn pools_grow() {
        let backend = Arc::new(NullBackend::new());
        let factory = DescriptorSetFactory::new(
            backend.clone(),
            &GrConfig {
                descriptor_pool_initial_size: 2,
                descriptor_pool_size_scale: 2.0,
                ..Default::default()
            },
        );
        let layout = layout();
        let buffer = gr_buffer!(1024, BufferUsage::STORAGE_COMPUTE_READ);
        let mut state = DescriptorSetState::new();
        state.set_layout(Some(&layout));

        for i in 0..5 {
            state.bind_storage_buffer(0, 0, &buffer, i * 128, 128);
            assert!(state.flush(&factory, true).unwrap().is_some());
        }

        let stats = factory.stats();
        assert_eq!(stats.pools, 2);
        assert_eq!(stats.allocated_sets, 5);
        assert_eq!(backend.live_descriptor_pool_count(), 2);

        drop(factory);
        assert_eq!(backend.live_descriptor_pool_count(), 0);
    }

    #[test]
    fn unused_sets_are_recycled() {
        let backend = Arc::new(NullBackend::new());
        let factory = DescriptorSetFactory::new(
            backend.clone(),
            &GrConfig {
                descriptor_frame_buffering: 2,
                ..Default::default()
            },
        );
        let layout = layout();
        let buffer = gr_buffer!(1024, BufferUsage::STORAGE_COMPUTE_WRITE);
        let mut state = DescriptorSetState::new();
        state.set_layout(Some(&layout));

        state.bind_storage_buffer(0, 0, &buffer, 0, 128);
        let first = state.flush(&factory, true).unwrap();

        factory.new_frame();
        state.bind_storage_buffer(0, 0, &buffer, 0, 128);
        state.invalidate();
        assert_eq!(state.flush(&factory, true).unwrap(), first);

        factory.new_frame();
        factory.new_frame();

        state.bind_storage_buffer(0, 0, &buffer, 128, 128);
        // The set is rewritten, so it has to be bound again.
        let second = state.flush(&factory, true).unwrap();
        assert_eq!(second, first);

        let stats = factory.stats();
        assert_eq!(stats.allocated_sets, 1);
        assert_eq!(stats.recycled_sets, 1);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(backend.allocated_descriptor_set_count(), 1);
    }
}

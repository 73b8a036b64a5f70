// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Gathering of consecutive commands of the same kind.
//!
//! Every command goes through [`Batches::switch_to`] with its kind before being recorded. When
//! the kind differs from the one of the previous command, the batch of the previous kind is
//! recorded as native commands. Batched commands are thus recorded in the order they were issued
//! relative to every other command.

use crate::{
    backend::Backend,
    sync::{
        BufferMemoryBarrier, DependencyInfo, ImageMemoryBarrier, MemoryBarrier, PipelineStages,
    },
    DeviceSize,
};
use smallvec::SmallVec;
use std::fmt;

/// Size of one query result copied into a buffer.
pub(crate) const QUERY_RESULT_SIZE: DeviceSize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum BatchKind {
    Barrier,
    QueryReset,
    QueryResultWrite,
    PushSecondLevel,
    /// Every command that isn't batched.
    AnyOther,
}

struct QueryResultWrite<B: Backend> {
    pool: B::QueryPool,
    query: u32,
    buffer: B::Buffer,
    offset: DeviceSize,
}

pub(crate) struct Batches<B: Backend> {
    last: BatchKind,

    src_stages: PipelineStages,
    dst_stages: PipelineStages,
    memory_barriers: SmallVec<[MemoryBarrier; 2]>,
    buffer_barriers: Vec<BufferMemoryBarrier<B>>,
    image_barriers: Vec<ImageMemoryBarrier<B>>,

    query_resets: Vec<(B::QueryPool, u32)>,
    query_result_writes: Vec<QueryResultWrite<B>>,
    second_level: Vec<B::CommandBuffer>,
}

impl<B: Backend> Batches<B> {
    pub(crate) fn new() -> Self {
        Batches {
            last: BatchKind::AnyOther,
            src_stages: PipelineStages::empty(),
            dst_stages: PipelineStages::empty(),
            memory_barriers: SmallVec::new(),
            buffer_barriers: Vec::new(),
            image_barriers: Vec::new(),
            query_resets: Vec::new(),
            query_result_writes: Vec::new(),
            second_level: Vec::new(),
        }
    }

    /// Records the pending batch if `kind` is different from the kind of the previous command.
    pub(crate) fn switch_to(&mut self, backend: &B, cmdb: B::CommandBuffer, kind: BatchKind) {
        if self.last == kind {
            return;
        }

        match self.last {
            BatchKind::Barrier => self.flush_barriers(backend, cmdb),
            BatchKind::QueryReset => self.flush_query_resets(backend, cmdb),
            BatchKind::QueryResultWrite => self.flush_query_result_writes(backend, cmdb),
            BatchKind::PushSecondLevel => self.flush_second_level(backend, cmdb),
            BatchKind::AnyOther => {}
        }

        self.last = kind;
    }

    /// Records whatever is pending.
    #[inline]
    pub(crate) fn flush(&mut self, backend: &B, cmdb: B::CommandBuffer) {
        self.switch_to(backend, cmdb, BatchKind::AnyOther);
    }

    pub(crate) fn push_image_barrier(
        &mut self,
        backend: &B,
        cmdb: B::CommandBuffer,
        src_stages: PipelineStages,
        dst_stages: PipelineStages,
        barrier: ImageMemoryBarrier<B>,
    ) {
        self.switch_to(backend, cmdb, BatchKind::Barrier);
        self.src_stages |= src_stages;
        self.dst_stages |= dst_stages;

        // Barriers on consecutive mips of the same layers, as issued when walking a mip chain,
        // become one.
        if let Some(last) = self.image_barriers.last_mut() {
            let (a, b) = (&last.subresource_range, &barrier.subresource_range);

            if last.image == barrier.image
                && last.src_access == barrier.src_access
                && last.dst_access == barrier.dst_access
                && last.old_layout == barrier.old_layout
                && last.new_layout == barrier.new_layout
                && a.aspects == b.aspects
                && a.base_array_layer == b.base_array_layer
                && a.layer_count == b.layer_count
                && a.base_mip_level + a.level_count == b.base_mip_level
            {
                last.subresource_range.level_count += b.level_count;
                return;
            }
        }

        self.image_barriers.push(barrier);
    }

    pub(crate) fn push_buffer_barrier(
        &mut self,
        backend: &B,
        cmdb: B::CommandBuffer,
        src_stages: PipelineStages,
        dst_stages: PipelineStages,
        barrier: BufferMemoryBarrier<B>,
    ) {
        self.switch_to(backend, cmdb, BatchKind::Barrier);
        self.src_stages |= src_stages;
        self.dst_stages |= dst_stages;
        self.buffer_barriers.push(barrier);
    }

    pub(crate) fn push_memory_barrier(
        &mut self,
        backend: &B,
        cmdb: B::CommandBuffer,
        src_stages: PipelineStages,
        dst_stages: PipelineStages,
        barrier: MemoryBarrier,
    ) {
        self.switch_to(backend, cmdb, BatchKind::Barrier);
        self.src_stages |= src_stages;
        self.dst_stages |= dst_stages;
        self.memory_barriers.push(barrier);
    }

    pub(crate) fn push_query_reset(
        &mut self,
        backend: &B,
        cmdb: B::CommandBuffer,
        pool: B::QueryPool,
        query: u32,
    ) {
        self.switch_to(backend, cmdb, BatchKind::QueryReset);
        self.query_resets.push((pool, query));
    }

    /// Queues a copy of the 32-bit result of `query` to `buffer` at `offset`.
    pub(crate) fn push_query_result_write(
        &mut self,
        backend: &B,
        cmdb: B::CommandBuffer,
        pool: B::QueryPool,
        query: u32,
        buffer: B::Buffer,
        offset: DeviceSize,
    ) {
        self.switch_to(backend, cmdb, BatchKind::QueryResultWrite);
        self.query_result_writes.push(QueryResultWrite {
            pool,
            query,
            buffer,
            offset,
        });
    }

    pub(crate) fn push_second_level(
        &mut self,
        backend: &B,
        cmdb: B::CommandBuffer,
        second_level: B::CommandBuffer,
    ) {
        self.switch_to(backend, cmdb, BatchKind::PushSecondLevel);
        self.second_level.push(second_level);
    }

    fn flush_barriers(&mut self, backend: &B, cmdb: B::CommandBuffer) {
        if self.image_barriers.is_empty()
            && self.buffer_barriers.is_empty()
            && self.memory_barriers.is_empty()
        {
            return;
        }

        let dependency_info = DependencyInfo {
            src_stages: self.src_stages,
            dst_stages: self.dst_stages,
            memory_barriers: &self.memory_barriers,
            buffer_memory_barriers: &self.buffer_barriers,
            image_memory_barriers: &self.image_barriers,
        };

        unsafe { backend.cmd_pipeline_barrier(cmdb, &dependency_info) };

        self.src_stages = PipelineStages::empty();
        self.dst_stages = PipelineStages::empty();
        self.memory_barriers.clear();
        self.buffer_barriers.clear();
        self.image_barriers.clear();
    }

    fn flush_query_resets(&mut self, backend: &B, cmdb: B::CommandBuffer) {
        let mut run: Option<(B::QueryPool, u32, u32)> = None;

        for &(pool, query) in &self.query_resets {
            match &mut run {
                Some((run_pool, first, count)) if *run_pool == pool && *first + *count == query => {
                    *count += 1;
                }
                _ => {
                    if let Some((pool, first, count)) = run {
                        unsafe { backend.cmd_reset_query_pool(cmdb, pool, first, count) };
                    }

                    run = Some((pool, query, 1));
                }
            }
        }

        if let Some((pool, first, count)) = run {
            unsafe { backend.cmd_reset_query_pool(cmdb, pool, first, count) };
        }

        self.query_resets.clear();
    }

    fn flush_query_result_writes(&mut self, backend: &B, cmdb: B::CommandBuffer) {
        let mut iter = self.query_result_writes.iter();
        let Some(first) = iter.next() else {
            return;
        };

        let mut run = (first, 1u32);

        let emit = |(first, count): (&QueryResultWrite<B>, u32)| unsafe {
            backend.cmd_copy_query_pool_results(
                cmdb,
                first.pool,
                first.query,
                count,
                first.buffer,
                first.offset,
                QUERY_RESULT_SIZE,
            );
        };

        for write in iter {
            let (start, count) = run;

            if write.pool == start.pool
                && write.buffer == start.buffer
                && write.query == start.query + count
                && write.offset == start.offset + DeviceSize::from(count) * QUERY_RESULT_SIZE
            {
                run.1 += 1;
            } else {
                emit(run);
                run = (write, 1);
            }
        }

        emit(run);
        self.query_result_writes.clear();
    }

    fn flush_second_level(&mut self, backend: &B, cmdb: B::CommandBuffer) {
        if self.second_level.is_empty() {
            return;
        }

        unsafe { backend.cmd_execute_commands(cmdb, &self.second_level) };
        self.second_level.clear();
    }
}

impl<B: Backend> fmt::Debug for Batches<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Batches")
            .field("last", &self.last)
            .field("image_barriers", &self.image_barriers.len())
            .field("buffer_barriers", &self.buffer_barriers.len())
            .field("memory_barriers", &self.memory_barriers.len())
            .field("query_resets", &self.query_resets.len())
            .field("query_result_writes", &self.query_result_writes.len())
            .field("second_level", &self.second_level.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{BatchKind, Batches};
    use crate::{
        backend::null::{NullBackend, NullCommand, NullHandle},
        sync::{
            AccessFlags, BufferMemoryBarrier, ImageAspects, ImageLayout, ImageMemoryBarrier,
            ImageSubresourceRange, PipelineStages,
        },
    };

    fn mip_barrier(image: NullHandle, level: u32) -> ImageMemoryBarrier<NullBackend> {
        ImageMemoryBarrier {
            src_access: AccessFlags::TRANSFER_WRITE,
            dst_access: AccessFlags::SHADER_READ,
            old_layout: ImageLayout::TransferDstOptimal,
            new_layout: ImageLayout::ShaderReadOnlyOptimal,
            image,
            subresource_range: ImageSubresourceRange {
                aspects: ImageAspects::COLOR,
                base_mip_level: level,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            },
        }
    }

    #[test]
    fn flushed_on_kind_change() {
        let backend = NullBackend::new();
        let cmdb = NullHandle::new();
        let pool = NullHandle::new();
        let buffer = NullHandle::new();
        let mut batches = Batches::<NullBackend>::new();

        batches.push_image_barrier(
            &backend,
            cmdb,
            PipelineStages::TRANSFER,
            PipelineStages::FRAGMENT_SHADER,
            mip_barrier(NullHandle::new(), 0),
        );
        batches.push_buffer_barrier(
            &backend,
            cmdb,
            PipelineStages::COMPUTE_SHADER,
            PipelineStages::VERTEX_INPUT,
            BufferMemoryBarrier {
                src_access: AccessFlags::SHADER_WRITE,
                dst_access: AccessFlags::VERTEX_ATTRIBUTE_READ,
                buffer,
                offset: 0,
                size: 64,
            },
        );
        assert!(backend.commands(cmdb).is_empty());

        batches.push_query_reset(&backend, cmdb, pool, 0);
        batches.push_image_barrier(
            &backend,
            cmdb,
            PipelineStages::TRANSFER,
            PipelineStages::FRAGMENT_SHADER,
            mip_barrier(NullHandle::new(), 0),
        );
        batches.switch_to(&backend, cmdb, BatchKind::AnyOther);

        let commands = backend.commands(cmdb);
        assert_eq!(commands.len(), 3);
        assert!(matches!(
            commands[0],
            NullCommand::PipelineBarrier {
                src_stages,
                image_barriers: 1,
                buffer_barriers: 1,
                memory_barriers: 0,
                ..
            } if src_stages == PipelineStages::TRANSFER | PipelineStages::COMPUTE_SHADER
        ));
        assert_eq!(
            commands[1],
            NullCommand::ResetQueryPool {
                pool,
                first_query: 0,
                query_count: 1,
            },
        );
        assert!(matches!(
            commands[2],
            NullCommand::PipelineBarrier { image_barriers: 1, buffer_barriers: 0, .. }
        ));
    }

    #[test]
    fn consecutive_mips_merge() {
        let backend = NullBackend::new();
        let cmdb = NullHandle::new();
        let image = NullHandle::new();
        let mut batches = Batches::<NullBackend>::new();

        for level in [0, 1, 2, 4] {
            batches.push_image_barrier(
                &backend,
                cmdb,
                PipelineStages::TRANSFER,
                PipelineStages::FRAGMENT_SHADER,
                mip_barrier(image, level),
            );
        }

        batches.flush(&backend, cmdb);

        assert!(matches!(
            backend.commands(cmdb)[..],
            [NullCommand::PipelineBarrier { image_barriers: 2, .. }]
        ));
    }

    #[test]
    fn query_runs_merge() {
        let backend = NullBackend::new();
        let cmdb = NullHandle::new();
        let (pool_a, pool_b) = (NullHandle::new(), NullHandle::new());
        let buffer = NullHandle::new();
        let mut batches = Batches::<NullBackend>::new();

        for (pool, query) in [(pool_a, 3), (pool_a, 4), (pool_a, 5), (pool_b, 6), (pool_a, 9)] {
            batches.push_query_reset(&backend, cmdb, pool, query);
        }

        for (query, offset) in [(0, 0), (1, 4), (2, 8), (3, 16)] {
            batches.push_query_result_write(&backend, cmdb, pool_a, query, buffer, offset);
        }

        batches.flush(&backend, cmdb);

        assert_eq!(
            backend.commands(cmdb),
            [
                NullCommand::ResetQueryPool {
                    pool: pool_a,
                    first_query: 3,
                    query_count: 3,
                },
                NullCommand::ResetQueryPool {
                    pool: pool_b,
                    first_query: 6,
                    query_count: 1,
                },
                NullCommand::ResetQueryPool {
                    pool: pool_a,
                    first_query: 9,
                    query_count: 1,
                },
                NullCommand::CopyQueryPoolResults {
                    pool: pool_a,
                    first_query: 0,
                    query_count: 3,
                    dst_buffer: buffer,
                    dst_offset: 0,
                },
                NullCommand::CopyQueryPoolResults {
                    pool: pool_a,
                    first_query: 3,
                    query_count: 1,
                    dst_buffer: buffer,
                    dst_offset: 16,
                },
            ],
        );
    }

    #[test]
    fn second_level_executed_together() {
        let backend = NullBackend::new();
        let cmdb = NullHandle::new();
        let (a, b) = (NullHandle::new(), NullHandle::new());
        let mut batches = Batches::<NullBackend>::new();

        batches.push_second_level(&backend, cmdb, a);
        batches.push_second_level(&backend, cmdb, b);
        batches.flush(&backend, cmdb);

        assert_eq!(
            backend.commands(cmdb),
            [NullCommand::ExecuteCommands {
                command_buffers: vec![a, b],
            }],
        );
    }
}

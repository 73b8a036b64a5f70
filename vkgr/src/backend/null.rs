// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! A backend without a device.
//!
//! [`NullBackend`] hands out unique fake handles and records every command into a log that can
//! be inspected with [`NullBackend::commands`]. Fences are signaled by hand, or at submission
//! with [`NullBackend::set_auto_signal`].

use super::{
    Backend, BufferCopy, BufferImageCopy, ClearColorValue, CommandBufferBeginInfo,
    CommandBufferLevel, DescriptorPoolSize, DescriptorWrite, ImageBlit, IndexType,
    PipelineBindPoint, Rect2D, RenderPassBeginInfo, ShaderBindingTables, SubpassContents,
    Viewport,
};
use crate::{
    command_buffer::QueueType,
    pipeline::{FaceSelection, GraphicsPipelineDesc},
    shader::{ShaderStageDesc, ShaderStages},
    sync::{DependencyInfo, ImageLayout, ImageSubresourceRange, PipelineStages},
    DeviceSize, NativeError,
};
use foldhash::{HashMap, HashSet};
use parking_lot::{Condvar, Mutex};
use std::{
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
    time::{Duration, Instant},
};

/// Queue family of the general queue.
pub const GENERAL_QUEUE_FAMILY: u32 = 0;

/// Queue family of the dedicated compute queue.
pub const COMPUTE_QUEUE_FAMILY: u32 = 1;

/// A fake native handle. Every call to [`NullHandle::new`] returns a different one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NullHandle(u64);

impl NullHandle {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);

        NullHandle(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub fn as_raw(self) -> u64 {
        self.0
    }
}

impl Default for NullHandle {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

/// A command recorded by the [`NullBackend`].
#[derive(Clone, Debug, PartialEq)]
pub enum NullCommand {
    BindPipeline {
        bind_point: PipelineBindPoint,
        pipeline: NullHandle,
    },
    BindDescriptorSets {
        bind_point: PipelineBindPoint,
        layout: NullHandle,
        first_set: u32,
        sets: Vec<NullHandle>,
    },
    BindVertexBuffers {
        first_binding: u32,
        buffers: Vec<NullHandle>,
        offsets: Vec<DeviceSize>,
    },
    BindIndexBuffer {
        buffer: NullHandle,
        offset: DeviceSize,
        index_type: IndexType,
    },
    SetViewport(Viewport),
    SetScissor(Rect2D),
    SetStencilCompareMask {
        faces: FaceSelection,
        value: u32,
    },
    SetStencilWriteMask {
        faces: FaceSelection,
        value: u32,
    },
    SetStencilReference {
        faces: FaceSelection,
        value: u32,
    },
    SetLineWidth(f32),
    PushConstants {
        stages: ShaderStages,
        offset: u32,
        size: u32,
    },
    BeginRenderPass {
        render_pass: NullHandle,
        framebuffer: NullHandle,
        render_area: Rect2D,
        contents: SubpassContents,
    },
    EndRenderPass,
    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    },
    DrawIndirect {
        buffer: NullHandle,
        offset: DeviceSize,
        draw_count: u32,
        stride: u32,
    },
    DrawIndexedIndirect {
        buffer: NullHandle,
        offset: DeviceSize,
        draw_count: u32,
        stride: u32,
    },
    Dispatch {
        group_counts: [u32; 3],
    },
    TraceRays {
        tables: ShaderBindingTables,
        extent: [u32; 3],
    },
    /// Only the number of barriers of each kind is kept.
    PipelineBarrier {
        src_stages: PipelineStages,
        dst_stages: PipelineStages,
        memory_barriers: usize,
        buffer_barriers: usize,
        image_barriers: usize,
    },
    ResetQueryPool {
        pool: NullHandle,
        first_query: u32,
        query_count: u32,
    },
    BeginQuery {
        pool: NullHandle,
        query: u32,
    },
    EndQuery {
        pool: NullHandle,
        query: u32,
    },
    WriteTimestamp {
        pool: NullHandle,
        query: u32,
    },
    CopyQueryPoolResults {
        pool: NullHandle,
        first_query: u32,
        query_count: u32,
        dst_buffer: NullHandle,
        dst_offset: DeviceSize,
    },
    ExecuteCommands {
        command_buffers: Vec<NullHandle>,
    },
    FillBuffer {
        buffer: NullHandle,
        offset: DeviceSize,
        size: DeviceSize,
        data: u32,
    },
    CopyBuffer {
        src: NullHandle,
        dst: NullHandle,
        regions: Vec<BufferCopy>,
    },
    CopyBufferToImage {
        src: NullHandle,
        dst: NullHandle,
        dst_layout: ImageLayout,
        regions: Vec<BufferImageCopy>,
    },
    BlitImage {
        src: NullHandle,
        src_layout: ImageLayout,
        dst: NullHandle,
        dst_layout: ImageLayout,
        regions: Vec<ImageBlit>,
    },
    ClearColorImage {
        image: NullHandle,
        layout: ImageLayout,
        color: ClearColorValue,
        range: ImageSubresourceRange,
    },
    ClearDepthStencilImage {
        image: NullHandle,
        layout: ImageLayout,
        depth: f32,
        stencil: u32,
        range: ImageSubresourceRange,
    },
    BuildAccelerationStructure {
        acceleration_structure: NullHandle,
        scratch_address: DeviceSize,
    },
}

/// One call to [`Backend::queue_submit`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NullSubmission {
    pub queue_family_index: u32,
    pub command_buffers: Vec<NullHandle>,
    pub fence: NullHandle,
}

struct NullDescriptorPool {
    max_sets: u32,
    allocated: u32,
}

#[derive(Default)]
struct State {
    commands: HashMap<NullHandle, Vec<NullCommand>>,
    command_pools: HashSet<NullHandle>,
    command_buffers: HashSet<NullHandle>,
    allocated_command_buffers: u64,
    /// Live fences and whether they are signaled.
    fences: HashMap<NullHandle, bool>,
    pipelines: HashSet<NullHandle>,
    created_pipelines: u64,
    fail_next_pipeline: bool,
    fail_next_reset: bool,
    descriptor_pools: HashMap<NullHandle, NullDescriptorPool>,
    allocated_descriptor_sets: u64,
    submissions: Vec<NullSubmission>,
}

/// A [`Backend`] that doesn't talk to any device.
///
/// Every object is a [`NullHandle`]. Nothing is executed: commands are appended to a log per
/// command buffer, and a submission completes whenever its fence is signaled.
pub struct NullBackend {
    state: Mutex<State>,
    fence_signaled: Condvar,
    auto_signal: AtomicBool,
    compute_queue: bool,
}

impl NullBackend {
    /// Creates a backend with a general and a compute queue.
    pub fn new() -> Self {
        NullBackend {
            state: Mutex::new(State::default()),
            fence_signaled: Condvar::new(),
            auto_signal: AtomicBool::new(false),
            compute_queue: true,
        }
    }

    /// Creates a backend with only a general queue.
    pub fn without_compute_queue() -> Self {
        NullBackend {
            compute_queue: false,
            ..Self::new()
        }
    }

    /// When enabled, fences are signaled as soon as they are submitted.
    pub fn set_auto_signal(&self, enable: bool) {
        self.auto_signal.store(enable, Ordering::Relaxed);
    }

    /// Returns the commands recorded into `cmdb` since it was last reset.
    pub fn commands(&self, cmdb: NullHandle) -> Vec<NullCommand> {
        self.state
            .lock()
            .commands
            .get(&cmdb)
            .cloned()
            .unwrap_or_default()
    }

    /// Signals a fence, as if the device had finished its submission.
    ///
    /// # Panics
    ///
    /// - Panics if `fence` isn't alive.
    pub fn signal_fence(&self, fence: NullHandle) {
        let mut state = self.state.lock();
        let signaled = state
            .fences
            .get_mut(&fence)
            .expect("signaled a fence that doesn't exist");
        *signaled = true;
        self.fence_signaled.notify_all();
    }

    /// Signals every fence that was submitted.
    pub fn signal_all_fences(&self) {
        let mut state = self.state.lock();
        let State {
            fences,
            submissions,
            ..
        } = &mut *state;

        for submission in submissions.iter() {
            if let Some(signaled) = fences.get_mut(&submission.fence) {
                *signaled = true;
            }
        }

        self.fence_signaled.notify_all();
    }

    /// Makes the next pipeline creation fail with [`NativeError::OutOfDeviceMemory`].
    pub fn fail_next_pipeline_creation(&self) {
        self.state.lock().fail_next_pipeline = true;
    }

    /// Makes the next command buffer reset fail with [`NativeError::OutOfDeviceMemory`].
    pub fn fail_next_command_buffer_reset(&self) {
        self.state.lock().fail_next_reset = true;
    }

    pub fn submissions(&self) -> Vec<NullSubmission> {
        self.state.lock().submissions.clone()
    }

    pub fn live_fence_count(&self) -> usize {
        self.state.lock().fences.len()
    }

    /// Number of command buffers allocated over the lifetime of the backend.
    pub fn allocated_command_buffer_count(&self) -> u64 {
        self.state.lock().allocated_command_buffers
    }

    pub fn live_command_buffer_count(&self) -> usize {
        self.state.lock().command_buffers.len()
    }

    /// Number of pipelines created over the lifetime of the backend.
    pub fn created_pipeline_count(&self) -> u64 {
        self.state.lock().created_pipelines
    }

    pub fn live_pipeline_count(&self) -> usize {
        self.state.lock().pipelines.len()
    }

    /// Number of descriptor sets allocated over the lifetime of the backend.
    pub fn allocated_descriptor_set_count(&self) -> u64 {
        self.state.lock().allocated_descriptor_sets
    }

    pub fn live_descriptor_pool_count(&self) -> usize {
        self.state.lock().descriptor_pools.len()
    }

    fn record(&self, cmdb: NullHandle, command: NullCommand) {
        self.state
            .lock()
            .commands
            .entry(cmdb)
            .or_default()
            .push(command);
    }
}

impl Default for NullBackend {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for NullBackend {
    type CommandPool = NullHandle;
    type CommandBuffer = NullHandle;
    type Fence = NullHandle;
    type Pipeline = NullHandle;
    type PipelineLayout = NullHandle;
    type ShaderModule = NullHandle;
    type DescriptorSetLayout = NullHandle;
    type DescriptorPool = NullHandle;
    type DescriptorSet = NullHandle;
    type Buffer = NullHandle;
    type Image = NullHandle;
    type ImageView = NullHandle;
    type Sampler = NullHandle;
    type QueryPool = NullHandle;
    type RenderPass = NullHandle;
    type Framebuffer = NullHandle;
    type AccelerationStructure = NullHandle;

    fn queue_family_index(&self, queue: QueueType) -> Option<u32> {
        match queue {
            QueueType::General => Some(GENERAL_QUEUE_FAMILY),
            QueueType::Compute => self.compute_queue.then_some(COMPUTE_QUEUE_FAMILY),
        }
    }

    /// Signals every submitted fence.
    fn wait_idle(&self) -> Result<(), NativeError> {
        self.signal_all_fences();

        Ok(())
    }

    fn create_command_pool(&self, queue_family_index: u32) -> Result<NullHandle, NativeError> {
        assert!(self.queue_family_index(QueueType::General) == Some(queue_family_index)
            || self.queue_family_index(QueueType::Compute) == Some(queue_family_index));

        let pool = NullHandle::new();
        self.state.lock().command_pools.insert(pool);

        Ok(pool)
    }

    unsafe fn destroy_command_pool(&self, pool: NullHandle) {
        assert!(self.state.lock().command_pools.remove(&pool));
    }

    unsafe fn allocate_command_buffer(
        &self,
        pool: NullHandle,
        _level: CommandBufferLevel,
    ) -> Result<NullHandle, NativeError> {
        let mut state = self.state.lock();
        assert!(state.command_pools.contains(&pool));

        let cmdb = NullHandle::new();
        state.command_buffers.insert(cmdb);
        state.allocated_command_buffers += 1;

        Ok(cmdb)
    }

    unsafe fn free_command_buffer(&self, pool: NullHandle, cmdb: NullHandle) {
        let mut state = self.state.lock();
        assert!(state.command_pools.contains(&pool));
        assert!(state.command_buffers.remove(&cmdb));
        state.commands.remove(&cmdb);
    }

    unsafe fn reset_command_buffer(&self, cmdb: NullHandle) -> Result<(), NativeError> {
        let mut state = self.state.lock();

        if std::mem::take(&mut state.fail_next_reset) {
            return Err(NativeError::OutOfDeviceMemory);
        }

        state.commands.remove(&cmdb);

        Ok(())
    }

    unsafe fn begin_command_buffer(
        &self,
        cmdb: NullHandle,
        _info: &CommandBufferBeginInfo<Self>,
    ) -> Result<(), NativeError> {
        assert!(self.state.lock().command_buffers.contains(&cmdb));

        Ok(())
    }

    unsafe fn end_command_buffer(&self, _cmdb: NullHandle) -> Result<(), NativeError> {
        Ok(())
    }

    unsafe fn queue_submit(
        &self,
        queue_family_index: u32,
        command_buffers: &[NullHandle],
        fence: NullHandle,
    ) -> Result<(), NativeError> {
        let mut state = self.state.lock();
        assert!(state.fences.contains_key(&fence));
        state.submissions.push(NullSubmission {
            queue_family_index,
            command_buffers: command_buffers.to_vec(),
            fence,
        });

        if self.auto_signal.load(Ordering::Relaxed) {
            state.fences.insert(fence, true);
            self.fence_signaled.notify_all();
        }

        Ok(())
    }

    fn create_fence(&self) -> Result<NullHandle, NativeError> {
        let fence = NullHandle::new();
        self.state.lock().fences.insert(fence, false);

        Ok(fence)
    }

    unsafe fn destroy_fence(&self, fence: NullHandle) {
        self.state.lock().fences.remove(&fence);
    }

    unsafe fn fence_status(&self, fence: NullHandle) -> Result<bool, NativeError> {
        Ok(self.state.lock().fences.get(&fence).copied().unwrap_or(false))
    }

    unsafe fn wait_fence(&self, fence: NullHandle, timeout: Duration) -> Result<bool, NativeError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();

        loop {
            if state.fences.get(&fence).copied().unwrap_or(false) {
                return Ok(true);
            }

            if self
                .fence_signaled
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return Ok(state.fences.get(&fence).copied().unwrap_or(false));
            }
        }
    }

    unsafe fn create_graphics_pipeline(
        &self,
        desc: &GraphicsPipelineDesc<Self>,
    ) -> Result<NullHandle, NativeError> {
        assert!(!desc.stages.is_empty());
        self.create_pipeline()
    }

    unsafe fn create_compute_pipeline(
        &self,
        stage: &ShaderStageDesc<Self>,
        _layout: NullHandle,
    ) -> Result<NullHandle, NativeError> {
        assert_eq!(stage.stage, ShaderStages::COMPUTE);
        self.create_pipeline()
    }

    unsafe fn destroy_pipeline(&self, pipeline: NullHandle) {
        assert!(self.state.lock().pipelines.remove(&pipeline));
    }

    fn create_descriptor_pool(
        &self,
        max_sets: u32,
        _pool_sizes: &[DescriptorPoolSize],
    ) -> Result<NullHandle, NativeError> {
        let pool = NullHandle::new();
        self.state.lock().descriptor_pools.insert(
            pool,
            NullDescriptorPool {
                max_sets,
                allocated: 0,
            },
        );

        Ok(pool)
    }

    unsafe fn destroy_descriptor_pool(&self, pool: NullHandle) {
        assert!(self.state.lock().descriptor_pools.remove(&pool).is_some());
    }

    unsafe fn allocate_descriptor_set(
        &self,
        pool: NullHandle,
        _layout: NullHandle,
    ) -> Result<NullHandle, NativeError> {
        let mut state = self.state.lock();
        let pool = state
            .descriptor_pools
            .get_mut(&pool)
            .expect("allocated from a descriptor pool that doesn't exist");

        if pool.allocated == pool.max_sets {
            return Err(NativeError::OutOfPoolMemory);
        }

        pool.allocated += 1;
        state.allocated_descriptor_sets += 1;

        Ok(NullHandle::new())
    }

    unsafe fn update_descriptor_set(
        &self,
        _set: NullHandle,
        _writes: &[DescriptorWrite<'_, Self>],
    ) {
    }

    unsafe fn cmd_bind_pipeline(
        &self,
        cmdb: NullHandle,
        bind_point: PipelineBindPoint,
        pipeline: NullHandle,
    ) {
        self.record(
            cmdb,
            NullCommand::BindPipeline {
                bind_point,
                pipeline,
            },
        );
    }

    unsafe fn cmd_bind_descriptor_sets(
        &self,
        cmdb: NullHandle,
        bind_point: PipelineBindPoint,
        layout: NullHandle,
        first_set: u32,
        sets: &[NullHandle],
    ) {
        self.record(
            cmdb,
            NullCommand::BindDescriptorSets {
                bind_point,
                layout,
                first_set,
                sets: sets.to_vec(),
            },
        );
    }

    unsafe fn cmd_bind_vertex_buffers(
        &self,
        cmdb: NullHandle,
        first_binding: u32,
        buffers: &[NullHandle],
        offsets: &[DeviceSize],
    ) {
        assert_eq!(buffers.len(), offsets.len());
        self.record(
            cmdb,
            NullCommand::BindVertexBuffers {
                first_binding,
                buffers: buffers.to_vec(),
                offsets: offsets.to_vec(),
            },
        );
    }

    unsafe fn cmd_bind_index_buffer(
        &self,
        cmdb: NullHandle,
        buffer: NullHandle,
        offset: DeviceSize,
        index_type: IndexType,
    ) {
        self.record(
            cmdb,
            NullCommand::BindIndexBuffer {
                buffer,
                offset,
                index_type,
            },
        );
    }

    unsafe fn cmd_set_viewport(&self, cmdb: NullHandle, viewport: &Viewport) {
        self.record(cmdb, NullCommand::SetViewport(*viewport));
    }

    unsafe fn cmd_set_scissor(&self, cmdb: NullHandle, scissor: &Rect2D) {
        self.record(cmdb, NullCommand::SetScissor(*scissor));
    }

    unsafe fn cmd_set_stencil_compare_mask(
        &self,
        cmdb: NullHandle,
        faces: FaceSelection,
        mask: u32,
    ) {
        self.record(cmdb, NullCommand::SetStencilCompareMask { faces, value: mask });
    }

    unsafe fn cmd_set_stencil_write_mask(&self, cmdb: NullHandle, faces: FaceSelection, mask: u32) {
        self.record(cmdb, NullCommand::SetStencilWriteMask { faces, value: mask });
    }

    unsafe fn cmd_set_stencil_reference(
        &self,
        cmdb: NullHandle,
        faces: FaceSelection,
        reference: u32,
    ) {
        self.record(
            cmdb,
            NullCommand::SetStencilReference {
                faces,
                value: reference,
            },
        );
    }

    unsafe fn cmd_set_line_width(&self, cmdb: NullHandle, width: f32) {
        self.record(cmdb, NullCommand::SetLineWidth(width));
    }

    unsafe fn cmd_push_constants(
        &self,
        cmdb: NullHandle,
        _layout: NullHandle,
        stages: ShaderStages,
        offset: u32,
        data: &[u8],
    ) {
        self.record(
            cmdb,
            NullCommand::PushConstants {
                stages,
                offset,
                size: data.len() as u32,
            },
        );
    }

    unsafe fn cmd_begin_render_pass(&self, cmdb: NullHandle, info: &RenderPassBeginInfo<'_, Self>) {
        self.record(
            cmdb,
            NullCommand::BeginRenderPass {
                render_pass: info.render_pass,
                framebuffer: info.framebuffer,
                render_area: info.render_area,
                contents: info.contents,
            },
        );
    }

    unsafe fn cmd_end_render_pass(&self, cmdb: NullHandle) {
        self.record(cmdb, NullCommand::EndRenderPass);
    }

    unsafe fn cmd_draw(
        &self,
        cmdb: NullHandle,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        self.record(
            cmdb,
            NullCommand::Draw {
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            },
        );
    }

    unsafe fn cmd_draw_indexed(
        &self,
        cmdb: NullHandle,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        self.record(
            cmdb,
            NullCommand::DrawIndexed {
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            },
        );
    }

    unsafe fn cmd_draw_indirect(
        &self,
        cmdb: NullHandle,
        buffer: NullHandle,
        offset: DeviceSize,
        draw_count: u32,
        stride: u32,
    ) {
        self.record(
            cmdb,
            NullCommand::DrawIndirect {
                buffer,
                offset,
                draw_count,
                stride,
            },
        );
    }

    unsafe fn cmd_draw_indexed_indirect(
        &self,
        cmdb: NullHandle,
        buffer: NullHandle,
        offset: DeviceSize,
        draw_count: u32,
        stride: u32,
    ) {
        self.record(
            cmdb,
            NullCommand::DrawIndexedIndirect {
                buffer,
                offset,
                draw_count,
                stride,
            },
        );
    }

    unsafe fn cmd_dispatch(&self, cmdb: NullHandle, x: u32, y: u32, z: u32) {
        self.record(
            cmdb,
            NullCommand::Dispatch {
                group_counts: [x, y, z],
            },
        );
    }

    unsafe fn cmd_trace_rays(
        &self,
        cmdb: NullHandle,
        tables: &ShaderBindingTables,
        width: u32,
        height: u32,
        depth: u32,
    ) {
        self.record(
            cmdb,
            NullCommand::TraceRays {
                tables: *tables,
                extent: [width, height, depth],
            },
        );
    }

    unsafe fn cmd_pipeline_barrier(
        &self,
        cmdb: NullHandle,
        dependency_info: &DependencyInfo<'_, Self>,
    ) {
        self.record(
            cmdb,
            NullCommand::PipelineBarrier {
                src_stages: dependency_info.src_stages,
                dst_stages: dependency_info.dst_stages,
                memory_barriers: dependency_info.memory_barriers.len(),
                buffer_barriers: dependency_info.buffer_memory_barriers.len(),
                image_barriers: dependency_info.image_memory_barriers.len(),
            },
        );
    }

    unsafe fn cmd_reset_query_pool(
        &self,
        cmdb: NullHandle,
        pool: NullHandle,
        first_query: u32,
        query_count: u32,
    ) {
        self.record(
            cmdb,
            NullCommand::ResetQueryPool {
                pool,
                first_query,
                query_count,
            },
        );
    }

    unsafe fn cmd_begin_query(&self, cmdb: NullHandle, pool: NullHandle, query: u32) {
        self.record(cmdb, NullCommand::BeginQuery { pool, query });
    }

    unsafe fn cmd_end_query(&self, cmdb: NullHandle, pool: NullHandle, query: u32) {
        self.record(cmdb, NullCommand::EndQuery { pool, query });
    }

    unsafe fn cmd_write_timestamp(&self, cmdb: NullHandle, pool: NullHandle, query: u32) {
        self.record(cmdb, NullCommand::WriteTimestamp { pool, query });
    }

    unsafe fn cmd_copy_query_pool_results(
        &self,
        cmdb: NullHandle,
        pool: NullHandle,
        first_query: u32,
        query_count: u32,
        dst_buffer: NullHandle,
        dst_offset: DeviceSize,
        _stride: DeviceSize,
    ) {
        self.record(
            cmdb,
            NullCommand::CopyQueryPoolResults {
                pool,
                first_query,
                query_count,
                dst_buffer,
                dst_offset,
            },
        );
    }

    unsafe fn cmd_execute_commands(&self, cmdb: NullHandle, command_buffers: &[NullHandle]) {
        self.record(
            cmdb,
            NullCommand::ExecuteCommands {
                command_buffers: command_buffers.to_vec(),
            },
        );
    }

    unsafe fn cmd_fill_buffer(
        &self,
        cmdb: NullHandle,
        buffer: NullHandle,
        offset: DeviceSize,
        size: DeviceSize,
        data: u32,
    ) {
        self.record(
            cmdb,
            NullCommand::FillBuffer {
                buffer,
                offset,
                size,
                data,
            },
        );
    }

    unsafe fn cmd_copy_buffer(
        &self,
        cmdb: NullHandle,
        src: NullHandle,
        dst: NullHandle,
        regions: &[BufferCopy],
    ) {
        self.record(
            cmdb,
            NullCommand::CopyBuffer {
                src,
                dst,
                regions: regions.to_vec(),
            },
        );
    }

    unsafe fn cmd_copy_buffer_to_image(
        &self,
        cmdb: NullHandle,
        src: NullHandle,
        dst: NullHandle,
        dst_layout: ImageLayout,
        regions: &[BufferImageCopy],
    ) {
        self.record(
            cmdb,
            NullCommand::CopyBufferToImage {
                src,
                dst,
                dst_layout,
                regions: regions.to_vec(),
            },
        );
    }

    unsafe fn cmd_blit_image(
        &self,
        cmdb: NullHandle,
        src: NullHandle,
        src_layout: ImageLayout,
        dst: NullHandle,
        dst_layout: ImageLayout,
        regions: &[ImageBlit],
    ) {
        self.record(
            cmdb,
            NullCommand::BlitImage {
                src,
                src_layout,
                dst,
                dst_layout,
                regions: regions.to_vec(),
            },
        );
    }

    unsafe fn cmd_clear_color_image(
        &self,
        cmdb: NullHandle,
        image: NullHandle,
        layout: ImageLayout,
        color: &ClearColorValue,
        range: &ImageSubresourceRange,
    ) {
        self.record(
            cmdb,
            NullCommand::ClearColorImage {
                image,
                layout,
                color: *color,
                range: *range,
            },
        );
    }

    unsafe fn cmd_clear_depth_stencil_image(
        &self,
        cmdb: NullHandle,
        image: NullHandle,
        layout: ImageLayout,
        depth: f32,
        stencil: u32,
        range: &ImageSubresourceRange,
    ) {
        self.record(
            cmdb,
            NullCommand::ClearDepthStencilImage {
                image,
                layout,
                depth,
                stencil,
                range: *range,
            },
        );
    }

    unsafe fn cmd_build_acceleration_structure(
        &self,
        cmdb: NullHandle,
        acceleration_structure: &NullHandle,
        scratch_address: DeviceSize,
    ) {
        self.record(
            cmdb,
            NullCommand::BuildAccelerationStructure {
                acceleration_structure: *acceleration_structure,
                scratch_address,
            },
        );
    }
}

impl NullBackend {
    fn create_pipeline(&self) -> Result<NullHandle, NativeError> {
        let mut state = self.state.lock();

        if std::mem::take(&mut state.fail_next_pipeline) {
            return Err(NativeError::OutOfDeviceMemory);
        }

        let pipeline = NullHandle::new();
        state.pipelines.insert(pipeline);
        state.created_pipelines += 1;

        Ok(pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::{NullBackend, NullHandle};
    use crate::{backend::Backend, command_buffer::QueueType, NativeError};
    use std::{sync::Arc, thread, time::Duration};

    #[test]
    fn handles_are_unique() {
        let a = NullHandle::new();
        let b = NullHandle::new();
        assert_ne!(a, b);
    }

    #[test]
    fn compute_queue_is_optional() {
        assert_eq!(
            NullBackend::new().queue_family_index(QueueType::Compute),
            Some(1),
        );
        assert_eq!(
            NullBackend::without_compute_queue().queue_family_index(QueueType::Compute),
            None,
        );
    }

    #[test]
    fn fence_signaled_from_other_thread() {
        let backend = Arc::new(NullBackend::new());
        let fence = backend.create_fence().unwrap();

        let signaler = {
            let backend = backend.clone();
            thread::spawn(move || backend.signal_fence(fence))
        };

        assert!(unsafe { backend.wait_fence(fence, Duration::from_secs(10)) }.unwrap());
        signaler.join().unwrap();
    }

    #[test]
    fn descriptor_pool_capacity() {
        let backend = NullBackend::new();
        let pool = backend.create_descriptor_pool(1, &[]).unwrap();
        let layout = NullHandle::new();

        assert!(unsafe { backend.allocate_descriptor_set(pool, layout) }.is_ok());
        assert_eq!(
            unsafe { backend.allocate_descriptor_set(pool, layout) },
            Err(NativeError::OutOfPoolMemory),
        );
        assert_eq!(backend.allocated_descriptor_set_count(), 1);
    }
}

// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! The seam between the recording logic and the native graphics API.
//!
//! A [`Backend`] exposes the native objects as associated types and the native calls as methods.
//! The recording logic is generic over it, so calls are statically dispatched.
//!
//! Two implementations are provided:
//!
//! - [`VulkanBackend`](vulkan::VulkanBackend) records into real Vulkan command buffers.
//! - [`NullBackend`](null::NullBackend) hands out fake handles and logs every call.
//!
//! # Safety
//!
//! Methods that take native handles are `unsafe`: the caller must pass handles that were created
//! by the same backend and that are still alive, and must respect the external synchronization
//! rules of the native API. Command buffer methods must only be called while the command buffer
//! is recording.

use crate::{
    command_buffer::QueueType,
    descriptor_set::DescriptorType,
    macros::gr_enum,
    pipeline::{FaceSelection, GraphicsPipelineDesc},
    shader::{ShaderStageDesc, ShaderStages},
    sync::{DependencyInfo, ImageAspects, ImageLayout, ImageSubresourceRange},
    DeviceSize, NativeError,
};
use std::{fmt::Debug, hash::Hash, time::Duration};

pub mod null;
pub mod vulkan;

/// Requirements of every native handle type.
pub trait NativeHandle: Copy + Eq + Hash + Send + Sync + Debug + 'static {}

impl<T> NativeHandle for T where T: Copy + Eq + Hash + Send + Sync + Debug + 'static {}

/// The native graphics API.
pub trait Backend: Sized + Send + Sync + 'static {
    type CommandPool: NativeHandle;
    type CommandBuffer: NativeHandle;
    type Fence: NativeHandle;
    type Pipeline: NativeHandle;
    type PipelineLayout: NativeHandle;
    type ShaderModule: NativeHandle;
    type DescriptorSetLayout: NativeHandle;
    type DescriptorPool: NativeHandle;
    type DescriptorSet: NativeHandle;
    type Buffer: NativeHandle;
    type Image: NativeHandle;
    type ImageView: NativeHandle;
    type Sampler: NativeHandle;
    type QueryPool: NativeHandle;
    type RenderPass: NativeHandle;
    type Framebuffer: NativeHandle;
    /// Also carries whatever the backend needs to build it.
    type AccelerationStructure: Send + Sync + Debug + 'static;

    /// Returns the queue family that serves the given kind of queue, or `None` if there is no
    /// dedicated queue of that kind.
    fn queue_family_index(&self, queue: QueueType) -> Option<u32>;

    /// Blocks until the device is idle.
    fn wait_idle(&self) -> Result<(), NativeError>;

    fn create_command_pool(&self, queue_family_index: u32)
        -> Result<Self::CommandPool, NativeError>;

    unsafe fn destroy_command_pool(&self, pool: Self::CommandPool);

    unsafe fn allocate_command_buffer(
        &self,
        pool: Self::CommandPool,
        level: CommandBufferLevel,
    ) -> Result<Self::CommandBuffer, NativeError>;

    unsafe fn free_command_buffer(&self, pool: Self::CommandPool, cmdb: Self::CommandBuffer);

    unsafe fn reset_command_buffer(&self, cmdb: Self::CommandBuffer) -> Result<(), NativeError>;

    unsafe fn begin_command_buffer(
        &self,
        cmdb: Self::CommandBuffer,
        info: &CommandBufferBeginInfo<Self>,
    ) -> Result<(), NativeError>;

    unsafe fn end_command_buffer(&self, cmdb: Self::CommandBuffer) -> Result<(), NativeError>;

    unsafe fn queue_submit(
        &self,
        queue_family_index: u32,
        command_buffers: &[Self::CommandBuffer],
        fence: Self::Fence,
    ) -> Result<(), NativeError>;

    fn create_fence(&self) -> Result<Self::Fence, NativeError>;

    unsafe fn destroy_fence(&self, fence: Self::Fence);

    /// Returns whether the fence is signaled, without blocking.
    unsafe fn fence_status(&self, fence: Self::Fence) -> Result<bool, NativeError>;

    /// Blocks until the fence is signaled or `timeout` elapsed. Returns `false` on timeout.
    unsafe fn wait_fence(&self, fence: Self::Fence, timeout: Duration)
        -> Result<bool, NativeError>;

    unsafe fn create_graphics_pipeline(
        &self,
        desc: &GraphicsPipelineDesc<Self>,
    ) -> Result<Self::Pipeline, NativeError>;

    unsafe fn create_compute_pipeline(
        &self,
        stage: &ShaderStageDesc<Self>,
        layout: Self::PipelineLayout,
    ) -> Result<Self::Pipeline, NativeError>;

    unsafe fn destroy_pipeline(&self, pipeline: Self::Pipeline);

    fn create_descriptor_pool(
        &self,
        max_sets: u32,
        pool_sizes: &[DescriptorPoolSize],
    ) -> Result<Self::DescriptorPool, NativeError>;

    unsafe fn destroy_descriptor_pool(&self, pool: Self::DescriptorPool);

    /// Returns [`NativeError::OutOfPoolMemory`] or [`NativeError::FragmentedPool`] when the pool
    /// is full.
    unsafe fn allocate_descriptor_set(
        &self,
        pool: Self::DescriptorPool,
        layout: Self::DescriptorSetLayout,
    ) -> Result<Self::DescriptorSet, NativeError>;

    unsafe fn update_descriptor_set(
        &self,
        set: Self::DescriptorSet,
        writes: &[DescriptorWrite<'_, Self>],
    );

    unsafe fn cmd_bind_pipeline(
        &self,
        cmdb: Self::CommandBuffer,
        bind_point: PipelineBindPoint,
        pipeline: Self::Pipeline,
    );

    unsafe fn cmd_bind_descriptor_sets(
        &self,
        cmdb: Self::CommandBuffer,
        bind_point: PipelineBindPoint,
        layout: Self::PipelineLayout,
        first_set: u32,
        sets: &[Self::DescriptorSet],
    );

    unsafe fn cmd_bind_vertex_buffers(
        &self,
        cmdb: Self::CommandBuffer,
        first_binding: u32,
        buffers: &[Self::Buffer],
        offsets: &[DeviceSize],
    );

    unsafe fn cmd_bind_index_buffer(
        &self,
        cmdb: Self::CommandBuffer,
        buffer: Self::Buffer,
        offset: DeviceSize,
        index_type: IndexType,
    );

    unsafe fn cmd_set_viewport(&self, cmdb: Self::CommandBuffer, viewport: &Viewport);

    unsafe fn cmd_set_scissor(&self, cmdb: Self::CommandBuffer, scissor: &Rect2D);

    unsafe fn cmd_set_stencil_compare_mask(
        &self,
        cmdb: Self::CommandBuffer,
        faces: FaceSelection,
        mask: u32,
    );

    unsafe fn cmd_set_stencil_write_mask(
        &self,
        cmdb: Self::CommandBuffer,
        faces: FaceSelection,
        mask: u32,
    );

    unsafe fn cmd_set_stencil_reference(
        &self,
        cmdb: Self::CommandBuffer,
        faces: FaceSelection,
        reference: u32,
    );

    unsafe fn cmd_set_line_width(&self, cmdb: Self::CommandBuffer, width: f32);

    unsafe fn cmd_push_constants(
        &self,
        cmdb: Self::CommandBuffer,
        layout: Self::PipelineLayout,
        stages: ShaderStages,
        offset: u32,
        data: &[u8],
    );

    unsafe fn cmd_begin_render_pass(
        &self,
        cmdb: Self::CommandBuffer,
        info: &RenderPassBeginInfo<'_, Self>,
    );

    unsafe fn cmd_end_render_pass(&self, cmdb: Self::CommandBuffer);

    unsafe fn cmd_draw(
        &self,
        cmdb: Self::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    );

    unsafe fn cmd_draw_indexed(
        &self,
        cmdb: Self::CommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    );

    unsafe fn cmd_draw_indirect(
        &self,
        cmdb: Self::CommandBuffer,
        buffer: Self::Buffer,
        offset: DeviceSize,
        draw_count: u32,
        stride: u32,
    );

    unsafe fn cmd_draw_indexed_indirect(
        &self,
        cmdb: Self::CommandBuffer,
        buffer: Self::Buffer,
        offset: DeviceSize,
        draw_count: u32,
        stride: u32,
    );

    unsafe fn cmd_dispatch(
        &self,
        cmdb: Self::CommandBuffer,
        group_count_x: u32,
        group_count_y: u32,
        group_count_z: u32,
    );

    unsafe fn cmd_trace_rays(
        &self,
        cmdb: Self::CommandBuffer,
        tables: &ShaderBindingTables,
        width: u32,
        height: u32,
        depth: u32,
    );

    unsafe fn cmd_pipeline_barrier(
        &self,
        cmdb: Self::CommandBuffer,
        dependency_info: &DependencyInfo<'_, Self>,
    );

    unsafe fn cmd_reset_query_pool(
        &self,
        cmdb: Self::CommandBuffer,
        pool: Self::QueryPool,
        first_query: u32,
        query_count: u32,
    );

    unsafe fn cmd_begin_query(&self, cmdb: Self::CommandBuffer, pool: Self::QueryPool, query: u32);

    unsafe fn cmd_end_query(&self, cmdb: Self::CommandBuffer, pool: Self::QueryPool, query: u32);

    unsafe fn cmd_write_timestamp(
        &self,
        cmdb: Self::CommandBuffer,
        pool: Self::QueryPool,
        query: u32,
    );

    /// Copies 32-bit query results into a buffer.
    unsafe fn cmd_copy_query_pool_results(
        &self,
        cmdb: Self::CommandBuffer,
        pool: Self::QueryPool,
        first_query: u32,
        query_count: u32,
        dst_buffer: Self::Buffer,
        dst_offset: DeviceSize,
        stride: DeviceSize,
    );

    unsafe fn cmd_execute_commands(
        &self,
        cmdb: Self::CommandBuffer,
        command_buffers: &[Self::CommandBuffer],
    );

    unsafe fn cmd_fill_buffer(
        &self,
        cmdb: Self::CommandBuffer,
        buffer: Self::Buffer,
        offset: DeviceSize,
        size: DeviceSize,
        data: u32,
    );

    unsafe fn cmd_copy_buffer(
        &self,
        cmdb: Self::CommandBuffer,
        src: Self::Buffer,
        dst: Self::Buffer,
        regions: &[BufferCopy],
    );

    unsafe fn cmd_copy_buffer_to_image(
        &self,
        cmdb: Self::CommandBuffer,
        src: Self::Buffer,
        dst: Self::Image,
        dst_layout: ImageLayout,
        regions: &[BufferImageCopy],
    );

    /// Blits with linear filtering.
    unsafe fn cmd_blit_image(
        &self,
        cmdb: Self::CommandBuffer,
        src: Self::Image,
        src_layout: ImageLayout,
        dst: Self::Image,
        dst_layout: ImageLayout,
        regions: &[ImageBlit],
    );

    unsafe fn cmd_clear_color_image(
        &self,
        cmdb: Self::CommandBuffer,
        image: Self::Image,
        layout: ImageLayout,
        color: &ClearColorValue,
        range: &ImageSubresourceRange,
    );

    unsafe fn cmd_clear_depth_stencil_image(
        &self,
        cmdb: Self::CommandBuffer,
        image: Self::Image,
        layout: ImageLayout,
        depth: f32,
        stencil: u32,
        range: &ImageSubresourceRange,
    );

    unsafe fn cmd_build_acceleration_structure(
        &self,
        cmdb: Self::CommandBuffer,
        acceleration_structure: &Self::AccelerationStructure,
        scratch_address: DeviceSize,
    );
}

gr_enum! {
    /// Whether a command buffer can be submitted to a queue or executed by another command buffer.
    CommandBufferLevel;

    Primary,
    Secondary,
}

gr_enum! {
    /// The pipeline kind a pipeline or descriptor set is bound to.
    PipelineBindPoint;

    Graphics,
    Compute,
    RayTracing,
}

gr_enum! {
    /// The type of the indices of an index buffer.
    IndexType
    impl {
        /// Returns the size of one index in bytes.
        pub const fn size(self) -> DeviceSize {
            match self {
                IndexType::U16 => 2,
                IndexType::U32 => 4,
            }
        }
    }
    ;

    U16,
    U32,
}

gr_enum! {
    /// Where the commands of a render pass come from.
    SubpassContents;

    Inline,
    SecondaryCommandBuffers,
}

/// Parameters of [`Backend::begin_command_buffer`].
pub struct CommandBufferBeginInfo<B: Backend> {
    /// Secondary command buffers inherit the render pass and framebuffer they execute in.
    pub inheritance: Option<CommandBufferInheritance<B>>,
}

pub struct CommandBufferInheritance<B: Backend> {
    pub render_pass: B::RenderPass,
    pub framebuffer: B::Framebuffer,
}

/// A viewport transformation. `height` may be negative to flip the Y axis.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rect2D {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// The value a color texel is cleared to.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ClearColorValue {
    Float([f32; 4]),
    Int([i32; 4]),
    Uint([u32; 4]),
}

/// The value an attachment is cleared to at the start of a render pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ClearValue {
    Color(ClearColorValue),
    DepthStencil { depth: f32, stencil: u32 },
}

impl Default for ClearValue {
    #[inline]
    fn default() -> Self {
        ClearValue::Color(ClearColorValue::Float([0.0; 4]))
    }
}

/// Parameters of [`Backend::cmd_begin_render_pass`].
pub struct RenderPassBeginInfo<'a, B: Backend> {
    pub render_pass: B::RenderPass,
    pub framebuffer: B::Framebuffer,
    pub render_area: Rect2D,
    pub clear_values: &'a [ClearValue],
    pub contents: SubpassContents,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DescriptorPoolSize {
    pub ty: DescriptorType,
    pub descriptor_count: u32,
}

/// One element of a descriptor set update.
pub struct DescriptorWrite<'a, B: Backend> {
    pub binding: u32,
    pub array_element: u32,
    pub resource: DescriptorWriteResource<'a, B>,
}

pub enum DescriptorWriteResource<'a, B: Backend> {
    CombinedImageSampler {
        view: B::ImageView,
        layout: ImageLayout,
        sampler: B::Sampler,
    },
    SampledImage {
        view: B::ImageView,
        layout: ImageLayout,
    },
    Sampler(B::Sampler),
    UniformBuffer {
        buffer: B::Buffer,
        offset: DeviceSize,
        range: DeviceSize,
    },
    StorageBuffer {
        buffer: B::Buffer,
        offset: DeviceSize,
        range: DeviceSize,
    },
    StorageImage {
        view: B::ImageView,
    },
    AccelerationStructure(&'a B::AccelerationStructure),
}

impl<B: Backend> DescriptorWriteResource<'_, B> {
    /// Returns the descriptor type this resource is written as.
    pub fn descriptor_type(&self) -> DescriptorType {
        match self {
            Self::CombinedImageSampler { .. } => DescriptorType::CombinedTextureSampler,
            Self::SampledImage { .. } => DescriptorType::Texture,
            Self::Sampler(_) => DescriptorType::Sampler,
            Self::UniformBuffer { .. } => DescriptorType::UniformBuffer,
            Self::StorageBuffer { .. } => DescriptorType::StorageBuffer,
            Self::StorageImage { .. } => DescriptorType::Image,
            Self::AccelerationStructure(_) => DescriptorType::AccelerationStructure,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferCopy {
    pub src_offset: DeviceSize,
    pub dst_offset: DeviceSize,
    pub size: DeviceSize,
}

/// One mip level and a range of array layers of a texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ImageSubresourceLayers {
    pub aspects: ImageAspects,
    pub mip_level: u32,
    pub base_array_layer: u32,
    pub layer_count: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferImageCopy {
    pub buffer_offset: DeviceSize,
    pub image_subresource: ImageSubresourceLayers,
    pub image_offset: [i32; 3],
    pub image_extent: [u32; 3],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageBlit {
    pub src_subresource: ImageSubresourceLayers,
    pub src_offsets: [[i32; 3]; 2],
    pub dst_subresource: ImageSubresourceLayers,
    pub dst_offsets: [[i32; 3]; 2],
}

/// A region of a shader binding table in device memory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StridedDeviceAddressRegion {
    pub device_address: DeviceSize,
    pub stride: DeviceSize,
    pub size: DeviceSize,
}

/// The four shader binding tables of a ray tracing dispatch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShaderBindingTables {
    pub raygen: StridedDeviceAddressRegion,
    pub miss: StridedDeviceAddressRegion,
    pub hit: StridedDeviceAddressRegion,
    pub callable: StridedDeviceAddressRegion,
}

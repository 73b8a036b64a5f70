// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Synchronization primitives.
//!
//! The flag types of this module use the same bit values as their Vulkan counterparts.

pub use self::fence::Fence;
use crate::{
    backend::Backend,
    macros::{gr_bitflags, gr_enum},
    DeviceSize,
};

mod fence;

gr_bitflags! {
    /// A set of stages of the device pipeline.
    PipelineStages = u32;

    TOP_OF_PIPE = 0x1,
    DRAW_INDIRECT = 0x2,
    VERTEX_INPUT = 0x4,
    VERTEX_SHADER = 0x8,
    TESSELLATION_CONTROL_SHADER = 0x10,
    TESSELLATION_EVALUATION_SHADER = 0x20,
    GEOMETRY_SHADER = 0x40,
    FRAGMENT_SHADER = 0x80,
    EARLY_FRAGMENT_TESTS = 0x100,
    LATE_FRAGMENT_TESTS = 0x200,
    COLOR_ATTACHMENT_OUTPUT = 0x400,
    COMPUTE_SHADER = 0x800,
    TRANSFER = 0x1000,
    BOTTOM_OF_PIPE = 0x2000,
    HOST = 0x4000,
    ALL_GRAPHICS = 0x8000,
    ALL_COMMANDS = 0x1_0000,
    RAY_TRACING_SHADER = 0x20_0000,
    ACCELERATION_STRUCTURE_BUILD = 0x200_0000,
}

impl PipelineStages {
    /// The shader stages that run before rasterization.
    pub const PRE_RASTERIZATION_SHADERS: Self = Self::VERTEX_SHADER
        .union(Self::TESSELLATION_CONTROL_SHADER)
        .union(Self::TESSELLATION_EVALUATION_SHADER)
        .union(Self::GEOMETRY_SHADER);

    /// The fragment test stages.
    pub const FRAGMENT_TESTS: Self = Self::EARLY_FRAGMENT_TESTS.union(Self::LATE_FRAGMENT_TESTS);
}

gr_bitflags! {
    /// A set of memory access types that are included in a memory dependency.
    AccessFlags = u32;

    INDIRECT_COMMAND_READ = 0x1,
    INDEX_READ = 0x2,
    VERTEX_ATTRIBUTE_READ = 0x4,
    UNIFORM_READ = 0x8,
    INPUT_ATTACHMENT_READ = 0x10,
    SHADER_READ = 0x20,
    SHADER_WRITE = 0x40,
    COLOR_ATTACHMENT_READ = 0x80,
    COLOR_ATTACHMENT_WRITE = 0x100,
    DEPTH_STENCIL_ATTACHMENT_READ = 0x200,
    DEPTH_STENCIL_ATTACHMENT_WRITE = 0x400,
    TRANSFER_READ = 0x800,
    TRANSFER_WRITE = 0x1000,
    HOST_READ = 0x2000,
    HOST_WRITE = 0x4000,
    MEMORY_READ = 0x8000,
    MEMORY_WRITE = 0x1_0000,
    ACCELERATION_STRUCTURE_READ = 0x20_0000,
    ACCELERATION_STRUCTURE_WRITE = 0x40_0000,
}

gr_bitflags! {
    /// The aspects of a texture that a view or a barrier covers.
    ImageAspects = u32;

    COLOR = 0x1,
    DEPTH = 0x2,
    STENCIL = 0x4,
}

gr_enum! {
    /// The layout of the texels of a texture in memory.
    ImageLayout;

    Undefined,
    General,
    ColorAttachmentOptimal,
    DepthStencilAttachmentOptimal,
    DepthStencilReadOnlyOptimal,
    ShaderReadOnlyOptimal,
    TransferSrcOptimal,
    TransferDstOptimal,
    PresentSrc,
}

/// A range of mip levels and array layers of a texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ImageSubresourceRange {
    pub aspects: ImageAspects,
    pub base_mip_level: u32,
    pub level_count: u32,
    pub base_array_layer: u32,
    pub layer_count: u32,
}

/// A global memory dependency.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryBarrier {
    pub src_access: AccessFlags,
    pub dst_access: AccessFlags,
}

/// A memory dependency on a range of a buffer.
pub struct BufferMemoryBarrier<B: Backend> {
    pub src_access: AccessFlags,
    pub dst_access: AccessFlags,
    pub buffer: B::Buffer,
    pub offset: DeviceSize,
    pub size: DeviceSize,
}

impl<B: Backend> Clone for BufferMemoryBarrier<B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B: Backend> Copy for BufferMemoryBarrier<B> {}

impl<B: Backend> std::fmt::Debug for BufferMemoryBarrier<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferMemoryBarrier")
            .field("src_access", &self.src_access)
            .field("dst_access", &self.dst_access)
            .field("buffer", &self.buffer)
            .field("offset", &self.offset)
            .field("size", &self.size)
            .finish()
    }
}

/// A memory dependency and layout transition on a subresource range of a texture.
pub struct ImageMemoryBarrier<B: Backend> {
    pub src_access: AccessFlags,
    pub dst_access: AccessFlags,
    pub old_layout: ImageLayout,
    pub new_layout: ImageLayout,
    pub image: B::Image,
    pub subresource_range: ImageSubresourceRange,
}

impl<B: Backend> Clone for ImageMemoryBarrier<B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B: Backend> Copy for ImageMemoryBarrier<B> {}

impl<B: Backend> std::fmt::Debug for ImageMemoryBarrier<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageMemoryBarrier")
            .field("src_access", &self.src_access)
            .field("dst_access", &self.dst_access)
            .field("old_layout", &self.old_layout)
            .field("new_layout", &self.new_layout)
            .field("image", &self.image)
            .field("subresource_range", &self.subresource_range)
            .finish()
    }
}

/// Everything that goes into one native pipeline barrier command.
pub struct DependencyInfo<'a, B: Backend> {
    pub src_stages: PipelineStages,
    pub dst_stages: PipelineStages,
    pub memory_barriers: &'a [MemoryBarrier],
    pub buffer_memory_barriers: &'a [BufferMemoryBarrier<B>],
    pub image_memory_barriers: &'a [ImageMemoryBarrier<B>],
}

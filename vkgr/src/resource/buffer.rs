// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

use super::{BarrierScope, GrObject, GrObjectType};
use crate::{
    backend::Backend,
    macros::{gr_bitflags, impl_id_counter},
    sync::{AccessFlags, PipelineStages},
    DeviceSize, NonExhaustive,
};
use std::{fmt, num::NonZero, sync::Arc};

gr_bitflags! {
    /// How a buffer is used by the device.
    BufferUsage = u32;

    UNIFORM_GEOMETRY = 1 << 0,
    UNIFORM_FRAGMENT = 1 << 1,
    UNIFORM_COMPUTE = 1 << 2,
    UNIFORM_TRACE_RAYS = 1 << 3,
    STORAGE_GEOMETRY_READ = 1 << 4,
    STORAGE_GEOMETRY_WRITE = 1 << 5,
    STORAGE_FRAGMENT_READ = 1 << 6,
    STORAGE_FRAGMENT_WRITE = 1 << 7,
    STORAGE_COMPUTE_READ = 1 << 8,
    STORAGE_COMPUTE_WRITE = 1 << 9,
    STORAGE_TRACE_RAYS_READ = 1 << 10,
    STORAGE_TRACE_RAYS_WRITE = 1 << 11,
    INDEX = 1 << 12,
    VERTEX = 1 << 13,
    INDIRECT_DRAW = 1 << 14,
    INDIRECT_COMPUTE = 1 << 15,
    INDIRECT_TRACE_RAYS = 1 << 16,
    TRANSFER_SOURCE = 1 << 17,
    TRANSFER_DESTINATION = 1 << 18,
    ACCELERATION_STRUCTURE_BUILD = 1 << 19,
    SHADER_BINDING_TABLE = 1 << 20,
}

impl BufferUsage {
    pub const ALL_UNIFORM: Self = Self::UNIFORM_GEOMETRY
        .union(Self::UNIFORM_FRAGMENT)
        .union(Self::UNIFORM_COMPUTE)
        .union(Self::UNIFORM_TRACE_RAYS);

    pub const ALL_STORAGE: Self = Self::STORAGE_GEOMETRY_READ
        .union(Self::STORAGE_GEOMETRY_WRITE)
        .union(Self::STORAGE_FRAGMENT_READ)
        .union(Self::STORAGE_FRAGMENT_WRITE)
        .union(Self::STORAGE_COMPUTE_READ)
        .union(Self::STORAGE_COMPUTE_WRITE)
        .union(Self::STORAGE_TRACE_RAYS_READ)
        .union(Self::STORAGE_TRACE_RAYS_WRITE);

    pub const ALL_INDIRECT: Self = Self::INDIRECT_DRAW
        .union(Self::INDIRECT_COMPUTE)
        .union(Self::INDIRECT_TRACE_RAYS);

    /// Returns the stages and accesses covered by `self`.
    pub(crate) fn barrier_scope(self) -> BarrierScope {
        let mut scope = BarrierScope::default();

        let table = [
            (
                Self::UNIFORM_GEOMETRY,
                PipelineStages::PRE_RASTERIZATION_SHADERS,
                AccessFlags::UNIFORM_READ,
            ),
            (
                Self::UNIFORM_FRAGMENT,
                PipelineStages::FRAGMENT_SHADER,
                AccessFlags::UNIFORM_READ,
            ),
            (
                Self::UNIFORM_COMPUTE,
                PipelineStages::COMPUTE_SHADER,
                AccessFlags::UNIFORM_READ,
            ),
            (
                Self::UNIFORM_TRACE_RAYS,
                PipelineStages::RAY_TRACING_SHADER,
                AccessFlags::UNIFORM_READ,
            ),
            (
                Self::STORAGE_GEOMETRY_READ,
                PipelineStages::PRE_RASTERIZATION_SHADERS,
                AccessFlags::SHADER_READ,
            ),
            (
                Self::STORAGE_GEOMETRY_WRITE,
                PipelineStages::PRE_RASTERIZATION_SHADERS,
                AccessFlags::SHADER_WRITE,
            ),
            (
                Self::STORAGE_FRAGMENT_READ,
                PipelineStages::FRAGMENT_SHADER,
                AccessFlags::SHADER_READ,
            ),
            (
                Self::STORAGE_FRAGMENT_WRITE,
                PipelineStages::FRAGMENT_SHADER,
                AccessFlags::SHADER_WRITE,
            ),
            (
                Self::STORAGE_COMPUTE_READ,
                PipelineStages::COMPUTE_SHADER,
                AccessFlags::SHADER_READ,
            ),
            (
                Self::STORAGE_COMPUTE_WRITE,
                PipelineStages::COMPUTE_SHADER,
                AccessFlags::SHADER_WRITE,
            ),
            (
                Self::STORAGE_TRACE_RAYS_READ,
                PipelineStages::RAY_TRACING_SHADER,
                AccessFlags::SHADER_READ,
            ),
            (
                Self::STORAGE_TRACE_RAYS_WRITE,
                PipelineStages::RAY_TRACING_SHADER,
                AccessFlags::SHADER_WRITE,
            ),
            (
                Self::INDEX,
                PipelineStages::VERTEX_INPUT,
                AccessFlags::INDEX_READ,
            ),
            (
                Self::VERTEX,
                PipelineStages::VERTEX_INPUT,
                AccessFlags::VERTEX_ATTRIBUTE_READ,
            ),
            (
                Self::ALL_INDIRECT,
                PipelineStages::DRAW_INDIRECT,
                AccessFlags::INDIRECT_COMMAND_READ,
            ),
            (
                Self::TRANSFER_SOURCE,
                PipelineStages::TRANSFER,
                AccessFlags::TRANSFER_READ,
            ),
            (
                Self::TRANSFER_DESTINATION,
                PipelineStages::TRANSFER,
                AccessFlags::TRANSFER_WRITE,
            ),
            (
                Self::ACCELERATION_STRUCTURE_BUILD,
                PipelineStages::ACCELERATION_STRUCTURE_BUILD,
                AccessFlags::SHADER_READ,
            ),
            (
                Self::SHADER_BINDING_TABLE,
                PipelineStages::RAY_TRACING_SHADER,
                AccessFlags::SHADER_READ,
            ),
        ];

        for (usage, stages, access) in table {
            if self.intersects(usage) {
                scope.add(stages, access);
            }
        }

        scope
    }
}

/// Parameters to wrap a native buffer.
#[derive(Clone, Debug)]
pub struct BufferCreateInfo {
    /// The default value is empty.
    pub name: String,

    /// The default value is `0`, which must be overridden.
    pub size: DeviceSize,

    /// Every way the buffer may be used.
    ///
    /// The default value is empty, which must be overridden.
    pub usage: BufferUsage,

    /// Device address of the start of the buffer. Required for shader binding tables and
    /// acceleration structure scratch memory.
    ///
    /// The default value is `None`.
    pub device_address: Option<DeviceSize>,

    pub _ne: NonExhaustive,
}

impl Default for BufferCreateInfo {
    #[inline]
    fn default() -> Self {
        Self {
            name: String::new(),
            size: 0,
            usage: BufferUsage::empty(),
            device_address: None,
            _ne: NonExhaustive(()),
        }
    }
}

/// A native buffer and its metadata.
pub struct Buffer<B: Backend> {
    id: NonZero<u64>,
    handle: B::Buffer,
    name: String,
    size: DeviceSize,
    usage: BufferUsage,
    device_address: Option<DeviceSize>,
}

impl<B: Backend> Buffer<B> {
    /// Wraps a native buffer.
    ///
    /// # Panics
    ///
    /// - Panics if `create_info.size` is zero or `create_info.usage` is empty.
    pub fn from_handle(handle: B::Buffer, create_info: BufferCreateInfo) -> Arc<Self> {
        let BufferCreateInfo {
            name,
            size,
            usage,
            device_address,
            _ne: _,
        } = create_info;

        assert!(size > 0);
        assert!(!usage.is_empty());

        Arc::new(Buffer {
            id: Self::next_id(),
            handle,
            name,
            size,
            usage,
            device_address,
        })
    }

    #[inline]
    pub fn handle(&self) -> B::Buffer {
        self.handle
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn size(&self) -> DeviceSize {
        self.size
    }

    #[inline]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    #[inline]
    pub fn device_address(&self) -> Option<DeviceSize> {
        self.device_address
    }

    /// Returns the source and destination scopes of a transition from `before` to `after`.
    pub fn barrier_info(
        &self,
        before: BufferUsage,
        after: BufferUsage,
    ) -> (BarrierScope, BarrierScope) {
        debug_assert!(self.usage.contains(before) && self.usage.contains(after));

        (
            before.barrier_scope().or_top_of_pipe(),
            after.barrier_scope().or_bottom_of_pipe(),
        )
    }
}

impl<B: Backend> fmt::Debug for Buffer<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.id)
            .field("handle", &self.handle)
            .field("name", &self.name)
            .field("size", &self.size)
            .field("usage", &self.usage)
            .finish()
    }
}

impl<B: Backend> GrObject for Buffer<B> {
    fn object_type(&self) -> GrObjectType {
        GrObjectType::Buffer
    }

    fn uuid(&self) -> NonZero<u64> {
        self.id
    }
}

impl_id_counter!(Buffer<B: Backend>);

#[cfg(test)]
mod tests {
    use super::BufferUsage;
    use crate::sync::{AccessFlags, PipelineStages};

    #[test]
    fn transfer_to_vertex() {
        let src = BufferUsage::TRANSFER_DESTINATION.barrier_scope().or_top_of_pipe();
        let dst = BufferUsage::VERTEX.barrier_scope().or_bottom_of_pipe();

        assert_eq!(src.stages, PipelineStages::TRANSFER);
        assert_eq!(src.access, AccessFlags::TRANSFER_WRITE);
        assert_eq!(dst.stages, PipelineStages::VERTEX_INPUT);
        assert_eq!(dst.access, AccessFlags::VERTEX_ATTRIBUTE_READ);
    }

    #[test]
    fn empty_usage_waits_on_nothing() {
        let src = BufferUsage::empty().barrier_scope().or_top_of_pipe();
        assert_eq!(src.stages, PipelineStages::TOP_OF_PIPE);
        assert!(src.access.is_empty());
    }
}

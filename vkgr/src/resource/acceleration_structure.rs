// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

use super::{BarrierScope, Buffer, BufferUsage, GrObject, GrObjectType};
use crate::{
    backend::Backend,
    macros::{gr_bitflags, gr_enum, impl_id_counter},
    sync::{AccessFlags, PipelineStages},
    NonExhaustive,
};
use std::{fmt, num::NonZero, sync::Arc};

gr_enum! {
    /// Whether an acceleration structure holds geometry or instances of other structures.
    AccelerationStructureType;

    BottomLevel,
    TopLevel,
}

gr_bitflags! {
    /// How an acceleration structure is used by the device.
    AccelerationStructureUsage = u32;

    BUILD = 1 << 0,
    /// Referenced by the build of a top level structure.
    ATTACH = 1 << 1,
    GEOMETRY_READ = 1 << 2,
    FRAGMENT_READ = 1 << 3,
    COMPUTE_READ = 1 << 4,
    TRACE_RAYS_READ = 1 << 5,
}

impl AccelerationStructureUsage {
    pub(crate) fn barrier_scope(self) -> BarrierScope {
        let mut scope = BarrierScope::default();

        if self.intersects(Self::BUILD) {
            scope.add(
                PipelineStages::ACCELERATION_STRUCTURE_BUILD,
                AccessFlags::ACCELERATION_STRUCTURE_WRITE,
            );
        }

        if self.intersects(Self::ATTACH) {
            scope.add(
                PipelineStages::ACCELERATION_STRUCTURE_BUILD,
                AccessFlags::ACCELERATION_STRUCTURE_READ,
            );
        }

        let readers = [
            (Self::GEOMETRY_READ, PipelineStages::PRE_RASTERIZATION_SHADERS),
            (Self::FRAGMENT_READ, PipelineStages::FRAGMENT_SHADER),
            (Self::COMPUTE_READ, PipelineStages::COMPUTE_SHADER),
            (Self::TRACE_RAYS_READ, PipelineStages::RAY_TRACING_SHADER),
        ];

        for (usage, stages) in readers {
            if self.intersects(usage) {
                scope.add(stages, AccessFlags::ACCELERATION_STRUCTURE_READ);
            }
        }

        scope
    }
}

/// Parameters to wrap a native acceleration structure.
pub struct AccelerationStructureCreateInfo<B: Backend> {
    /// The default value is empty.
    pub name: String,

    /// The default value is [`AccelerationStructureType::BottomLevel`].
    pub ty: AccelerationStructureType,

    /// Scratch memory used while building. Needs a device address.
    ///
    /// The default value is `None`, which must be overridden.
    pub scratch_buffer: Option<Arc<Buffer<B>>>,

    /// Objects read by the build: vertex and index buffers of a bottom level structure, the
    /// instance buffer and the bottom level structures of a top level one.
    ///
    /// The default value is empty.
    pub build_resources: Vec<Arc<dyn GrObject>>,

    pub _ne: NonExhaustive,
}

impl<B: Backend> Default for AccelerationStructureCreateInfo<B> {
    #[inline]
    fn default() -> Self {
        Self {
            name: String::new(),
            ty: AccelerationStructureType::BottomLevel,
            scratch_buffer: None,
            build_resources: Vec::new(),
            _ne: NonExhaustive(()),
        }
    }
}

/// A native acceleration structure and the objects its build reads.
pub struct AccelerationStructure<B: Backend> {
    id: NonZero<u64>,
    handle: B::AccelerationStructure,
    name: String,
    ty: AccelerationStructureType,
    scratch_buffer: Arc<Buffer<B>>,
    build_resources: Vec<Arc<dyn GrObject>>,
}

impl<B: Backend> AccelerationStructure<B> {
    /// Wraps a native acceleration structure.
    ///
    /// # Panics
    ///
    /// - Panics if there is no scratch buffer, or if it has no device address or lacks the
    ///   [`BufferUsage::ACCELERATION_STRUCTURE_BUILD`] usage.
    pub fn from_handle(
        handle: B::AccelerationStructure,
        create_info: AccelerationStructureCreateInfo<B>,
    ) -> Arc<Self> {
        let AccelerationStructureCreateInfo {
            name,
            ty,
            scratch_buffer,
            build_resources,
            _ne: _,
        } = create_info;

        let scratch_buffer =
            scratch_buffer.expect("an acceleration structure needs a scratch buffer");
        assert!(scratch_buffer.device_address().is_some());
        assert!(scratch_buffer
            .usage()
            .intersects(BufferUsage::ACCELERATION_STRUCTURE_BUILD));

        Arc::new(AccelerationStructure {
            id: Self::next_id(),
            handle,
            name,
            ty,
            scratch_buffer,
            build_resources,
        })
    }

    #[inline]
    pub fn handle(&self) -> &B::AccelerationStructure {
        &self.handle
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn ty(&self) -> AccelerationStructureType {
        self.ty
    }

    #[inline]
    pub fn scratch_buffer(&self) -> &Arc<Buffer<B>> {
        &self.scratch_buffer
    }

    #[inline]
    pub fn build_resources(&self) -> &[Arc<dyn GrObject>] {
        &self.build_resources
    }

    /// Returns the source and destination scopes of a transition from `before` to `after`.
    pub fn barrier_info(
        before: AccelerationStructureUsage,
        after: AccelerationStructureUsage,
    ) -> (BarrierScope, BarrierScope) {
        (
            before.barrier_scope().or_top_of_pipe(),
            after.barrier_scope().or_bottom_of_pipe(),
        )
    }
}

impl<B: Backend> fmt::Debug for AccelerationStructure<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccelerationStructure")
            .field("id", &self.id)
            .field("handle", &self.handle)
            .field("name", &self.name)
            .field("ty", &self.ty)
            .finish_non_exhaustive()
    }
}

impl<B: Backend> GrObject for AccelerationStructure<B> {
    fn object_type(&self) -> GrObjectType {
        GrObjectType::AccelerationStructure
    }

    fn uuid(&self) -> NonZero<u64> {
        self.id
    }
}

impl_id_counter!(AccelerationStructure<B: Backend>);

#[cfg(test)]
mod tests {
    use super::{AccelerationStructure, AccelerationStructureUsage};
    use crate::{
        backend::null::NullBackend,
        sync::{AccessFlags, PipelineStages},
    };

    #[test]
    fn build_then_trace() {
        let (src, dst) = AccelerationStructure::<NullBackend>::barrier_info(
            AccelerationStructureUsage::BUILD,
            AccelerationStructureUsage::TRACE_RAYS_READ,
        );

        assert_eq!(src.stages, PipelineStages::ACCELERATION_STRUCTURE_BUILD);
        assert_eq!(src.access, AccessFlags::ACCELERATION_STRUCTURE_WRITE);
        assert_eq!(dst.stages, PipelineStages::RAY_TRACING_SHADER);
        assert_eq!(dst.access, AccessFlags::ACCELERATION_STRUCTURE_READ);
    }
}

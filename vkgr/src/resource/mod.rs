// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Objects that commands refer to.
//!
//! The native objects are created by the resource subsystem. The types of this module wrap their
//! handles together with the metadata that recording needs (usage, size, format) and give them an
//! identity. Command buffers hold an `Arc` to every object they reference until the GPU is done
//! with them.

pub use self::{
    acceleration_structure::{
        AccelerationStructure, AccelerationStructureCreateInfo, AccelerationStructureType,
        AccelerationStructureUsage,
    },
    buffer::{Buffer, BufferCreateInfo, BufferUsage},
    query::{OcclusionQuery, TimestampQuery},
    texture::{
        Sampler, Texture, TextureCreateInfo, TextureSubresourceInfo, TextureType, TextureUsage,
        TextureView,
    },
};
use crate::{
    macros::gr_enum,
    sync::{AccessFlags, PipelineStages},
};
use std::{any::Any, num::NonZero};

mod acceleration_structure;
mod buffer;
mod query;
mod texture;

gr_enum! {
    /// The type of a [`GrObject`].
    GrObjectType;

    Buffer,
    Texture,
    TextureView,
    Sampler,
    ShaderProgram,
    Framebuffer,
    OcclusionQuery,
    TimestampQuery,
    AccelerationStructure,
    CommandBuffer,
}

/// An object that can be referenced by recorded commands.
pub trait GrObject: Any + Send + Sync {
    fn object_type(&self) -> GrObjectType;

    /// Identity of the object. Two live objects of the same type never share it.
    fn uuid(&self) -> NonZero<u64>;
}

/// Stages and accesses on one side of a barrier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BarrierScope {
    pub stages: PipelineStages,
    pub access: AccessFlags,
}

impl BarrierScope {
    #[inline]
    pub(crate) fn add(&mut self, stages: PipelineStages, access: AccessFlags) {
        self.stages |= stages;
        self.access |= access;
    }

    /// An empty source scope waits for nothing.
    #[inline]
    pub(crate) fn or_top_of_pipe(mut self) -> Self {
        if self.stages.is_empty() {
            self.stages = PipelineStages::TOP_OF_PIPE;
        }

        self
    }

    /// An empty destination scope blocks nothing.
    #[inline]
    pub(crate) fn or_bottom_of_pipe(mut self) -> Self {
        if self.stages.is_empty() {
            self.stages = PipelineStages::BOTTOM_OF_PIPE;
        }

        self
    }
}

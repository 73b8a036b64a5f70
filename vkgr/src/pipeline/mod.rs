// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Pipeline state tracking and the pipeline cache.
//!
//! A command buffer doesn't bind pipelines directly. Every fixed function setter writes into a
//! [`PipelineStateTracker`], which splits the state into groups that are dirty-tracked and hashed
//! separately. Right before a draw the tracker combines the hashes of the groups that matter for
//! the bound program and framebuffer into one 64-bit hash, and the [`PipelineFactory`] maps that
//! hash to a native pipeline, creating it on first use.
//!
//! Only the groups that the current draw can observe take part in the hash:
//!
//! - vertex attributes that the program reads, each together with the binding it sources from,
//! - depth state only if the framebuffer has a depth attachment,
//! - stencil state only if it has a stencil attachment,
//! - blend state only for the color attachments that the program writes.
//!
//! Viewport, scissor, stencil masks and reference, and line width are dynamic state and never
//! part of a pipeline.

pub use self::{
    desc::{
        ColorBlendDesc, DepthStencilDesc, DynamicState, GraphicsPipelineDesc, RasterizationDesc,
        VertexAttributeDesc, VertexBindingDesc,
    },
    factory::{PipelineFactory, PipelineFactoryStats},
    state::{
        BlendFactor, BlendOperation, ColorAttachmentState, ColorComponents, CompareOperation,
        DepthState, FaceSelection, FillMode, FrontFace, InputAssemblerState, PrimitiveTopology,
        RasterizationOrder, RasterizerState, StencilFaceState, StencilOperation, StencilState,
        VertexAttributeState, VertexBindingState, VertexStepRate,
    },
    tracker::PipelineStateTracker,
};

mod desc;
mod factory;
mod state;
mod tracker;

/// Maximum number of vertex attributes, and of vertex buffer bindings.
pub const MAX_VERTEX_ATTRIBUTES: usize = 8;

/// Maximum number of color attachments of a framebuffer.
pub const MAX_COLOR_ATTACHMENTS: usize = 4;

// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! The full description of a graphics pipeline, as handed to the backend.

use super::{
    state::{
        ColorAttachmentState, DepthState, FaceSelection, FillMode, FrontFace,
        InputAssemblerState, RasterizationOrder, StencilState, VertexStepRate,
    },
    MAX_COLOR_ATTACHMENTS, MAX_VERTEX_ATTRIBUTES,
};
use crate::{backend::Backend, format::Format, macros::gr_enum, shader::ShaderStageDesc};
use smallvec::SmallVec;
use std::fmt;

gr_enum! {
    /// State that is set by commands instead of being baked into pipelines.
    DynamicState;

    Viewport,
    Scissor,
    StencilCompareMask,
    StencilWriteMask,
    StencilReference,
    LineWidth,
}

impl DynamicState {
    /// Every graphics pipeline is created with all of these dynamic.
    pub const PIPELINE_DYNAMIC_STATES: [DynamicState; 6] = DynamicState::ALL;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VertexBindingDesc {
    pub binding: u32,
    pub stride: u32,
    pub step_rate: VertexStepRate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VertexAttributeDesc {
    pub location: u32,
    pub binding: u32,
    pub format: Format,
    pub offset: u32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RasterizationDesc {
    pub fill_mode: FillMode,
    pub cull_mode: FaceSelection,
    pub front_face: FrontFace,
    pub rasterization_order: RasterizationOrder,
    pub depth_bias_enable: bool,
    pub depth_bias_constant_factor: f32,
    pub depth_bias_slope_factor: f32,
}

/// Present only if the framebuffer has a depth and/or stencil attachment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DepthStencilDesc {
    /// `None` if the framebuffer has no depth aspect.
    pub depth: Option<DepthState>,
    /// `None` if the framebuffer has no stencil aspect.
    pub stencil: Option<StencilState>,
}

impl DepthStencilDesc {
    #[inline]
    pub fn depth_test_enable(&self) -> bool {
        self.depth.is_some_and(|depth| depth.test_enable())
    }

    #[inline]
    pub fn stencil_test_enable(&self) -> bool {
        self.stencil.is_some_and(|stencil| stencil.test_enable())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColorBlendDesc {
    pub alpha_to_coverage_enable: bool,
    /// One entry per color attachment written, starting at attachment 0.
    pub attachments: SmallVec<[ColorAttachmentState; MAX_COLOR_ATTACHMENTS]>,
}

/// Everything needed to create a native graphics pipeline.
///
/// Multisampling is always off, and there is one viewport and one scissor. The states of
/// [`DynamicState::PIPELINE_DYNAMIC_STATES`] are dynamic.
pub struct GraphicsPipelineDesc<B: Backend> {
    pub stages: SmallVec<[ShaderStageDesc<B>; 5]>,
    pub layout: B::PipelineLayout,
    pub render_pass: B::RenderPass,
    /// One entry per binding referenced by an attribute.
    pub vertex_bindings: SmallVec<[VertexBindingDesc; MAX_VERTEX_ATTRIBUTES]>,
    pub vertex_attributes: SmallVec<[VertexAttributeDesc; MAX_VERTEX_ATTRIBUTES]>,
    pub input_assembly: InputAssemblerState,
    pub rasterization: RasterizationDesc,
    pub depth_stencil: Option<DepthStencilDesc>,
    /// `None` if the program writes no color attachment.
    pub color_blend: Option<ColorBlendDesc>,
}

impl<B: Backend> Clone for GraphicsPipelineDesc<B> {
    fn clone(&self) -> Self {
        Self {
            stages: self.stages.clone(),
            layout: self.layout,
            render_pass: self.render_pass,
            vertex_bindings: self.vertex_bindings.clone(),
            vertex_attributes: self.vertex_attributes.clone(),
            input_assembly: self.input_assembly,
            rasterization: self.rasterization,
            depth_stencil: self.depth_stencil,
            color_blend: self.color_blend.clone(),
        }
    }
}

impl<B: Backend> PartialEq for GraphicsPipelineDesc<B> {
    fn eq(&self, other: &Self) -> bool {
        self.stages == other.stages
            && self.layout == other.layout
            && self.render_pass == other.render_pass
            && self.vertex_bindings == other.vertex_bindings
            && self.vertex_attributes == other.vertex_attributes
            && self.input_assembly == other.input_assembly
            && self.rasterization == other.rasterization
            && self.depth_stencil == other.depth_stencil
            && self.color_blend == other.color_blend
    }
}

impl<B: Backend> fmt::Debug for GraphicsPipelineDesc<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphicsPipelineDesc")
            .field("stages", &self.stages)
            .field("layout", &self.layout)
            .field("render_pass", &self.render_pass)
            .field("vertex_bindings", &self.vertex_bindings)
            .field("vertex_attributes", &self.vertex_attributes)
            .field("input_assembly", &self.input_assembly)
            .field("rasterization", &self.rasterization)
            .field("depth_stencil", &self.depth_stencil)
            .field("color_blend", &self.color_blend)
            .finish()
    }
}

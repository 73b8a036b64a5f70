// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Fixed function state of a graphics pipeline, split into the groups that are hashed separately.

use crate::{
    format::Format,
    macros::{gr_bitflags, gr_enum},
};
use std::hash::{Hash, Hasher};

gr_enum! {
    /// How vertices are assembled into primitives.
    PrimitiveTopology;

    PointList,
    LineList,
    LineStrip,
    TriangleList,
    TriangleStrip,
    PatchList,
}

gr_enum! {
    /// How polygons are rasterized.
    FillMode;

    Points,
    Wireframe,
    Solid,
}

gr_bitflags! {
    /// Selects the front and/or back faces of polygons. Used for culling and for stencil state.
    FaceSelection = u32;

    FRONT = 0x1,
    BACK = 0x2,
}

impl FaceSelection {
    pub const FRONT_AND_BACK: Self = Self::FRONT.union(Self::BACK);
}

gr_enum! {
    /// Winding order that makes a polygon front facing.
    FrontFace;

    CounterClockwise,
    Clockwise,
}

gr_enum! {
    /// Primitive ordering guarantees of the rasterizer.
    RasterizationOrder;

    Ordered,
    Relaxed,
}

gr_enum! {
    /// Comparison used by depth and stencil tests.
    CompareOperation;

    Always,
    Less,
    Equal,
    LessEqual,
    Greater,
    GreaterEqual,
    NotEqual,
    Never,
}

gr_enum! {
    /// What happens to a stencil value after a test.
    StencilOperation;

    Keep,
    Zero,
    Replace,
    IncrementAndClamp,
    DecrementAndClamp,
    Invert,
    IncrementAndWrap,
    DecrementAndWrap,
}

gr_enum! {
    /// Source or destination factor of a blend equation.
    BlendFactor;

    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    SrcAlphaSaturate,
}

gr_enum! {
    /// Operation of a blend equation.
    BlendOperation;

    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

gr_bitflags! {
    /// Color channels written by a color attachment.
    ColorComponents = u32;

    R = 0x1,
    G = 0x2,
    B = 0x4,
    A = 0x8,
}

gr_enum! {
    /// Whether a vertex buffer advances per vertex or per instance.
    VertexStepRate;

    Vertex,
    Instance,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VertexAttributeState {
    pub binding: u32,
    pub format: Format,
    pub relative_offset: u32,
}

impl Default for VertexAttributeState {
    fn default() -> Self {
        Self {
            binding: 0,
            format: Format::Undefined,
            relative_offset: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VertexBindingState {
    pub stride: u32,
    pub step_rate: VertexStepRate,
}

impl Default for VertexBindingState {
    fn default() -> Self {
        Self {
            stride: 0,
            step_rate: VertexStepRate::Vertex,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InputAssemblerState {
    pub topology: PrimitiveTopology,
    pub primitive_restart_enable: bool,
}

impl Default for InputAssemblerState {
    fn default() -> Self {
        Self {
            topology: PrimitiveTopology::TriangleList,
            primitive_restart_enable: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RasterizerState {
    pub fill_mode: FillMode,
    pub cull_mode: FaceSelection,
    pub rasterization_order: RasterizationOrder,
    pub depth_bias_constant_factor: f32,
    pub depth_bias_slope_factor: f32,
}

impl RasterizerState {
    /// Depth bias is enabled as soon as one of the factors is not zero.
    #[inline]
    pub fn depth_bias_enable(&self) -> bool {
        self.depth_bias_constant_factor != 0.0 || self.depth_bias_slope_factor != 0.0
    }
}

impl Default for RasterizerState {
    fn default() -> Self {
        Self {
            fill_mode: FillMode::Solid,
            cull_mode: FaceSelection::BACK,
            rasterization_order: RasterizationOrder::Ordered,
            depth_bias_constant_factor: 0.0,
            depth_bias_slope_factor: 0.0,
        }
    }
}

impl Hash for RasterizerState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fill_mode.hash(state);
        self.cull_mode.hash(state);
        self.rasterization_order.hash(state);
        self.depth_bias_constant_factor.to_bits().hash(state);
        self.depth_bias_slope_factor.to_bits().hash(state);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DepthState {
    pub write_enable: bool,
    pub compare_op: CompareOperation,
}

impl DepthState {
    /// The test runs unless it always passes without writing.
    #[inline]
    pub fn test_enable(&self) -> bool {
        self.compare_op != CompareOperation::Always || self.write_enable
    }
}

impl Default for DepthState {
    fn default() -> Self {
        Self {
            write_enable: true,
            compare_op: CompareOperation::Less,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StencilFaceState {
    pub fail_op: StencilOperation,
    pub depth_fail_op: StencilOperation,
    pub pass_op: StencilOperation,
    pub compare_op: CompareOperation,
}

impl StencilFaceState {
    /// A face whose operations all keep the value and whose test always passes is a no-op.
    #[inline]
    pub fn is_noop(&self) -> bool {
        self.fail_op == StencilOperation::Keep
            && self.depth_fail_op == StencilOperation::Keep
            && self.pass_op == StencilOperation::Keep
            && self.compare_op == CompareOperation::Always
    }
}

impl Default for StencilFaceState {
    fn default() -> Self {
        Self {
            fail_op: StencilOperation::Keep,
            depth_fail_op: StencilOperation::Keep,
            pass_op: StencilOperation::Keep,
            compare_op: CompareOperation::Always,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct StencilState {
    pub front: StencilFaceState,
    pub back: StencilFaceState,
}

impl StencilState {
    /// The stencil test is enabled unless both faces are no-ops.
    #[inline]
    pub fn test_enable(&self) -> bool {
        !(self.front.is_noop() && self.back.is_noop())
    }

    pub(crate) fn faces_mut(
        &mut self,
        faces: FaceSelection,
    ) -> impl Iterator<Item = &mut StencilFaceState> {
        let front = faces.intersects(FaceSelection::FRONT);
        let back = faces.intersects(FaceSelection::BACK);

        [(front, &mut self.front), (back, &mut self.back)]
            .into_iter()
            .filter_map(|(selected, face)| selected.then_some(face))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ColorAttachmentState {
    pub src_color_blend_factor: BlendFactor,
    pub dst_color_blend_factor: BlendFactor,
    pub src_alpha_blend_factor: BlendFactor,
    pub dst_alpha_blend_factor: BlendFactor,
    pub color_blend_op: BlendOperation,
    pub alpha_blend_op: BlendOperation,
    pub color_write_mask: ColorComponents,
}

impl ColorAttachmentState {
    /// Blending is enabled unless the equation is `src * 1 + dst * 0` for both color and alpha.
    #[inline]
    pub fn blend_enable(&self) -> bool {
        !(self.src_color_blend_factor == BlendFactor::One
            && self.dst_color_blend_factor == BlendFactor::Zero
            && self.src_alpha_blend_factor == BlendFactor::One
            && self.dst_alpha_blend_factor == BlendFactor::Zero
            && self.color_blend_op == BlendOperation::Add
            && self.alpha_blend_op == BlendOperation::Add)
    }
}

impl Default for ColorAttachmentState {
    fn default() -> Self {
        Self {
            src_color_blend_factor: BlendFactor::One,
            dst_color_blend_factor: BlendFactor::Zero,
            src_alpha_blend_factor: BlendFactor::One,
            dst_alpha_blend_factor: BlendFactor::Zero,
            color_blend_op: BlendOperation::Add,
            alpha_blend_op: BlendOperation::Add,
            color_write_mask: ColorComponents::all(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_test_enable() {
        let mut depth = DepthState::default();
        assert!(depth.test_enable());

        depth.compare_op = CompareOperation::Always;
        assert!(depth.test_enable());

        depth.write_enable = false;
        assert!(!depth.test_enable());
    }

    #[test]
    fn stencil_test_enable() {
        let mut stencil = StencilState::default();
        assert!(!stencil.test_enable());

        stencil.back.pass_op = StencilOperation::Replace;
        assert!(stencil.test_enable());
    }

    #[test]
    fn blend_enable() {
        let mut attachment = ColorAttachmentState::default();
        assert!(!attachment.blend_enable());

        attachment.dst_color_blend_factor = BlendFactor::OneMinusSrcAlpha;
        assert!(attachment.blend_enable());
    }

    #[test]
    fn depth_bias_enable() {
        let mut raster = RasterizerState::default();
        assert!(!raster.depth_bias_enable());

        raster.depth_bias_slope_factor = 1.5;
        assert!(raster.depth_bias_enable());
    }
}

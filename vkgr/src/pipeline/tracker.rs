// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

use super::{
    desc::{
        ColorBlendDesc, DepthStencilDesc, GraphicsPipelineDesc, RasterizationDesc,
        VertexAttributeDesc, VertexBindingDesc,
    },
    state::{
        BlendFactor, BlendOperation, ColorAttachmentState, ColorComponents, CompareOperation,
        DepthState, FaceSelection, FillMode, FrontFace, InputAssemblerState, PrimitiveTopology,
        RasterizationOrder, RasterizerState, StencilOperation, StencilState, VertexAttributeState,
        VertexBindingState, VertexStepRate,
    },
    MAX_COLOR_ATTACHMENTS, MAX_VERTEX_ATTRIBUTES,
};
use crate::{
    backend::Backend,
    format::Format,
    hash::{append_hash, compute_hash},
    render_pass::Framebuffer,
    shader::{ShaderProgram, ShaderProgramKind},
};
use smallvec::SmallVec;
use std::{fmt, sync::Arc};

#[derive(Clone, Copy, Debug, Default)]
struct State {
    attributes: [VertexAttributeState; MAX_VERTEX_ATTRIBUTES],
    bindings: [VertexBindingState; MAX_VERTEX_ATTRIBUTES],
    input_assembler: InputAssemblerState,
    rasterizer: RasterizerState,
    depth: DepthState,
    stencil: StencilState,
    alpha_to_coverage: bool,
    color_attachments: [ColorAttachmentState; MAX_COLOR_ATTACHMENTS],
}

#[derive(Clone, Copy, Debug, Default)]
struct Hashes {
    program: u64,
    render_pass: u64,
    attributes: [u64; MAX_VERTEX_ATTRIBUTES],
    input_assembler: u64,
    rasterizer: u64,
    depth: u64,
    stencil: u64,
    color: u64,
    color_attachments: [u64; MAX_COLOR_ATTACHMENTS],
    super_hash: u64,
    last_super_hash: Option<u64>,
}

/// One bit per group. Bitmasks are indexed by attribute, binding or attachment.
#[derive(Clone, Copy, Debug)]
struct DirtyBits {
    program: bool,
    render_pass: bool,
    attributes: u8,
    bindings: u8,
    input_assembler: bool,
    rasterizer: bool,
    depth: bool,
    stencil: bool,
    color: bool,
    color_attachments: u8,
}

impl Default for DirtyBits {
    fn default() -> Self {
        Self {
            program: true,
            render_pass: true,
            attributes: u8::MAX,
            bindings: u8::MAX,
            input_assembler: true,
            rasterizer: true,
            depth: true,
            stencil: true,
            color: true,
            color_attachments: u8::MAX,
        }
    }
}

struct FramebufferInfo<B: Backend> {
    render_pass: Option<B::RenderPass>,
    signature: u64,
    depth: bool,
    stencil: bool,
    color_attachment_mask: u8,
    default_framebuffer: bool,
}

/// Accumulates the fixed function state of a command buffer and hashes it.
///
/// Every setter compares the new value with the stored one and only marks its group dirty on a
/// change. [`flush`](Self::flush) rehashes the dirty groups that are relevant to the bound
/// program and framebuffer and reports whether the combined hash differs from the one of the
/// previous flush.
pub struct PipelineStateTracker<B: Backend> {
    state: State,
    program: Option<Arc<ShaderProgram<B>>>,
    framebuffer: FramebufferInfo<B>,
    hashes: Hashes,
    dirty: DirtyBits,
    /// Attributes and bindings that have been set at least once.
    set_attributes: u8,
    set_bindings: u8,
}

impl<B: Backend> Default for PipelineStateTracker<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> PipelineStateTracker<B> {
    /// Creates a tracker with the default state. Every group starts dirty.
    pub fn new() -> Self {
        PipelineStateTracker {
            state: State::default(),
            program: None,
            framebuffer: FramebufferInfo {
                render_pass: None,
                signature: 0,
                depth: false,
                stencil: false,
                color_attachment_mask: 0,
                default_framebuffer: false,
            },
            hashes: Hashes::default(),
            dirty: DirtyBits::default(),
            set_attributes: 0,
            set_bindings: 0,
        }
    }

    /// Returns to the state of [`new`](Self::new).
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn set_vertex_attribute(
        &mut self,
        location: u32,
        binding: u32,
        format: Format,
        relative_offset: u32,
    ) {
        let location = location as usize;
        assert!(location < MAX_VERTEX_ATTRIBUTES);
        assert!((binding as usize) < MAX_VERTEX_ATTRIBUTES);

        let attribute = VertexAttributeState {
            binding,
            format,
            relative_offset,
        };

        if self.state.attributes[location] != attribute {
            self.state.attributes[location] = attribute;
            self.dirty.attributes |= 1 << location;
        }

        self.set_attributes |= 1 << location;
    }

    /// Records the stride and step rate of a vertex buffer binding. Binding the native buffer
    /// is the job of the command buffer.
    pub fn bind_vertex_buffer(&mut self, binding: u32, stride: u32, step_rate: VertexStepRate) {
        let binding = binding as usize;
        assert!(binding < MAX_VERTEX_ATTRIBUTES);

        let state = VertexBindingState { stride, step_rate };

        if self.state.bindings[binding] != state {
            self.state.bindings[binding] = state;
            self.dirty.bindings |= 1 << binding;
        }

        self.set_bindings |= 1 << binding;
    }

    pub fn set_primitive_restart(&mut self, enable: bool) {
        if self.state.input_assembler.primitive_restart_enable != enable {
            self.state.input_assembler.primitive_restart_enable = enable;
            self.dirty.input_assembler = true;
        }
    }

    pub fn set_primitive_topology(&mut self, topology: PrimitiveTopology) {
        if self.state.input_assembler.topology != topology {
            self.state.input_assembler.topology = topology;
            self.dirty.input_assembler = true;
        }
    }

    pub fn set_fill_mode(&mut self, fill_mode: FillMode) {
        if self.state.rasterizer.fill_mode != fill_mode {
            self.state.rasterizer.fill_mode = fill_mode;
            self.dirty.rasterizer = true;
        }
    }

    pub fn set_cull_mode(&mut self, cull_mode: FaceSelection) {
        if self.state.rasterizer.cull_mode != cull_mode {
            self.state.rasterizer.cull_mode = cull_mode;
            self.dirty.rasterizer = true;
        }
    }

    /// Sets the depth bias. Zero for both factors disables it.
    pub fn set_polygon_offset(&mut self, constant_factor: f32, slope_factor: f32) {
        let rasterizer = &mut self.state.rasterizer;

        if rasterizer.depth_bias_constant_factor.to_bits() != constant_factor.to_bits()
            || rasterizer.depth_bias_slope_factor.to_bits() != slope_factor.to_bits()
        {
            rasterizer.depth_bias_constant_factor = constant_factor;
            rasterizer.depth_bias_slope_factor = slope_factor;
            self.dirty.rasterizer = true;
        }
    }

    pub fn set_rasterization_order(&mut self, order: RasterizationOrder) {
        if self.state.rasterizer.rasterization_order != order {
            self.state.rasterizer.rasterization_order = order;
            self.dirty.rasterizer = true;
        }
    }

    pub fn set_stencil_operations(
        &mut self,
        faces: FaceSelection,
        fail_op: StencilOperation,
        depth_fail_op: StencilOperation,
        pass_op: StencilOperation,
    ) {
        let mut changed = false;

        for face in self.state.stencil.faces_mut(faces) {
            if face.fail_op != fail_op
                || face.depth_fail_op != depth_fail_op
                || face.pass_op != pass_op
            {
                face.fail_op = fail_op;
                face.depth_fail_op = depth_fail_op;
                face.pass_op = pass_op;
                changed = true;
            }
        }

        self.dirty.stencil |= changed;
    }

    pub fn set_stencil_compare_operation(&mut self, faces: FaceSelection, op: CompareOperation) {
        let mut changed = false;

        for face in self.state.stencil.faces_mut(faces) {
            if face.compare_op != op {
                face.compare_op = op;
                changed = true;
            }
        }

        self.dirty.stencil |= changed;
    }

    pub fn set_depth_write(&mut self, enable: bool) {
        if self.state.depth.write_enable != enable {
            self.state.depth.write_enable = enable;
            self.dirty.depth = true;
        }
    }

    pub fn set_depth_compare_operation(&mut self, op: CompareOperation) {
        if self.state.depth.compare_op != op {
            self.state.depth.compare_op = op;
            self.dirty.depth = true;
        }
    }

    pub fn set_alpha_to_coverage(&mut self, enable: bool) {
        if self.state.alpha_to_coverage != enable {
            self.state.alpha_to_coverage = enable;
            self.dirty.color = true;
        }
    }

    pub fn set_color_channel_write_mask(&mut self, attachment: u32, mask: ColorComponents) {
        self.update_color_attachment(attachment, |state| state.color_write_mask = mask);
    }

    pub fn set_blend_factors(
        &mut self,
        attachment: u32,
        src_color: BlendFactor,
        dst_color: BlendFactor,
        src_alpha: BlendFactor,
        dst_alpha: BlendFactor,
    ) {
        self.update_color_attachment(attachment, |state| {
            state.src_color_blend_factor = src_color;
            state.dst_color_blend_factor = dst_color;
            state.src_alpha_blend_factor = src_alpha;
            state.dst_alpha_blend_factor = dst_alpha;
        });
    }

    pub fn set_blend_operation(
        &mut self,
        attachment: u32,
        color_op: BlendOperation,
        alpha_op: BlendOperation,
    ) {
        self.update_color_attachment(attachment, |state| {
            state.color_blend_op = color_op;
            state.alpha_blend_op = alpha_op;
        });
    }

    fn update_color_attachment(
        &mut self,
        attachment: u32,
        f: impl FnOnce(&mut ColorAttachmentState),
    ) {
        let attachment = attachment as usize;
        assert!(attachment < MAX_COLOR_ATTACHMENTS);

        let mut state = self.state.color_attachments[attachment];
        f(&mut state);

        if self.state.color_attachments[attachment] != state {
            self.state.color_attachments[attachment] = state;
            self.dirty.color_attachments |= 1 << attachment;
        }
    }

    /// Binds a graphics program.
    ///
    /// # Panics
    ///
    /// - Panics if `program` is not a graphics program.
    pub fn bind_shader_program(&mut self, program: &Arc<ShaderProgram<B>>) {
        assert_eq!(program.kind(), ShaderProgramKind::Graphics);

        if self.program.as_ref().map(|p| p.id()) != Some(program.id()) {
            self.program = Some(program.clone());
            self.dirty.program = true;
        }
    }

    /// Returns the bound graphics program.
    #[inline]
    pub fn shader_program(&self) -> Option<&Arc<ShaderProgram<B>>> {
        self.program.as_ref()
    }

    pub fn begin_render_pass(&mut self, framebuffer: &Framebuffer<B>) {
        debug_assert!(
            self.framebuffer.render_pass.is_none(),
            "already inside a render pass",
        );

        if self.framebuffer.signature != framebuffer.signature() {
            self.dirty.render_pass = true;
        }

        self.framebuffer = FramebufferInfo {
            render_pass: Some(framebuffer.render_pass()),
            signature: framebuffer.signature(),
            depth: framebuffer.has_depth(),
            stencil: framebuffer.has_stencil(),
            color_attachment_mask: framebuffer.color_attachment_mask(),
            default_framebuffer: framebuffer.is_default_framebuffer(),
        };
    }

    /// Makes the next [`flush`](Self::flush) report a change, for when the bound pipeline became
    /// undefined.
    pub(crate) fn invalidate_pipeline(&mut self) {
        self.hashes.last_super_hash = None;
    }

    /// Leaves the render pass. The framebuffer information is kept, so that beginning a pass on a
    /// compatible framebuffer doesn't change the hash.
    pub fn end_render_pass(&mut self) {
        self.framebuffer.render_pass = None;
    }

    /// Returns whether a group that the bound program and framebuffer can observe has changed
    /// since it was last hashed.
    pub fn has_dirty_state(&self) -> bool {
        let dirty = &self.dirty;
        let framebuffer = &self.framebuffer;
        let (attribute_mask, color_mask) = self.program.as_ref().map_or((0, 0), |program| {
            (
                program.vertex_attribute_mask(),
                program.color_attachment_write_mask(),
            )
        });
        let color_mask = color_mask & framebuffer.color_attachment_mask;

        dirty.program
            || dirty.render_pass
            || dirty.attributes & attribute_mask != 0
            || dirty.bindings != 0
            || dirty.input_assembler
            || dirty.rasterizer
            || (framebuffer.depth && dirty.depth)
            || (framebuffer.stencil && dirty.stencil)
            || (color_mask != 0 && (dirty.color || dirty.color_attachments & color_mask != 0))
    }

    /// Rehashes what changed and returns the hash of the state, together with whether it differs
    /// from the hash returned by the previous call.
    ///
    /// # Panics
    ///
    /// - Panics if no program is bound or no render pass has begun.
    /// - Panics in debug builds if an attribute read by the program or its binding was never set,
    ///   or if the framebuffer color attachments don't match the ones the program writes.
    pub fn flush(&mut self) -> (u64, bool) {
        if self.update_hashes() {
            self.update_super_hash();
        }

        let changed = self.hashes.last_super_hash != Some(self.hashes.super_hash);
        self.hashes.last_super_hash = Some(self.hashes.super_hash);

        (self.hashes.super_hash, changed)
    }

    fn update_hashes(&mut self) -> bool {
        let program = self
            .program
            .as_ref()
            .expect("no shader program is bound");
        let framebuffer = &self.framebuffer;
        assert!(framebuffer.render_pass.is_some(), "not inside a render pass");

        let state = &self.state;
        let hashes = &mut self.hashes;
        let dirty = &mut self.dirty;
        let mut state_dirty = false;

        if dirty.program {
            dirty.program = false;
            hashes.program = program.id().get();
            state_dirty = true;
        }

        if dirty.render_pass {
            dirty.render_pass = false;
            hashes.render_pass = framebuffer.signature;
            state_dirty = true;
        }

        if dirty.attributes != 0 || dirty.bindings != 0 {
            let attribute_mask = program.vertex_attribute_mask();

            // An attribute whose binding changed must be rehashed once the program reads it,
            // even if that happens after the binding bit is cleared.
            for (location, attribute) in state.attributes.iter().enumerate() {
                if dirty.bindings & (1 << attribute.binding) != 0 {
                    dirty.attributes |= 1 << location;
                }
            }

            for (location, attribute) in state.attributes.iter().enumerate() {
                let bit = 1 << location;

                if attribute_mask & bit == 0 {
                    continue;
                }

                debug_assert!(
                    self.set_attributes & bit != 0,
                    "vertex attribute {} was never set",
                    location,
                );
                debug_assert!(
                    self.set_bindings & (1 << attribute.binding) != 0,
                    "vertex buffer binding {} was never set",
                    attribute.binding,
                );

                if dirty.attributes & bit != 0 {
                    dirty.attributes &= !bit;
                    hashes.attributes[location] = append_hash(
                        &state.bindings[attribute.binding as usize],
                        compute_hash(attribute),
                    );
                    state_dirty = true;
                }
            }

            dirty.bindings = 0;
        }

        if dirty.input_assembler {
            dirty.input_assembler = false;
            hashes.input_assembler = compute_hash(&state.input_assembler);
            state_dirty = true;
        }

        if dirty.rasterizer {
            dirty.rasterizer = false;
            hashes.rasterizer = compute_hash(&state.rasterizer);
            state_dirty = true;
        }

        if framebuffer.depth && dirty.depth {
            dirty.depth = false;
            hashes.depth = compute_hash(&state.depth);
            state_dirty = true;
        }

        if framebuffer.stencil && dirty.stencil {
            dirty.stencil = false;
            hashes.stencil = compute_hash(&state.stencil);
            state_dirty = true;
        }

        if framebuffer.color_attachment_mask != 0 {
            debug_assert_eq!(
                framebuffer.color_attachment_mask,
                program.color_attachment_write_mask(),
                "the program and the framebuffer must have the same color attachments",
            );

            if dirty.color {
                dirty.color = false;
                hashes.color = if state.alpha_to_coverage { 1 } else { 2 };
                state_dirty = true;
            }

            let color_dirty = dirty.color_attachments & framebuffer.color_attachment_mask;

            for (i, attachment) in state.color_attachments.iter().enumerate() {
                if color_dirty & (1 << i) != 0 {
                    dirty.color_attachments &= !(1 << i);
                    hashes.color_attachments[i] = compute_hash(attachment);
                    state_dirty = true;
                }
            }
        }

        state_dirty
    }

    fn update_super_hash(&mut self) {
        let Some(program) = &self.program else {
            return;
        };
        let hashes = &self.hashes;
        let attribute_mask = program.vertex_attribute_mask();
        let color_mask = program.color_attachment_write_mask();

        let mut buffer: SmallVec<[u64; 24]> = SmallVec::new();
        buffer.push(hashes.program);
        buffer.push(hashes.render_pass);

        for (location, &hash) in hashes.attributes.iter().enumerate() {
            if attribute_mask & (1 << location) != 0 {
                buffer.push(hash);
            }
        }

        buffer.push(hashes.input_assembler);
        buffer.push(hashes.rasterizer);

        if self.framebuffer.depth {
            buffer.push(hashes.depth);
        }

        if self.framebuffer.stencil {
            buffer.push(hashes.stencil);
        }

        if color_mask != 0 {
            buffer.push(hashes.color);

            for (i, &hash) in hashes.color_attachments.iter().enumerate() {
                if color_mask & (1 << i) != 0 {
                    buffer.push(hash);
                }
            }
        }

        self.hashes.super_hash = compute_hash(&buffer[..]);
    }

    /// Builds the description of the pipeline for the current state.
    ///
    /// # Panics
    ///
    /// - Panics if no program is bound or no render pass has begun.
    pub fn pipeline_desc(&self) -> GraphicsPipelineDesc<B> {
        let program = self
            .program
            .as_ref()
            .expect("no shader program is bound");
        let framebuffer = &self.framebuffer;
        let render_pass = framebuffer
            .render_pass
            .expect("not inside a render pass");
        let state = &self.state;

        let mut vertex_attributes = SmallVec::new();
        let mut vertex_bindings: SmallVec<[VertexBindingDesc; MAX_VERTEX_ATTRIBUTES]> =
            SmallVec::new();
        let mut bindings_added = 0u8;

        for (location, attribute) in state.attributes.iter().enumerate() {
            if program.vertex_attribute_mask() & (1 << location) == 0 {
                continue;
            }

            vertex_attributes.push(VertexAttributeDesc {
                location: location as u32,
                binding: attribute.binding,
                format: attribute.format,
                offset: attribute.relative_offset,
            });

            if bindings_added & (1 << attribute.binding) == 0 {
                bindings_added |= 1 << attribute.binding;

                let binding = &state.bindings[attribute.binding as usize];
                vertex_bindings.push(VertexBindingDesc {
                    binding: attribute.binding,
                    stride: binding.stride,
                    step_rate: binding.step_rate,
                });
            }
        }

        let rasterizer = &state.rasterizer;
        let rasterization = RasterizationDesc {
            fill_mode: rasterizer.fill_mode,
            cull_mode: rasterizer.cull_mode,
            // The viewport of the default framebuffer is flipped, which flips the winding too.
            front_face: if framebuffer.default_framebuffer {
                FrontFace::CounterClockwise
            } else {
                FrontFace::Clockwise
            },
            rasterization_order: rasterizer.rasterization_order,
            depth_bias_enable: rasterizer.depth_bias_enable(),
            depth_bias_constant_factor: rasterizer.depth_bias_constant_factor,
            depth_bias_slope_factor: rasterizer.depth_bias_slope_factor,
        };

        let depth_stencil = (framebuffer.depth || framebuffer.stencil).then(|| DepthStencilDesc {
            depth: framebuffer.depth.then_some(state.depth),
            stencil: framebuffer.stencil.then_some(state.stencil),
        });

        let color_mask = program.color_attachment_write_mask();
        let color_blend = (color_mask != 0).then(|| ColorBlendDesc {
            alpha_to_coverage_enable: state.alpha_to_coverage,
            attachments: state.color_attachments[..color_mask.count_ones() as usize]
                .iter()
                .copied()
                .collect(),
        });

        GraphicsPipelineDesc {
            stages: program.stages().iter().cloned().collect(),
            layout: program.pipeline_layout(),
            render_pass,
            vertex_bindings,
            vertex_attributes,
            input_assembly: state.input_assembler,
            rasterization,
            depth_stencil,
            color_blend,
        }
    }
}

impl<B: Backend> fmt::Debug for PipelineStateTracker<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineStateTracker")
            .field("state", &self.state)
            .field("program", &self.program)
            .field("super_hash", &self.hashes.super_hash)
            .field("dirty", &self.dirty)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::PipelineStateTracker;
    use crate::{
        backend::null::{NullBackend, NullHandle},
        format::Format,
        pipeline::{
            BlendFactor, BlendOperation, ColorComponents, CompareOperation, FaceSelection,
            FillMode, FrontFace, PrimitiveTopology, RasterizationOrder, StencilOperation,
            VertexStepRate,
        },
    };
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use std::collections::HashMap;

    fn tracker_with_pass() -> PipelineStateTracker<NullBackend> {
        let program = gr_graphics_program!(0b11, 0b1);
        let framebuffer = gr_framebuffer!(
            NullHandle::new(),
            [Format::R8G8B8A8Unorm],
            Some(Format::D24UnormS8Uint),
        );

        let mut tracker = PipelineStateTracker::new();
        tracker.bind_shader_program(&program);
        tracker.set_vertex_attribute(0, 0, Format::R32G32B32Sfloat, 0);
        tracker.set_vertex_attribute(1, 1, Format::R32G32Sfloat, 0);
        tracker.bind_vertex_buffer(0, 12, VertexStepRate::Vertex);
        tracker.bind_vertex_buffer(1, 8, VertexStepRate::Vertex);
        tracker.begin_render_pass(&framebuffer);

        tracker
    }

    #[test]
    fn unchanged_setters_stay_clean() {
        let mut tracker = tracker_with_pass();

        let (hash, changed) = tracker.flush();
        assert!(changed);
        assert!(!tracker.has_dirty_state());

        tracker.set_vertex_attribute(0, 0, Format::R32G32B32Sfloat, 0);
        tracker.bind_vertex_buffer(1, 8, VertexStepRate::Vertex);
        tracker.set_primitive_topology(PrimitiveTopology::TriangleList);
        tracker.set_fill_mode(FillMode::Solid);
        tracker.set_cull_mode(FaceSelection::BACK);
        tracker.set_polygon_offset(0.0, 0.0);
        tracker.set_depth_compare_operation(CompareOperation::Less);
        tracker
            .set_stencil_compare_operation(FaceSelection::FRONT_AND_BACK, CompareOperation::Always);
        tracker.set_color_channel_write_mask(0, ColorComponents::all());
        tracker.set_alpha_to_coverage(false);
        assert!(!tracker.has_dirty_state());

        assert_eq!(tracker.flush(), (hash, false));
    }

    #[test]
    fn change_and_revert_keeps_hash() {
        let mut tracker = tracker_with_pass();
        let (hash, _) = tracker.flush();

        tracker.set_depth_write(false);
        assert!(tracker.has_dirty_state());
        let (other, changed) = tracker.flush();
        assert!(changed);
        assert_ne!(other, hash);

        tracker.set_depth_write(true);
        assert_eq!(tracker.flush(), (hash, true));
    }

    #[test]
    fn unused_state_doesnt_change_hash() {
        let mut tracker = tracker_with_pass();
        let (hash, _) = tracker.flush();

        // Attribute 5 isn't read by the program.
        tracker.set_vertex_attribute(5, 3, Format::R32Uint, 4);
        // Attachment 2 isn't written.
        tracker.set_blend_factors(
            2,
            BlendFactor::SrcAlpha,
            BlendFactor::OneMinusSrcAlpha,
            BlendFactor::One,
            BlendFactor::Zero,
        );

        assert_eq!(tracker.flush(), (hash, false));
    }

    #[test]
    fn binding_change_rehashes_attribute() {
        let mut tracker = tracker_with_pass();
        let (hash, _) = tracker.flush();

        tracker.bind_vertex_buffer(1, 16, VertexStepRate::Vertex);
        let (other, changed) = tracker.flush();
        assert!(changed);
        assert_ne!(hash, other);
    }

    #[test]
    fn stencil_only_hashed_with_stencil_attachment() {
        let program = gr_graphics_program!(0, 0b1);
        let framebuffer = gr_framebuffer!(NullHandle::new(), [Format::R8G8B8A8Unorm], None);

        let mut tracker = PipelineStateTracker::<NullBackend>::new();
        tracker.bind_shader_program(&program);
        tracker.begin_render_pass(&framebuffer);
        let (hash, _) = tracker.flush();

        tracker.set_stencil_operations(
            FaceSelection::FRONT,
            StencilOperation::Keep,
            StencilOperation::Keep,
            StencilOperation::Replace,
        );
        tracker.set_depth_write(false);
        assert_eq!(tracker.flush(), (hash, false));

        let desc = tracker.pipeline_desc();
        assert!(desc.depth_stencil.is_none());
        assert_eq!(desc.rasterization.front_face, FrontFace::Clockwise);
        assert_eq!(desc.color_blend.map(|blend| blend.attachments.len()), Some(1));
    }

    #[test]
    fn pipeline_desc_dedups_bindings() {
        let program = gr_graphics_program!(0b111, 0b1);
        let framebuffer = gr_framebuffer!(
            NullHandle::new(),
            [Format::R8G8B8A8Unorm],
            Some(Format::D32Sfloat),
        );

        let mut tracker = PipelineStateTracker::<NullBackend>::new();
        tracker.bind_shader_program(&program);
        tracker.set_vertex_attribute(0, 0, Format::R32G32B32Sfloat, 0);
        tracker.set_vertex_attribute(1, 0, Format::R32G32Sfloat, 12);
        tracker.set_vertex_attribute(2, 1, Format::R8G8B8A8Unorm, 0);
        tracker.bind_vertex_buffer(0, 20, VertexStepRate::Vertex);
        tracker.bind_vertex_buffer(1, 4, VertexStepRate::Instance);
        tracker.set_polygon_offset(1.0, 0.0);
        tracker.set_rasterization_order(RasterizationOrder::Relaxed);
        tracker.set_blend_operation(0, BlendOperation::Max, BlendOperation::Add);
        tracker.begin_render_pass(&framebuffer);

        let desc = tracker.pipeline_desc();
        assert_eq!(desc.vertex_attributes.len(), 3);
        assert_eq!(desc.vertex_bindings.len(), 2);
        assert_eq!(desc.vertex_bindings[1].step_rate, VertexStepRate::Instance);
        assert!(desc.rasterization.depth_bias_enable);

        let depth_stencil = desc.depth_stencil.unwrap();
        assert!(depth_stencil.depth_test_enable());
        assert!(depth_stencil.stencil.is_none());
    }

    #[test]
    fn randomized_hashes_dont_collide() {
        let program = gr_graphics_program!(0b1, 0b1);
        let framebuffer = gr_framebuffer!(
            NullHandle::new(),
            [Format::R8G8B8A8Unorm],
            Some(Format::D24UnormS8Uint),
        );
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut seen = HashMap::new();

        for _ in 0..2000 {
            let mut tracker = PipelineStateTracker::<NullBackend>::new();
            tracker.bind_shader_program(&program);
            tracker.begin_render_pass(&framebuffer);

            let format = Format::ALL[rng.gen_range(1..Format::COUNT)];
            let stride = rng.gen_range(0..64u32);
            let topology = PrimitiveTopology::ALL[rng.gen_range(0..PrimitiveTopology::COUNT)];
            let fill_mode = FillMode::ALL[rng.gen_range(0..FillMode::COUNT)];
            let depth_op = CompareOperation::ALL[rng.gen_range(0..CompareOperation::COUNT)];
            let stencil_op = StencilOperation::ALL[rng.gen_range(0..StencilOperation::COUNT)];
            let src = BlendFactor::ALL[rng.gen_range(0..BlendFactor::COUNT)];
            let write_mask = ColorComponents::from_raw(rng.gen_range(0..16));
            let depth_write = rng.gen_bool(0.5);

            tracker.set_vertex_attribute(0, 0, format, 0);
            tracker.bind_vertex_buffer(0, stride, VertexStepRate::Vertex);
            tracker.set_primitive_topology(topology);
            tracker.set_fill_mode(fill_mode);
            tracker.set_depth_compare_operation(depth_op);
            tracker.set_depth_write(depth_write);
            tracker.set_stencil_operations(
                FaceSelection::FRONT_AND_BACK,
                StencilOperation::Keep,
                StencilOperation::Keep,
                stencil_op,
            );
            tracker.set_blend_factors(
                0,
                src,
                BlendFactor::Zero,
                BlendFactor::One,
                BlendFactor::Zero,
            );
            tracker.set_color_channel_write_mask(0, write_mask);

            let key = (
                format,
                stride,
                topology,
                fill_mode,
                depth_op,
                depth_write,
                stencil_op,
                src,
                write_mask,
            );
            let (hash, _) = tracker.flush();

            if let Some(previous) = seen.insert(hash, key) {
                assert_eq!(previous, key, "two different states share hash {:#x}", hash);
            }
        }
    }
}

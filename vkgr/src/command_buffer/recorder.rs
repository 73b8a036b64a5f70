// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

use super::{
    batch::{BatchKind, Batches, QUERY_RESULT_SIZE},
    dynamic_state::DynamicState,
    pool::CommandBufferAlloc,
    CommandBufferFlags, CommandBufferInitInfo, QueueType,
};
use crate::{
    backend::{
        Backend, BufferCopy, BufferImageCopy, ClearValue, CommandBufferBeginInfo,
        CommandBufferInheritance, ImageBlit, ImageSubresourceLayers, IndexType,
        PipelineBindPoint, Rect2D, RenderPassBeginInfo, ShaderBindingTables,
        StridedDeviceAddressRegion, SubpassContents,
    },
    descriptor_set::DescriptorSetState,
    device::Shared,
    format::Format,
    macros::impl_id_counter,
    pipeline::{
        BlendFactor, BlendOperation, ColorComponents, CompareOperation, FaceSelection, FillMode,
        PipelineStateTracker, PrimitiveTopology, RasterizationOrder, StencilOperation,
        VertexStepRate,
    },
    render_pass::Framebuffer,
    resource::{
        AccelerationStructure, AccelerationStructureUsage, Buffer, BufferUsage, GrObject,
        GrObjectType, OcclusionQuery, Sampler, Texture, TextureSubresourceInfo, TextureType,
        TextureUsage, TextureView, TimestampQuery,
    },
    shader::{ShaderProgram, ShaderProgramKind, MAX_DESCRIPTOR_SETS},
    sync::{
        AccessFlags, BufferMemoryBarrier, ImageLayout, ImageMemoryBarrier, ImageSubresourceRange,
        MemoryBarrier, PipelineStages,
    },
    DeviceSize, NativeError, WHOLE_SIZE,
};
use bytemuck::NoUninit;
use smallvec::SmallVec;
use std::{
    fmt,
    num::NonZero,
    sync::Arc,
    thread::{self, ThreadId},
};

/// Size of the arguments of one non-indexed indirect draw.
pub const DRAW_ARRAYS_INDIRECT_SIZE: u32 = 16;

/// Size of the arguments of one indexed indirect draw.
pub const DRAW_ELEMENTS_INDIRECT_SIZE: u32 = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RecordingState {
    Recording,
    Finalized,
}

/// A command buffer being recorded.
///
/// Obtained from [`GrManager::new_command_buffer`](crate::GrManager::new_command_buffer). The
/// native command buffer begins recording right away. Commands are recorded from the thread that
/// created the command buffer, until [`end_recording`](Self::end_recording) is called. The
/// command buffer is then either submitted with [`GrManager::submit`](crate::GrManager::submit),
/// or, for a secondary command buffer, executed by a primary one with
/// [`push_second_level_command_buffer`](Self::push_second_level_command_buffer).
///
/// Fixed function state and bound resources are only resolved into native pipelines and
/// descriptor sets when a draw, dispatch or trace is recorded.
pub struct CommandBuffer<B: Backend> {
    // Declared first so that the referenced objects go back to the pool before the factories.
    alloc: CommandBufferAlloc<B>,
    shared: Arc<Shared<B>>,
    handle: B::CommandBuffer,
    id: NonZero<u64>,
    name: String,
    thread: ThreadId,
    state: RecordingState,
    empty: bool,
    rendered_to_default_framebuffer: bool,

    batches: Batches<B>,
    dynamic_state: DynamicState,
    pipeline_state: PipelineStateTracker<B>,
    descriptor_sets: [DescriptorSetState<B>; MAX_DESCRIPTOR_SETS],
    program: Option<Arc<ShaderProgram<B>>>,
    bind_point: Option<PipelineBindPoint>,
    push_constants_set: bool,

    framebuffer: Option<Arc<Framebuffer<B>>>,
    render_area: [u32; 4],
    render_pass_command_count: u32,
    subpass_contents: Option<SubpassContents>,
}

impl<B: Backend> CommandBuffer<B> {
    /// Acquires a native command buffer and begins recording.
    ///
    /// # Panics
    ///
    /// - Panics if `framebuffer` is missing for a secondary command buffer, or given for a
    ///   primary one.
    pub(crate) fn new(
        shared: Arc<Shared<B>>,
        init_info: CommandBufferInitInfo<B>,
    ) -> Result<Self, NativeError> {
        let CommandBufferInitInfo {
            name,
            flags,
            framebuffer,
            _ne: _,
        } = init_info;

        let second_level = flags.intersects(CommandBufferFlags::SECOND_LEVEL);
        assert_eq!(
            second_level,
            framebuffer.is_some(),
            "a secondary command buffer needs a framebuffer, a primary one must not have one",
        );

        let mut alloc = shared.command_buffer_factory.new_command_buffer(flags)?;
        let handle = alloc.handle();

        let begin_info = CommandBufferBeginInfo {
            inheritance: framebuffer.as_ref().map(|framebuffer| CommandBufferInheritance {
                render_pass: framebuffer.render_pass(),
                framebuffer: framebuffer.handle(),
            }),
        };

        unsafe { shared.backend.begin_command_buffer(handle, &begin_info) }.inspect_err(
            |err| log::error!("failed to begin command buffer `{}`: {}", name, err),
        )?;

        let mut pipeline_state = PipelineStateTracker::new();
        let mut render_area = [0; 4];
        let mut subpass_contents = None;

        // A secondary command buffer lives entirely inside the render pass of its primary.
        if let Some(framebuffer) = &framebuffer {
            alloc.references_mut().push_arc(framebuffer);
            pipeline_state.begin_render_pass(framebuffer);
            let [width, height] = framebuffer.extent();
            render_area = [0, 0, width, height];
            subpass_contents = Some(SubpassContents::Inline);
        }

        Ok(CommandBuffer {
            alloc,
            shared,
            handle,
            id: Self::next_id(),
            name,
            thread: thread::current().id(),
            state: RecordingState::Recording,
            empty: true,
            rendered_to_default_framebuffer: false,
            batches: Batches::new(),
            dynamic_state: DynamicState::new(),
            pipeline_state,
            descriptor_sets: std::array::from_fn(|_| DescriptorSetState::new()),
            program: None,
            bind_point: None,
            push_constants_set: false,
            framebuffer,
            render_area,
            render_pass_command_count: 0,
            subpass_contents,
        })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the queue the command buffer is submitted to.
    #[inline]
    pub fn queue(&self) -> QueueType {
        self.alloc.queue()
    }

    #[inline]
    pub fn is_second_level(&self) -> bool {
        self.alloc.flags().intersects(CommandBufferFlags::SECOND_LEVEL)
    }

    #[inline]
    pub fn handle(&self) -> B::CommandBuffer {
        self.handle
    }

    /// Returns whether no command was recorded.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.empty
    }

    #[inline]
    pub fn is_finalized(&self) -> bool {
        self.state == RecordingState::Finalized
    }

    /// Returns whether a recorded command writes to a presentable texture.
    #[inline]
    pub fn has_rendered_to_default_framebuffer(&self) -> bool {
        self.rendered_to_default_framebuffer
    }

    #[inline]
    pub(crate) fn alloc(&self) -> &CommandBufferAlloc<B> {
        &self.alloc
    }

    /// Returns whether a render pass has begun and not yet ended. Always true for a secondary
    /// command buffer.
    #[inline]
    pub fn inside_render_pass(&self) -> bool {
        self.framebuffer.is_some()
    }

    fn command_common(&mut self) {
        assert_eq!(
            self.state,
            RecordingState::Recording,
            "command buffer `{}` is not recording",
            self.name,
        );
        debug_assert_eq!(
            thread::current().id(),
            self.thread,
            "command buffer `{}` recorded from another thread",
            self.name,
        );

        self.empty = false;
    }

    fn push_reference<T: GrObject>(&mut self, object: &Arc<T>) {
        self.alloc.references_mut().push_arc(object);
    }

    /// Finishes recording. Batched commands are recorded first.
    ///
    /// # Panics
    ///
    /// - Panics if a render pass is still open.
    pub fn end_recording(&mut self) -> Result<(), NativeError> {
        assert_eq!(self.state, RecordingState::Recording);
        assert!(
            self.is_second_level() || self.framebuffer.is_none(),
            "command buffer `{}` ended inside a render pass",
            self.name,
        );

        self.batches.flush(&self.shared.backend, self.handle);

        unsafe { self.shared.backend.end_command_buffer(self.handle) }.inspect_err(|err| {
            log::error!("failed to end command buffer `{}`: {}", self.name, err);
        })?;

        self.state = RecordingState::Finalized;

        Ok(())
    }

    /// Binds a vertex buffer and records its layout into the pipeline state.
    pub fn bind_vertex_buffer(
        &mut self,
        binding: u32,
        buffer: &Arc<Buffer<B>>,
        offset: DeviceSize,
        stride: u32,
        step_rate: VertexStepRate,
    ) {
        assert!(buffer.usage().intersects(BufferUsage::VERTEX));
        assert!(offset < buffer.size());
        self.command_common();

        self.pipeline_state
            .bind_vertex_buffer(binding, stride, step_rate);
        self.batches
            .switch_to(&self.shared.backend, self.handle, BatchKind::AnyOther);
        unsafe {
            self.shared.backend.cmd_bind_vertex_buffers(
                self.handle,
                binding,
                &[buffer.handle()],
                &[offset],
            )
        };
        self.push_reference(buffer);
    }

    pub fn set_vertex_attribute(
        &mut self,
        location: u32,
        binding: u32,
        format: Format,
        relative_offset: u32,
    ) {
        self.command_common();
        self.pipeline_state
            .set_vertex_attribute(location, binding, format, relative_offset);
    }

    pub fn bind_index_buffer(
        &mut self,
        buffer: &Arc<Buffer<B>>,
        offset: DeviceSize,
        index_type: IndexType,
    ) {
        assert!(buffer.usage().intersects(BufferUsage::INDEX));
        assert!(offset < buffer.size());
        self.command_common();

        self.batches
            .switch_to(&self.shared.backend, self.handle, BatchKind::AnyOther);
        unsafe {
            self.shared.backend.cmd_bind_index_buffer(
                self.handle,
                buffer.handle(),
                offset,
                index_type,
            )
        };
        self.push_reference(buffer);
    }

    pub fn set_primitive_restart(&mut self, enable: bool) {
        self.command_common();
        self.pipeline_state.set_primitive_restart(enable);
    }

    /// Sets the viewport in framebuffer pixels. With the default framebuffer, `y` goes up.
    pub fn set_viewport(&mut self, x: u32, y: u32, width: u32, height: u32) {
        self.command_common();
        self.dynamic_state.set_viewport(x, y, width, height);
    }

    /// Sets the scissor in framebuffer pixels. Extents past the framebuffer are clamped, so
    /// `u32::MAX` covers the whole framebuffer.
    pub fn set_scissor(&mut self, x: u32, y: u32, width: u32, height: u32) {
        self.command_common();
        self.dynamic_state.set_scissor(x, y, width, height);
    }

    pub fn set_fill_mode(&mut self, fill_mode: FillMode) {
        self.command_common();
        self.pipeline_state.set_fill_mode(fill_mode);
    }

    pub fn set_cull_mode(&mut self, cull_mode: FaceSelection) {
        self.command_common();
        self.pipeline_state.set_cull_mode(cull_mode);
    }

    pub fn set_polygon_offset(&mut self, constant_factor: f32, slope_factor: f32) {
        self.command_common();
        self.pipeline_state
            .set_polygon_offset(constant_factor, slope_factor);
    }

    pub fn set_rasterization_order(&mut self, order: RasterizationOrder) {
        self.command_common();
        self.pipeline_state.set_rasterization_order(order);
    }

    pub fn set_stencil_operations(
        &mut self,
        faces: FaceSelection,
        fail_op: StencilOperation,
        depth_fail_op: StencilOperation,
        pass_op: StencilOperation,
    ) {
        self.command_common();
        self.pipeline_state
            .set_stencil_operations(faces, fail_op, depth_fail_op, pass_op);
    }

    pub fn set_stencil_compare_operation(&mut self, faces: FaceSelection, op: CompareOperation) {
        self.command_common();
        self.pipeline_state.set_stencil_compare_operation(faces, op);
    }

    pub fn set_stencil_compare_mask(&mut self, faces: FaceSelection, mask: u32) {
        self.command_common();
        let changed = self.dynamic_state.set_stencil_compare_mask(faces, mask);

        if !changed.is_empty() {
            self.batches
                .switch_to(&self.shared.backend, self.handle, BatchKind::AnyOther);
            unsafe {
                self.shared
                    .backend
                    .cmd_set_stencil_compare_mask(self.handle, changed, mask)
            };
        }
    }

    pub fn set_stencil_write_mask(&mut self, faces: FaceSelection, mask: u32) {
        self.command_common();
        let changed = self.dynamic_state.set_stencil_write_mask(faces, mask);

        if !changed.is_empty() {
            self.batches
                .switch_to(&self.shared.backend, self.handle, BatchKind::AnyOther);
            unsafe {
                self.shared
                    .backend
                    .cmd_set_stencil_write_mask(self.handle, changed, mask)
            };
        }
    }

    pub fn set_stencil_reference(&mut self, faces: FaceSelection, reference: u32) {
        self.command_common();
        let changed = self.dynamic_state.set_stencil_reference(faces, reference);

        if !changed.is_empty() {
            self.batches
                .switch_to(&self.shared.backend, self.handle, BatchKind::AnyOther);
            unsafe {
                self.shared
                    .backend
                    .cmd_set_stencil_reference(self.handle, changed, reference)
            };
        }
    }

    pub fn set_depth_write(&mut self, enable: bool) {
        self.command_common();
        self.pipeline_state.set_depth_write(enable);
    }

    pub fn set_depth_compare_operation(&mut self, op: CompareOperation) {
        self.command_common();
        self.pipeline_state.set_depth_compare_operation(op);
    }

    pub fn set_alpha_to_coverage(&mut self, enable: bool) {
        self.command_common();
        self.pipeline_state.set_alpha_to_coverage(enable);
    }

    pub fn set_color_channel_write_mask(&mut self, attachment: u32, mask: ColorComponents) {
        self.command_common();
        self.pipeline_state
            .set_color_channel_write_mask(attachment, mask);
    }

    pub fn set_blend_factors(
        &mut self,
        attachment: u32,
        src_color: BlendFactor,
        dst_color: BlendFactor,
        src_alpha: BlendFactor,
        dst_alpha: BlendFactor,
    ) {
        self.command_common();
        self.pipeline_state
            .set_blend_factors(attachment, src_color, dst_color, src_alpha, dst_alpha);
    }

    pub fn set_blend_operation(
        &mut self,
        attachment: u32,
        color_op: BlendOperation,
        alpha_op: BlendOperation,
    ) {
        self.command_common();
        self.pipeline_state
            .set_blend_operation(attachment, color_op, alpha_op);
    }

    pub fn set_line_width(&mut self, width: f32) {
        self.command_common();

        if self.dynamic_state.set_line_width(width) {
            self.batches
                .switch_to(&self.shared.backend, self.handle, BatchKind::AnyOther);
            unsafe { self.shared.backend.cmd_set_line_width(self.handle, width) };
        }
    }

    pub fn bind_uniform_buffer(
        &mut self,
        set: u32,
        binding: u32,
        array_index: u32,
        buffer: &Arc<Buffer<B>>,
        offset: DeviceSize,
        range: DeviceSize,
    ) {
        self.command_common();
        self.descriptor_sets[set as usize]
            .bind_uniform_buffer(binding, array_index, buffer, offset, range);
        self.push_reference(buffer);
    }

    pub fn bind_storage_buffer(
        &mut self,
        set: u32,
        binding: u32,
        array_index: u32,
        buffer: &Arc<Buffer<B>>,
        offset: DeviceSize,
        range: DeviceSize,
    ) {
        self.command_common();
        self.descriptor_sets[set as usize]
            .bind_storage_buffer(binding, array_index, buffer, offset, range);
        self.push_reference(buffer);
    }

    pub fn bind_texture(
        &mut self,
        set: u32,
        binding: u32,
        array_index: u32,
        view: &Arc<TextureView<B>>,
    ) {
        self.command_common();
        self.descriptor_sets[set as usize].bind_texture(binding, array_index, view);
        self.push_reference(view);
    }

    pub fn bind_texture_and_sampler(
        &mut self,
        set: u32,
        binding: u32,
        array_index: u32,
        view: &Arc<TextureView<B>>,
        sampler: &Arc<Sampler<B>>,
    ) {
        self.command_common();
        self.descriptor_sets[set as usize]
            .bind_texture_and_sampler(binding, array_index, view, sampler);
        self.push_reference(view);
        self.push_reference(sampler);
    }

    pub fn bind_sampler(
        &mut self,
        set: u32,
        binding: u32,
        array_index: u32,
        sampler: &Arc<Sampler<B>>,
    ) {
        self.command_common();
        self.descriptor_sets[set as usize].bind_sampler(binding, array_index, sampler);
        self.push_reference(sampler);
    }

    /// Binds a storage image. Writing to a presentable texture counts as rendering to the
    /// default framebuffer.
    pub fn bind_image(
        &mut self,
        set: u32,
        binding: u32,
        array_index: u32,
        view: &Arc<TextureView<B>>,
    ) {
        self.command_common();
        self.descriptor_sets[set as usize].bind_image(binding, array_index, view);

        if view.texture().usage().intersects(TextureUsage::PRESENT) {
            self.rendered_to_default_framebuffer = true;
        }

        self.push_reference(view);
    }

    pub fn bind_acceleration_structure(
        &mut self,
        set: u32,
        binding: u32,
        array_index: u32,
        accel: &Arc<AccelerationStructure<B>>,
    ) {
        self.command_common();
        self.descriptor_sets[set as usize].bind_acceleration_structure(binding, array_index, accel);
        self.push_reference(accel);
    }

    /// Binds a program. Compute and ray tracing pipelines are bound right away, graphics
    /// pipelines at the next draw.
    pub fn bind_shader_program(&mut self, program: &Arc<ShaderProgram<B>>) {
        self.command_common();

        let bind_point = match program.kind() {
            ShaderProgramKind::Graphics => {
                self.pipeline_state.bind_shader_program(program);
                PipelineBindPoint::Graphics
            }
            ShaderProgramKind::Compute => PipelineBindPoint::Compute,
            ShaderProgramKind::RayTracing => PipelineBindPoint::RayTracing,
        };

        if bind_point != PipelineBindPoint::Graphics {
            self.bind_program_pipeline(program);
        }

        // Sets bound at another bind point are not visible at this one.
        if self.bind_point != Some(bind_point) {
            for set in &mut self.descriptor_sets {
                set.invalidate();
            }

            self.bind_point = Some(bind_point);
        }

        // Slots the program doesn't use get no layout, so that a layout change forces a rebind
        // once a program uses them again.
        for (index, set) in self.descriptor_sets.iter_mut().enumerate() {
            set.set_layout(program.descriptor_set_layout(index));
        }

        self.program = Some(program.clone());
        self.push_constants_set = false;
        self.push_reference(program);
    }

    fn bind_program_pipeline(&mut self, program: &ShaderProgram<B>) {
        let (bind_point, pipeline) = match program.kind() {
            ShaderProgramKind::Graphics => unreachable!(),
            ShaderProgramKind::Compute => (
                PipelineBindPoint::Compute,
                self.shared
                    .pipeline_factory
                    .get_or_create_compute_pipeline(program),
            ),
            ShaderProgramKind::RayTracing => {
                let Some(ray_tracing) = program.ray_tracing() else {
                    unreachable!("ray tracing programs always carry their pipeline");
                };

                (PipelineBindPoint::RayTracing, ray_tracing.pipeline)
            }
        };

        self.batches
            .switch_to(&self.shared.backend, self.handle, BatchKind::AnyOther);
        unsafe {
            self.shared
                .backend
                .cmd_bind_pipeline(self.handle, bind_point, pipeline)
        };
    }

    /// Sets the push constants of the bound program.
    ///
    /// # Panics
    ///
    /// - Panics if no program is bound.
    /// - Panics if the size of `data` isn't the push constant size of the program, or exceeds
    ///   the configured maximum.
    pub fn set_push_constants<T: NoUninit>(&mut self, data: &T) {
        let bytes = bytemuck::bytes_of(data);
        let program = self.program.as_ref().expect("no shader program is bound");

        assert!(
            bytes.len() as u32 <= self.shared.config.max_push_constant_size,
            "push constants of {} bytes exceed the maximum of {}",
            bytes.len(),
            self.shared.config.max_push_constant_size,
        );
        assert_eq!(
            bytes.len() as u32,
            program.push_constant_size(),
            "push constants don't match the block of program `{}`",
            program.name(),
        );
        assert_eq!(bytes.len() % 4, 0);

        let layout = program.pipeline_layout();
        let stages = program.push_constant_stages();
        self.command_common();

        self.batches
            .switch_to(&self.shared.backend, self.handle, BatchKind::AnyOther);
        unsafe {
            self.shared
                .backend
                .cmd_push_constants(self.handle, layout, stages, 0, bytes)
        };
        self.push_constants_set = true;
    }

    /// Begins a render pass on `framebuffer`. The native render pass begins with the first
    /// command recorded inside it.
    ///
    /// The render area is clamped to the framebuffer, so `u32::MAX` extents cover all of it.
    ///
    /// # Panics
    ///
    /// - Panics if a render pass is already open.
    pub fn begin_render_pass(
        &mut self,
        framebuffer: &Arc<Framebuffer<B>>,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) {
        assert!(
            self.framebuffer.is_none(),
            "command buffer `{}` is already inside a render pass",
            self.name,
        );
        self.command_common();

        let [fb_width, fb_height] = framebuffer.extent();
        assert!(x < fb_width && y < fb_height);

        self.pipeline_state.begin_render_pass(framebuffer);
        self.dynamic_state.framebuffer_changed();
        self.render_area = [
            x,
            y,
            width.min(fb_width - x),
            height.min(fb_height - y),
        ];
        self.render_pass_command_count = 0;
        self.subpass_contents = None;
        self.framebuffer = Some(framebuffer.clone());
        self.push_reference(framebuffer);
    }

    fn begin_render_pass_internal(&mut self) {
        let framebuffer = self.framebuffer.as_ref().expect("not inside a render pass");
        let contents = self.subpass_contents.unwrap_or(SubpassContents::Inline);
        let [_, fb_height] = framebuffer.extent();
        let [x, y, width, height] = self.render_area;
        let flip = framebuffer.is_default_framebuffer();

        self.batches.flush(&self.shared.backend, self.handle);

        let info = RenderPassBeginInfo {
            render_pass: framebuffer.render_pass(),
            framebuffer: framebuffer.handle(),
            render_area: Rect2D {
                x: x as i32,
                y: if flip {
                    (fb_height - (y + height)) as i32
                } else {
                    y as i32
                },
                width,
                height,
            },
            clear_values: framebuffer.clear_values(),
            contents,
        };

        unsafe { self.shared.backend.cmd_begin_render_pass(self.handle, &info) };

        if flip {
            self.rendered_to_default_framebuffer = true;
        }
    }

    /// Ends the render pass. A pass without commands is still recorded.
    ///
    /// # Panics
    ///
    /// - Panics if no render pass is open, or if this is a secondary command buffer.
    pub fn end_render_pass(&mut self) {
        assert!(
            !self.is_second_level(),
            "a secondary command buffer can't end the render pass of its primary",
        );
        assert!(
            self.framebuffer.is_some(),
            "command buffer `{}` is not inside a render pass",
            self.name,
        );
        self.command_common();

        if self.render_pass_command_count == 0 {
            self.subpass_contents = Some(SubpassContents::Inline);
            self.begin_render_pass_internal();
        }

        self.batches.flush(&self.shared.backend, self.handle);
        unsafe { self.shared.backend.cmd_end_render_pass(self.handle) };

        self.framebuffer = None;
        self.pipeline_state.end_render_pass();

        // Secondary command buffers leave the bound state undefined.
        if self.subpass_contents == Some(SubpassContents::SecondaryCommandBuffers) {
            self.pipeline_state.invalidate_pipeline();

            for set in &mut self.descriptor_sets {
                set.invalidate();
            }

            self.dynamic_state.rebind(&*self.shared.backend, self.handle);

            if let Some(program) = self
                .program
                .clone()
                .filter(|program| program.kind() != ShaderProgramKind::Graphics)
            {
                self.bind_program_pipeline(&program);
            }
        }

        self.subpass_contents = None;
    }

    fn drawcall_common(&mut self) -> Result<(), NativeError> {
        self.command_common();

        assert!(
            self.framebuffer.is_some(),
            "draw outside of a render pass in command buffer `{}`",
            self.name,
        );
        assert_ne!(
            self.subpass_contents,
            Some(SubpassContents::SecondaryCommandBuffers),
            "draw in a render pass that executes secondary command buffers",
        );
        self.subpass_contents = Some(SubpassContents::Inline);

        if self.render_pass_command_count == 0 && !self.is_second_level() {
            self.begin_render_pass_internal();
        }

        self.render_pass_command_count += 1;

        let Self {
            shared,
            handle,
            batches,
            dynamic_state,
            pipeline_state,
            descriptor_sets,
            program,
            framebuffer,
            push_constants_set,
            ..
        } = self;
        let shared: &Shared<B> = shared;
        let backend = &*shared.backend;
        let handle = *handle;
        let program = program
            .as_ref()
            .filter(|program| program.kind() == ShaderProgramKind::Graphics)
            .expect("no graphics program is bound");

        debug_assert!(
            program.push_constant_size() == 0 || *push_constants_set,
            "push constants of program `{}` were not set",
            program.name(),
        );

        batches.flush(backend, handle);

        if let Some(pipeline) = shared.pipeline_factory.get_or_create_pipeline(pipeline_state) {
            unsafe { backend.cmd_bind_pipeline(handle, PipelineBindPoint::Graphics, pipeline) };
        }

        flush_descriptor_sets(
            shared,
            handle,
            descriptor_sets,
            program,
            PipelineBindPoint::Graphics,
        )?;

        if let Some(framebuffer) = framebuffer {
            dynamic_state.flush(
                backend,
                handle,
                framebuffer.extent(),
                framebuffer.is_default_framebuffer(),
            );
        }

        Ok(())
    }

    fn dispatch_common(&mut self, kind: ShaderProgramKind) -> Result<(), NativeError> {
        self.command_common();
        assert!(
            self.framebuffer.is_none(),
            "{:?} work inside a render pass in command buffer `{}`",
            kind,
            self.name,
        );

        let Self {
            shared,
            handle,
            batches,
            descriptor_sets,
            program,
            push_constants_set,
            ..
        } = self;
        let shared: &Shared<B> = shared;
        let program = program
            .as_ref()
            .filter(|program| program.kind() == kind)
            .unwrap_or_else(|| panic!("no {:?} program is bound", kind));

        debug_assert!(
            program.push_constant_size() == 0 || *push_constants_set,
            "push constants of program `{}` were not set",
            program.name(),
        );

        batches.flush(&shared.backend, *handle);

        let bind_point = if kind == ShaderProgramKind::Compute {
            PipelineBindPoint::Compute
        } else {
            PipelineBindPoint::RayTracing
        };

        flush_descriptor_sets(shared, *handle, descriptor_sets, program, bind_point)
    }

    pub fn draw_arrays(
        &mut self,
        topology: PrimitiveTopology,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> Result<(), NativeError> {
        self.pipeline_state.set_primitive_topology(topology);
        self.drawcall_common()?;

        unsafe {
            self.shared.backend.cmd_draw(
                self.handle,
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            )
        };

        Ok(())
    }

    pub fn draw_elements(
        &mut self,
        topology: PrimitiveTopology,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) -> Result<(), NativeError> {
        self.pipeline_state.set_primitive_topology(topology);
        self.drawcall_common()?;

        unsafe {
            self.shared.backend.cmd_draw_indexed(
                self.handle,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            )
        };

        Ok(())
    }

    /// Draws with arguments read from `buffer`, [`DRAW_ARRAYS_INDIRECT_SIZE`] bytes per draw.
    pub fn draw_arrays_indirect(
        &mut self,
        topology: PrimitiveTopology,
        buffer: &Arc<Buffer<B>>,
        offset: DeviceSize,
        draw_count: u32,
    ) -> Result<(), NativeError> {
        check_indirect(buffer, offset, draw_count, DRAW_ARRAYS_INDIRECT_SIZE);
        self.pipeline_state.set_primitive_topology(topology);
        self.drawcall_common()?;

        unsafe {
            self.shared.backend.cmd_draw_indirect(
                self.handle,
                buffer.handle(),
                offset,
                draw_count,
                DRAW_ARRAYS_INDIRECT_SIZE,
            )
        };
        self.push_reference(buffer);

        Ok(())
    }

    /// Draws with arguments read from `buffer`, [`DRAW_ELEMENTS_INDIRECT_SIZE`] bytes per draw.
    pub fn draw_elements_indirect(
        &mut self,
        topology: PrimitiveTopology,
        buffer: &Arc<Buffer<B>>,
        offset: DeviceSize,
        draw_count: u32,
    ) -> Result<(), NativeError> {
        check_indirect(buffer, offset, draw_count, DRAW_ELEMENTS_INDIRECT_SIZE);
        self.pipeline_state.set_primitive_topology(topology);
        self.drawcall_common()?;

        unsafe {
            self.shared.backend.cmd_draw_indexed_indirect(
                self.handle,
                buffer.handle(),
                offset,
                draw_count,
                DRAW_ELEMENTS_INDIRECT_SIZE,
            )
        };
        self.push_reference(buffer);

        Ok(())
    }

    pub fn dispatch_compute(
        &mut self,
        group_count_x: u32,
        group_count_y: u32,
        group_count_z: u32,
    ) -> Result<(), NativeError> {
        self.dispatch_common(ShaderProgramKind::Compute)?;

        unsafe {
            self.shared.backend.cmd_dispatch(
                self.handle,
                group_count_x,
                group_count_y,
                group_count_z,
            )
        };

        Ok(())
    }

    /// Traces rays with the bound ray tracing program.
    ///
    /// The shader binding table at `sbt_offset` holds, in order and `sbt_record_size` bytes
    /// apart: the ray generation record, one miss record per ray type, then the hit group
    /// records.
    ///
    /// # Panics
    ///
    /// - Panics if `ray_type_count` isn't the ray type count of the program, or if
    ///   `hit_group_record_count` isn't a multiple of it.
    /// - Panics if the table is out of `sbt_buffer`, or if the buffer has no device address.
    pub fn trace_rays(
        &mut self,
        sbt_buffer: &Arc<Buffer<B>>,
        sbt_offset: DeviceSize,
        sbt_record_size: u32,
        hit_group_record_count: u32,
        ray_type_count: u32,
        width: u32,
        height: u32,
        depth: u32,
    ) -> Result<(), NativeError> {
        let program = self.program.as_ref().expect("no shader program is bound");
        let expected_ray_types = program.ray_tracing().map_or(0, |info| info.ray_type_count);
        assert_eq!(
            ray_type_count, expected_ray_types,
            "every miss shader of the program must be in use",
        );
        assert!(ray_type_count > 0 && hit_group_record_count % ray_type_count == 0);
        assert!(sbt_buffer
            .usage()
            .intersects(BufferUsage::SHADER_BINDING_TABLE));

        let record_size = DeviceSize::from(sbt_record_size);
        let record_count = 1 + DeviceSize::from(ray_type_count + hit_group_record_count);
        assert!(sbt_offset + record_count * record_size <= sbt_buffer.size());
        let base_address = sbt_buffer
            .device_address()
            .expect("a shader binding table buffer needs a device address")
            + sbt_offset;

        self.dispatch_common(ShaderProgramKind::RayTracing)?;

        let raygen = StridedDeviceAddressRegion {
            device_address: base_address,
            stride: record_size,
            size: record_size,
        };
        let miss = StridedDeviceAddressRegion {
            device_address: raygen.device_address + raygen.size,
            stride: record_size,
            size: record_size * DeviceSize::from(ray_type_count),
        };
        let hit = StridedDeviceAddressRegion {
            device_address: miss.device_address + miss.size,
            stride: record_size * DeviceSize::from(ray_type_count),
            size: record_size * DeviceSize::from(hit_group_record_count),
        };
        let tables = ShaderBindingTables {
            raygen,
            miss,
            hit,
            callable: StridedDeviceAddressRegion::default(),
        };

        unsafe {
            self.shared
                .backend
                .cmd_trace_rays(self.handle, &tables, width, height, depth)
        };
        self.push_reference(sbt_buffer);

        Ok(())
    }

    /// Fills the mips of a 2D texture by successive blits from the first mip of the view.
    ///
    /// The texture must be in the [`TextureUsage::GENERATE_MIPMAPS`] usage, and stays in it.
    ///
    /// # Panics
    ///
    /// - Panics if the texture is 3D or has a depth/stencil format.
    /// - Panics if the view doesn't start at the first mip or covers more than one layer.
    pub fn generate_mipmaps_2d(&mut self, view: &Arc<TextureView<B>>) {
        let texture = view.texture();
        let subresource = *view.subresource();
        assert_ne!(texture.ty(), TextureType::Texture3D, "not for 3D textures");
        assert!(!texture.format().is_depth_stencil());
        assert!(texture.usage().intersects(TextureUsage::GENERATE_MIPMAPS));
        assert_eq!(subresource.first_mipmap, 0);
        assert_eq!(subresource.layer_count, 1);
        assert!(
            self.framebuffer.is_none(),
            "mipmap generation inside a render pass",
        );
        self.command_common();

        let layer = subresource.first_layer;

        for level in 1..texture.mip_count() {
            // The source mip was written by the previous blit.
            if level > 1 {
                self.push_image_barrier(
                    texture,
                    PipelineStages::TRANSFER,
                    PipelineStages::TRANSFER,
                    ImageMemoryBarrier {
                        src_access: AccessFlags::TRANSFER_WRITE,
                        dst_access: AccessFlags::TRANSFER_READ,
                        old_layout: ImageLayout::TransferDstOptimal,
                        new_layout: ImageLayout::TransferSrcOptimal,
                        image: texture.handle(),
                        subresource_range: texture
                            .subresource_range(&TextureSubresourceInfo::surface(level - 1, layer)),
                    },
                );
            }

            self.push_image_barrier(
                texture,
                PipelineStages::TRANSFER,
                PipelineStages::TRANSFER,
                ImageMemoryBarrier {
                    src_access: AccessFlags::empty(),
                    dst_access: AccessFlags::TRANSFER_WRITE,
                    old_layout: ImageLayout::Undefined,
                    new_layout: ImageLayout::TransferDstOptimal,
                    image: texture.handle(),
                    subresource_range: texture
                        .subresource_range(&TextureSubresourceInfo::surface(level, layer)),
                },
            );

            let src = texture.mip_extent(level - 1);
            let dst = texture.mip_extent(level);
            let aspects = texture.format().aspects();
            let blit = ImageBlit {
                src_subresource: ImageSubresourceLayers {
                    aspects,
                    mip_level: level - 1,
                    base_array_layer: layer,
                    layer_count: 1,
                },
                src_offsets: [[0; 3], [src[0] as i32, src[1] as i32, 1]],
                dst_subresource: ImageSubresourceLayers {
                    aspects,
                    mip_level: level,
                    base_array_layer: layer,
                    layer_count: 1,
                },
                dst_offsets: [[0; 3], [dst[0] as i32, dst[1] as i32, 1]],
            };

            self.batches
                .switch_to(&self.shared.backend, self.handle, BatchKind::AnyOther);
            unsafe {
                self.shared.backend.cmd_blit_image(
                    self.handle,
                    texture.handle(),
                    ImageLayout::TransferSrcOptimal,
                    texture.handle(),
                    ImageLayout::TransferDstOptimal,
                    &[blit],
                )
            };
        }

        // Mips in between were read by the next blit. Put them back with the last one.
        let mip_count = texture.mip_count();

        if mip_count > 2 {
            self.push_image_barrier(
                texture,
                PipelineStages::TRANSFER,
                PipelineStages::TRANSFER,
                ImageMemoryBarrier {
                    src_access: AccessFlags::TRANSFER_READ,
                    dst_access: AccessFlags::TRANSFER_WRITE,
                    old_layout: ImageLayout::TransferSrcOptimal,
                    new_layout: ImageLayout::TransferDstOptimal,
                    image: texture.handle(),
                    subresource_range: texture.subresource_range(&TextureSubresourceInfo {
                        first_mipmap: 1,
                        mipmap_count: mip_count - 2,
                        ..TextureSubresourceInfo::surface(1, layer)
                    }),
                },
            );
        }

        self.push_reference(view);
    }

    /// Clears the subresource of a view. The texture must be in the
    /// [`TextureUsage::TRANSFER_DESTINATION`] usage.
    ///
    /// # Panics
    ///
    /// - Panics if the kind of `value` doesn't match the format of the texture.
    pub fn clear_texture_view(&mut self, view: &Arc<TextureView<B>>, value: ClearValue) {
        let texture = view.texture();
        assert!(texture
            .usage()
            .intersects(TextureUsage::TRANSFER_DESTINATION));
        assert!(self.framebuffer.is_none(), "clear inside a render pass");
        self.command_common();

        let range = view.subresource_range();
        self.batches
            .switch_to(&self.shared.backend, self.handle, BatchKind::AnyOther);

        match value {
            ClearValue::Color(color) => {
                assert!(!texture.format().is_depth_stencil());
                unsafe {
                    self.shared.backend.cmd_clear_color_image(
                        self.handle,
                        texture.handle(),
                        ImageLayout::TransferDstOptimal,
                        &color,
                        &range,
                    )
                };
            }
            ClearValue::DepthStencil { depth, stencil } => {
                assert!(texture.format().is_depth_stencil());
                unsafe {
                    self.shared.backend.cmd_clear_depth_stencil_image(
                        self.handle,
                        texture.handle(),
                        ImageLayout::TransferDstOptimal,
                        depth,
                        stencil,
                        &range,
                    )
                };
            }
        }

        self.push_reference(view);
    }

    /// Fills a range of a buffer with `value`. A `size` of [`WHOLE_SIZE`] fills the rest of the
    /// buffer. The size is rounded up to a multiple of 4.
    pub fn fill_buffer(
        &mut self,
        buffer: &Arc<Buffer<B>>,
        offset: DeviceSize,
        size: DeviceSize,
        value: u32,
    ) {
        assert!(buffer
            .usage()
            .intersects(BufferUsage::TRANSFER_DESTINATION));
        assert!(offset < buffer.size());
        assert_eq!(offset % 4, 0, "offset must be a multiple of 4");
        assert!(self.framebuffer.is_none(), "fill inside a render pass");

        let size = if size == WHOLE_SIZE {
            buffer.size() - offset
        } else {
            size
        };
        let size = size.next_multiple_of(4);
        assert!(offset + size <= buffer.size());
        self.command_common();

        self.batches
            .switch_to(&self.shared.backend, self.handle, BatchKind::AnyOther);
        unsafe {
            self.shared
                .backend
                .cmd_fill_buffer(self.handle, buffer.handle(), offset, size, value)
        };
        self.push_reference(buffer);
    }

    pub fn copy_buffer_to_buffer(
        &mut self,
        src: &Arc<Buffer<B>>,
        src_offset: DeviceSize,
        dst: &Arc<Buffer<B>>,
        dst_offset: DeviceSize,
        range: DeviceSize,
    ) {
        assert!(src.usage().intersects(BufferUsage::TRANSFER_SOURCE));
        assert!(dst.usage().intersects(BufferUsage::TRANSFER_DESTINATION));
        assert!(src_offset + range <= src.size());
        assert!(dst_offset + range <= dst.size());
        assert!(self.framebuffer.is_none(), "copy inside a render pass");
        self.command_common();

        let region = BufferCopy {
            src_offset,
            dst_offset,
            size: range,
        };

        self.batches
            .switch_to(&self.shared.backend, self.handle, BatchKind::AnyOther);
        unsafe {
            self.shared
                .backend
                .cmd_copy_buffer(self.handle, src.handle(), dst.handle(), &[region])
        };
        self.push_reference(src);
        self.push_reference(dst);
    }

    /// Uploads one surface. The texture must be in the [`TextureUsage::TRANSFER_DESTINATION`]
    /// usage.
    ///
    /// # Panics
    ///
    /// - Panics if the view covers more than one mip or layer.
    /// - Panics if `range` isn't the size of the surface.
    pub fn copy_buffer_to_texture_view(
        &mut self,
        buffer: &Arc<Buffer<B>>,
        offset: DeviceSize,
        range: DeviceSize,
        view: &Arc<TextureView<B>>,
    ) {
        let texture = view.texture();
        let subresource = view.subresource();
        assert!(buffer.usage().intersects(BufferUsage::TRANSFER_SOURCE));
        assert!(texture
            .usage()
            .intersects(TextureUsage::TRANSFER_DESTINATION));
        assert!(subresource.mipmap_count == 1 && subresource.layer_count == 1);
        assert!(offset + range <= buffer.size());
        assert!(self.framebuffer.is_none(), "copy inside a render pass");

        let extent = texture.mip_extent(subresource.first_mipmap);
        let surface_size = extent.iter().map(|&e| DeviceSize::from(e)).product::<DeviceSize>()
            * DeviceSize::from(texture.format().block_size());
        assert_eq!(range, surface_size, "range must cover the whole surface");
        self.command_common();

        let region = BufferImageCopy {
            buffer_offset: offset,
            image_subresource: ImageSubresourceLayers {
                aspects: view.subresource_range().aspects,
                mip_level: subresource.first_mipmap,
                base_array_layer: subresource.first_layer,
                layer_count: 1,
            },
            image_offset: [0; 3],
            image_extent: extent,
        };

        self.batches
            .switch_to(&self.shared.backend, self.handle, BatchKind::AnyOther);
        unsafe {
            self.shared.backend.cmd_copy_buffer_to_image(
                self.handle,
                buffer.handle(),
                texture.handle(),
                ImageLayout::TransferDstOptimal,
                &[region],
            )
        };
        self.push_reference(buffer);
        self.push_reference(view);
    }

    /// Builds an acceleration structure using its scratch buffer.
    pub fn build_acceleration_structure(&mut self, accel: &Arc<AccelerationStructure<B>>) {
        assert!(self.framebuffer.is_none(), "build inside a render pass");
        self.command_common();

        let scratch_buffer = accel.scratch_buffer();
        let Some(scratch_address) = scratch_buffer.device_address() else {
            unreachable!("scratch buffers are checked on creation");
        };

        self.batches
            .switch_to(&self.shared.backend, self.handle, BatchKind::AnyOther);
        unsafe {
            self.shared.backend.cmd_build_acceleration_structure(
                self.handle,
                accel.handle(),
                scratch_address,
            )
        };

        self.push_reference(accel);
        self.push_reference(scratch_buffer);

        for resource in accel.build_resources() {
            self.alloc.references_mut().push(resource.clone());
        }
    }

    fn push_image_barrier(
        &mut self,
        texture: &Texture<B>,
        src_stages: PipelineStages,
        dst_stages: PipelineStages,
        barrier: ImageMemoryBarrier<B>,
    ) {
        debug_assert_eq!(barrier.image, texture.handle());
        self.batches.push_image_barrier(
            &self.shared.backend,
            self.handle,
            src_stages,
            dst_stages,
            barrier,
        );
    }

    /// Transitions a subresource range of a texture from one usage to another.
    ///
    /// # Panics
    ///
    /// - Panics if `subresource` is out of the texture.
    /// - Panics if [`TextureUsage::GENERATE_MIPMAPS`] is combined with other usages.
    pub fn set_texture_barrier(
        &mut self,
        texture: &Arc<Texture<B>>,
        before: TextureUsage,
        after: TextureUsage,
        subresource: &TextureSubresourceInfo,
    ) {
        for usage in [before, after] {
            assert!(
                !usage.intersects(TextureUsage::GENERATE_MIPMAPS)
                    || usage == TextureUsage::GENERATE_MIPMAPS,
                "GENERATE_MIPMAPS must be used alone",
            );
        }
        debug_assert!(self.framebuffer.is_none() || self.is_second_level());
        self.command_common();

        let range = texture.subresource_range(subresource);
        let (src, dst) = texture.barrier_info(before, after);

        // The first mip can be in another layout than the rest.
        let mut ranges: SmallVec<[ImageSubresourceRange; 2]> = SmallVec::new();

        if range.base_mip_level == 0
            && range.level_count > 1
            && (texture.layout(before, 0) != texture.layout(before, 1)
                || texture.layout(after, 0) != texture.layout(after, 1))
        {
            ranges.push(ImageSubresourceRange {
                level_count: 1,
                ..range
            });
            ranges.push(ImageSubresourceRange {
                base_mip_level: 1,
                level_count: range.level_count - 1,
                ..range
            });
        } else {
            ranges.push(range);
        }

        for range in ranges {
            self.push_image_barrier(
                texture,
                src.stages,
                dst.stages,
                ImageMemoryBarrier {
                    src_access: src.access,
                    dst_access: dst.access,
                    old_layout: texture.layout(before, range.base_mip_level),
                    new_layout: texture.layout(after, range.base_mip_level),
                    image: texture.handle(),
                    subresource_range: range,
                },
            );
        }

        self.push_reference(texture);
    }

    /// Makes the writes of `before` to a range of a buffer visible to `after`. A `size` of
    /// [`WHOLE_SIZE`] covers the rest of the buffer.
    pub fn set_buffer_barrier(
        &mut self,
        buffer: &Arc<Buffer<B>>,
        before: BufferUsage,
        after: BufferUsage,
        offset: DeviceSize,
        size: DeviceSize,
    ) {
        assert!(offset < buffer.size());
        assert!(size == WHOLE_SIZE || offset + size <= buffer.size());
        debug_assert!(self.framebuffer.is_none() || self.is_second_level());
        self.command_common();

        let (src, dst) = buffer.barrier_info(before, after);

        self.batches.push_buffer_barrier(
            &self.shared.backend,
            self.handle,
            src.stages,
            dst.stages,
            BufferMemoryBarrier {
                src_access: src.access,
                dst_access: dst.access,
                buffer: buffer.handle(),
                offset,
                size,
            },
        );
        self.push_reference(buffer);
    }

    pub fn set_acceleration_structure_barrier(
        &mut self,
        accel: &Arc<AccelerationStructure<B>>,
        before: AccelerationStructureUsage,
        after: AccelerationStructureUsage,
    ) {
        debug_assert!(self.framebuffer.is_none() || self.is_second_level());
        self.command_common();

        let (src, dst) = AccelerationStructure::<B>::barrier_info(before, after);

        self.batches.push_memory_barrier(
            &self.shared.backend,
            self.handle,
            src.stages,
            dst.stages,
            MemoryBarrier {
                src_access: src.access,
                dst_access: dst.access,
            },
        );
        self.push_reference(accel);
    }

    /// Resets an occlusion query so that it can be begun again.
    pub fn reset_occlusion_query(&mut self, query: &Arc<OcclusionQuery<B>>) {
        assert!(self.framebuffer.is_none(), "query reset inside a render pass");
        self.command_common();

        self.batches
            .push_query_reset(&self.shared.backend, self.handle, query.pool(), query.index());
        self.push_reference(query);
    }

    pub fn begin_occlusion_query(&mut self, query: &Arc<OcclusionQuery<B>>) {
        self.command_common();

        self.batches
            .switch_to(&self.shared.backend, self.handle, BatchKind::AnyOther);
        unsafe {
            self.shared
                .backend
                .cmd_begin_query(self.handle, query.pool(), query.index())
        };
        self.push_reference(query);
    }

    pub fn end_occlusion_query(&mut self, query: &Arc<OcclusionQuery<B>>) {
        self.command_common();

        self.batches
            .switch_to(&self.shared.backend, self.handle, BatchKind::AnyOther);
        unsafe {
            self.shared
                .backend
                .cmd_end_query(self.handle, query.pool(), query.index())
        };
        self.push_reference(query);
    }

    /// Copies the 32-bit result of an occlusion query to `buffer` at `offset`.
    pub fn write_occlusion_query_result_to_buffer(
        &mut self,
        query: &Arc<OcclusionQuery<B>>,
        offset: DeviceSize,
        buffer: &Arc<Buffer<B>>,
    ) {
        assert!(buffer
            .usage()
            .intersects(BufferUsage::TRANSFER_DESTINATION));
        assert_eq!(offset % 4, 0);
        assert!(offset + QUERY_RESULT_SIZE <= buffer.size());
        assert!(self.framebuffer.is_none(), "query copy inside a render pass");
        self.command_common();

        self.batches.push_query_result_write(
            &self.shared.backend,
            self.handle,
            query.pool(),
            query.index(),
            buffer.handle(),
            offset,
        );
        self.push_reference(query);
        self.push_reference(buffer);
    }

    pub fn reset_timestamp_query(&mut self, query: &Arc<TimestampQuery<B>>) {
        assert!(self.framebuffer.is_none(), "query reset inside a render pass");
        self.command_common();

        self.batches
            .push_query_reset(&self.shared.backend, self.handle, query.pool(), query.index());
        self.push_reference(query);
    }

    /// Writes a timestamp once every previous command has completed.
    pub fn write_timestamp(&mut self, query: &Arc<TimestampQuery<B>>) {
        self.command_common();

        self.batches
            .switch_to(&self.shared.backend, self.handle, BatchKind::AnyOther);
        unsafe {
            self.shared
                .backend
                .cmd_write_timestamp(self.handle, query.pool(), query.index())
        };
        self.push_reference(query);
    }

    /// Executes a finalized secondary command buffer inside the open render pass. Once a
    /// secondary command buffer is pushed, the pass can't contain draws.
    ///
    /// The bound state is undefined afterwards. Pipelines, descriptor sets and dynamic state are
    /// bound again automatically; vertex and index buffers must be bound again by the caller.
    pub fn push_second_level_command_buffer(&mut self, command_buffer: &Arc<CommandBuffer<B>>) {
        assert!(!self.is_second_level());
        assert!(command_buffer.is_second_level() && command_buffer.is_finalized());
        let framebuffer = self
            .framebuffer
            .as_ref()
            .expect("secondary command buffers are executed inside a render pass");
        debug_assert_eq!(
            command_buffer.framebuffer.as_ref().map(|fb| fb.signature()),
            Some(framebuffer.signature()),
            "secondary command buffer recorded for an incompatible framebuffer",
        );
        assert_ne!(
            self.subpass_contents,
            Some(SubpassContents::Inline),
            "secondary command buffers pushed in a render pass with draws",
        );
        self.command_common();

        self.subpass_contents = Some(SubpassContents::SecondaryCommandBuffers);

        if self.render_pass_command_count == 0 {
            self.begin_render_pass_internal();
        }

        self.render_pass_command_count += 1;

        if command_buffer.has_rendered_to_default_framebuffer() {
            self.rendered_to_default_framebuffer = true;
        }

        self.batches.push_second_level(
            &self.shared.backend,
            self.handle,
            command_buffer.handle(),
        );
        self.push_reference(command_buffer);
    }
}

fn check_indirect<B: Backend>(
    buffer: &Buffer<B>,
    offset: DeviceSize,
    draw_count: u32,
    stride: u32,
) {
    assert!(buffer.usage().intersects(BufferUsage::INDIRECT_DRAW));
    assert_eq!(offset % 4, 0);
    assert!(
        offset + DeviceSize::from(stride) * DeviceSize::from(draw_count) <= buffer.size(),
        "indirect arguments out of the buffer",
    );
}

/// Resolves the sets the program uses and binds the ones that changed.
fn flush_descriptor_sets<B: Backend>(
    shared: &Shared<B>,
    cmdb: B::CommandBuffer,
    descriptor_sets: &mut [DescriptorSetState<B>; MAX_DESCRIPTOR_SETS],
    program: &ShaderProgram<B>,
    bind_point: PipelineBindPoint,
) -> Result<(), NativeError> {
    for (index, state) in descriptor_sets.iter_mut().enumerate() {
        if program.descriptor_set_mask() & (1 << index) == 0 {
            continue;
        }

        let set = state
            .flush(&shared.descriptor_set_factory, shared.config.validation)
            .inspect_err(|err| {
                log::error!(
                    "failed to allocate descriptor set {} of program `{}`: {}",
                    index,
                    program.name(),
                    err,
                );
            })?;

        if let Some(set) = set {
            unsafe {
                shared.backend.cmd_bind_descriptor_sets(
                    cmdb,
                    bind_point,
                    program.pipeline_layout(),
                    index as u32,
                    &[set],
                )
            };
        }
    }

    Ok(())
}

impl<B: Backend> fmt::Debug for CommandBuffer<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandBuffer")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("handle", &self.handle)
            .field("state", &self.state)
            .field("alloc", &self.alloc)
            .field("batches", &self.batches)
            .finish_non_exhaustive()
    }
}

impl<B: Backend> GrObject for CommandBuffer<B> {
    fn object_type(&self) -> GrObjectType {
        GrObjectType::CommandBuffer
    }

    fn uuid(&self) -> NonZero<u64> {
        self.id
    }
}

impl_id_counter!(CommandBuffer<B: Backend>);

#[cfg(test)]
mod tests {
    use crate::{
        backend::{
            null::{NullBackend, NullCommand, NullHandle},
            PipelineBindPoint, SubpassContents,
        },
        command_buffer::{CommandBufferFlags, CommandBufferInitInfo},
        format::Format,
        pipeline::{FaceSelection, PrimitiveTopology},
        resource::{BufferUsage, OcclusionQuery, TextureSubresourceInfo, TextureUsage},
        GrConfig, GrManager,
    };
    use std::sync::Arc;

    fn manager() -> (Arc<NullBackend>, GrManager<NullBackend>) {
        let backend = Arc::new(NullBackend::new());
        let manager = GrManager::new(backend.clone(), GrConfig::default()).unwrap();

        (backend, manager)
    }

    #[test]
    fn batches_flushed_before_draw() {
        let (backend, manager) = manager();
        let program = gr_graphics_program!(0, 0b1);
        let framebuffer = gr_framebuffer!(NullHandle::new(), [Format::R8G8B8A8Unorm], None);
        let texture = framebuffer.color_attachments()[0].view.texture().clone();
        let buffer = gr_buffer!(64, BufferUsage::STORAGE_FRAGMENT_WRITE | BufferUsage::VERTEX);
        let query = OcclusionQuery::<NullBackend>::from_handle(NullHandle::new(), 0);

        let mut cmdb = manager
            .new_command_buffer(CommandBufferInitInfo::default())
            .unwrap();
        cmdb.set_texture_barrier(
            &texture,
            TextureUsage::empty(),
            TextureUsage::FRAMEBUFFER_ATTACHMENT_WRITE,
            &TextureSubresourceInfo::whole(&texture),
        );
        cmdb.set_buffer_barrier(
            &buffer,
            BufferUsage::STORAGE_FRAGMENT_WRITE,
            BufferUsage::VERTEX,
            0,
            crate::WHOLE_SIZE,
        );
        cmdb.reset_occlusion_query(&query);
        cmdb.set_buffer_barrier(
            &buffer,
            BufferUsage::VERTEX,
            BufferUsage::STORAGE_FRAGMENT_WRITE,
            0,
            crate::WHOLE_SIZE,
        );
        cmdb.bind_shader_program(&program);
        cmdb.begin_render_pass(&framebuffer, 0, 0, u32::MAX, u32::MAX);
        cmdb.set_viewport(0, 0, 16, 16);
        cmdb.draw_arrays(PrimitiveTopology::TriangleList, 3, 1, 0, 0)
            .unwrap();

        let commands = backend.commands(cmdb.handle());
        assert!(matches!(
            commands[0],
            NullCommand::PipelineBarrier {
                image_barriers: 1,
                buffer_barriers: 1,
                ..
            },
        ));
        assert!(matches!(
            commands[1],
            NullCommand::ResetQueryPool { query_count: 1, .. },
        ));
        assert!(matches!(
            commands[2],
            NullCommand::PipelineBarrier {
                image_barriers: 0,
                buffer_barriers: 1,
                ..
            },
        ));
        assert!(matches!(commands[3], NullCommand::BeginRenderPass { .. }));
        assert!(matches!(
            commands.last(),
            Some(NullCommand::Draw { vertex_count: 3, .. }),
        ));
        assert_eq!(
            commands
                .iter()
                .filter(|c| matches!(c, NullCommand::PipelineBarrier { .. }))
                .count(),
            2,
        );

        cmdb.end_render_pass();
        cmdb.end_recording().unwrap();
    }

    #[test]
    fn pipeline_bound_only_on_change() {
        let (backend, manager) = manager();
        let program = gr_graphics_program!(0, 0b1);
        let framebuffer = gr_framebuffer!(NullHandle::new(), [Format::R8G8B8A8Unorm], None);

        let mut cmdb = manager
            .new_command_buffer(CommandBufferInitInfo::default())
            .unwrap();
        cmdb.bind_shader_program(&program);
        cmdb.begin_render_pass(&framebuffer, 0, 0, u32::MAX, u32::MAX);
        cmdb.set_viewport(0, 0, 16, 16);
        cmdb.draw_arrays(PrimitiveTopology::TriangleList, 3, 1, 0, 0)
            .unwrap();
        cmdb.draw_arrays(PrimitiveTopology::TriangleList, 6, 1, 0, 0)
            .unwrap();
        cmdb.draw_arrays(PrimitiveTopology::LineList, 2, 1, 0, 0)
            .unwrap();
        cmdb.end_render_pass();
        cmdb.end_recording().unwrap();

        let binds = backend
            .commands(cmdb.handle())
            .into_iter()
            .filter(|c| {
                matches!(
                    c,
                    NullCommand::BindPipeline {
                        bind_point: PipelineBindPoint::Graphics,
                        ..
                    },
                )
            })
            .count();
        assert_eq!(binds, 2);
        assert_eq!(backend.created_pipeline_count(), 2);
        assert_eq!(manager.stats().pipelines.cache_misses, 2);
    }

    #[test]
    fn empty_render_pass_is_recorded() {
        let (backend, manager) = manager();
        let framebuffer = gr_framebuffer!(NullHandle::new(), [Format::R8G8B8A8Unorm], None);

        let mut cmdb = manager
            .new_command_buffer(CommandBufferInitInfo::default())
            .unwrap();
        assert!(cmdb.is_empty());
        cmdb.begin_render_pass(&framebuffer, 0, 0, u32::MAX, u32::MAX);
        cmdb.end_render_pass();
        cmdb.end_recording().unwrap();

        assert!(!cmdb.is_empty());
        assert!(cmdb.is_finalized());

        let commands = backend.commands(cmdb.handle());
        assert_eq!(commands.len(), 2);
        assert!(matches!(
            commands[0],
            NullCommand::BeginRenderPass {
                contents: SubpassContents::Inline,
                ..
            },
        ));
        assert_eq!(commands[1], NullCommand::EndRenderPass);
    }

    #[test]
    fn secondary_command_buffers() {
        let (backend, manager) = manager();
        let program = gr_graphics_program!(0, 0b1);
        let framebuffer = gr_framebuffer!(NullHandle::new(), [Format::R8G8B8A8Unorm], None);

        let secondaries: Vec<_> = (0..2)
            .map(|_| {
                let mut cmdb = manager
                    .new_command_buffer(CommandBufferInitInfo {
                        flags: CommandBufferFlags::GENERAL_WORK | CommandBufferFlags::SECOND_LEVEL,
                        framebuffer: Some(framebuffer.clone()),
                        ..Default::default()
                    })
                    .unwrap();
                cmdb.bind_shader_program(&program);
                cmdb.set_viewport(0, 0, 16, 16);
                cmdb.draw_arrays(PrimitiveTopology::TriangleList, 3, 1, 0, 0)
                    .unwrap();
                cmdb.end_recording().unwrap();

                Arc::new(cmdb)
            })
            .collect();

        let mut cmdb = manager
            .new_command_buffer(CommandBufferInitInfo::default())
            .unwrap();
        cmdb.set_stencil_reference(FaceSelection::FRONT_AND_BACK, 7);
        cmdb.begin_render_pass(&framebuffer, 0, 0, u32::MAX, u32::MAX);

        for secondary in &secondaries {
            cmdb.push_second_level_command_buffer(secondary);
        }

        cmdb.end_render_pass();
        cmdb.end_recording().unwrap();

        let commands = backend.commands(cmdb.handle());
        let secondary_handles: Vec<_> = secondaries.iter().map(|c| c.handle()).collect();
        assert_eq!(
            commands,
            [
                NullCommand::SetStencilReference {
                    faces: FaceSelection::FRONT_AND_BACK,
                    value: 7,
                },
                NullCommand::BeginRenderPass {
                    render_pass: framebuffer.render_pass(),
                    framebuffer: framebuffer.handle(),
                    render_area: crate::backend::Rect2D {
                        x: 0,
                        y: 0,
                        width: 16,
                        height: 16,
                    },
                    contents: SubpassContents::SecondaryCommandBuffers,
                },
                NullCommand::ExecuteCommands {
                    command_buffers: secondary_handles,
                },
                NullCommand::EndRenderPass,
                NullCommand::SetStencilReference {
                    faces: FaceSelection::FRONT_AND_BACK,
                    value: 7,
                },
            ],
        );

        // The primary keeps the secondaries alive.
        assert_eq!(Arc::strong_count(&secondaries[0]), 2);
    }

    #[test]
    #[should_panic = "ended inside a render pass"]
    fn open_render_pass_at_end() {
        let (_backend, manager) = manager();
        let framebuffer = gr_framebuffer!(NullHandle::new(), [Format::R8G8B8A8Unorm], None);

        let mut cmdb = manager
            .new_command_buffer(CommandBufferInitInfo::default())
            .unwrap();
        cmdb.begin_render_pass(&framebuffer, 0, 0, u32::MAX, u32::MAX);
        let _ = cmdb.end_recording();
    }

    #[test]
    #[should_panic = "already inside a render pass"]
    fn double_begin_render_pass() {
        let (_backend, manager) = manager();
        let framebuffer = gr_framebuffer!(NullHandle::new(), [Format::R8G8B8A8Unorm], None);

        let mut cmdb = manager
            .new_command_buffer(CommandBufferInitInfo::default())
            .unwrap();
        cmdb.begin_render_pass(&framebuffer, 0, 0, u32::MAX, u32::MAX);
        cmdb.begin_render_pass(&framebuffer, 0, 0, u32::MAX, u32::MAX);
    }

    #[test]
    #[should_panic = "push constants don't match"]
    fn oversized_push_constants() {
        let (_backend, manager) = manager();
        let program = gr_compute_program!();

        let mut cmdb = manager
            .new_command_buffer(CommandBufferInitInfo::default())
            .unwrap();
        cmdb.bind_shader_program(&program);
        cmdb.set_push_constants(&[0u32; 8]);
    }

    #[test]
    fn compute_dispatch() {
        let (backend, manager) = manager();
        let program = gr_compute_program!();
        let buffer = gr_buffer!(
            256,
            BufferUsage::TRANSFER_DESTINATION | BufferUsage::STORAGE_COMPUTE_READ
        );

        let mut cmdb = manager
            .new_command_buffer(CommandBufferInitInfo {
                flags: CommandBufferFlags::COMPUTE_WORK,
                ..Default::default()
            })
            .unwrap();
        cmdb.fill_buffer(&buffer, 0, crate::WHOLE_SIZE, 0);
        cmdb.set_buffer_barrier(
            &buffer,
            BufferUsage::TRANSFER_DESTINATION,
            BufferUsage::STORAGE_COMPUTE_READ,
            0,
            crate::WHOLE_SIZE,
        );
        cmdb.bind_shader_program(&program);
        cmdb.set_push_constants(&[1u32, 2, 3, 4]);
        cmdb.dispatch_compute(4, 1, 1).unwrap();
        cmdb.end_recording().unwrap();

        let commands = backend.commands(cmdb.handle());
        assert!(matches!(
            commands[0],
            NullCommand::FillBuffer {
                size: 256,
                data: 0,
                ..
            },
        ));
        assert!(matches!(commands[1], NullCommand::PipelineBarrier { .. }));
        assert!(matches!(
            commands[2],
            NullCommand::BindPipeline {
                bind_point: PipelineBindPoint::Compute,
                ..
            },
        ));
        assert!(matches!(
            commands[3],
            NullCommand::PushConstants { size: 16, .. }
        ));
        assert_eq!(
            commands[4],
            NullCommand::Dispatch {
                group_counts: [4, 1, 1],
            },
        );
    }

    #[test]
    fn mipmap_generation_barriers() {
        let (backend, manager) = manager();
        let texture = gr_texture!(
            [64, 64],
            4,
            Format::R8G8B8A8Unorm,
            TextureUsage::GENERATE_MIPMAPS | TextureUsage::SAMPLED_FRAGMENT
        );
        let view = crate::resource::TextureView::from_handle(
            NullHandle::new(),
            texture.clone(),
            TextureSubresourceInfo::surface(0, 0),
        );

        let mut cmdb = manager
            .new_command_buffer(CommandBufferInitInfo::default())
            .unwrap();
        cmdb.generate_mipmaps_2d(&view);
        cmdb.end_recording().unwrap();

        let commands = backend.commands(cmdb.handle());
        let blits: Vec<_> = commands
            .iter()
            .filter_map(|c| match c {
                NullCommand::BlitImage { regions, .. } => Some(regions[0]),
                _ => None,
            })
            .collect();
        assert_eq!(blits.len(), 3);
        assert_eq!(blits[2].src_subresource.mip_level, 2);
        assert_eq!(blits[2].dst_offsets[1], [8, 8, 1]);

        // One batch before every blit, and one leaving the middle mips writable again.
        assert_eq!(
            commands
                .iter()
                .filter(|c| matches!(c, NullCommand::PipelineBarrier { .. }))
                .count(),
            4,
        );
        assert!(matches!(
            commands.last(),
            Some(NullCommand::PipelineBarrier {
                image_barriers: 1,
                ..
            }),
        ));
    }
}

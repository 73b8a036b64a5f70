// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! A backend that drives a Vulkan device through `ash`.
//!
//! The instance and the device are created by the application, which then hands the device to
//! [`VulkanBackend::new`] together with the queue families to use. The backend doesn't own the
//! device: it must be destroyed by the application after the backend and every object created
//! through it are gone.
//!
//! The acceleration structure and ray tracing pipeline commands need the
//! `VK_KHR_acceleration_structure` and `VK_KHR_ray_tracing_pipeline` extensions, enabled with
//! [`VulkanBackendCreateInfo::ray_tracing`].

use super::{
    Backend, BufferCopy, BufferImageCopy, ClearColorValue, CommandBufferBeginInfo,
    CommandBufferLevel, DescriptorPoolSize, DescriptorWrite, DescriptorWriteResource, ImageBlit,
    IndexType, PipelineBindPoint, Rect2D, RenderPassBeginInfo, ShaderBindingTables, Viewport,
};
use crate::{
    command_buffer::QueueType,
    format::Format,
    pipeline::{
        DynamicState, FaceSelection, GraphicsPipelineDesc, RasterizationOrder, StencilFaceState,
        MAX_COLOR_ATTACHMENTS, MAX_VERTEX_ATTRIBUTES,
    },
    resource::AccelerationStructureType,
    shader::{ShaderStageDesc, ShaderStages},
    sync::{DependencyInfo, ImageLayout, ImageSubresourceRange},
    DeviceSize, NativeError, NonExhaustive,
};
use ash::{khr, vk};
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::{fmt, slice, time::Duration};

mod conv;

/// Parameters to create a [`VulkanBackend`].
#[derive(Clone, Debug)]
pub struct VulkanBackendCreateInfo {
    /// Queue family of the queue that takes graphics, compute and transfer work. Queue `0` of
    /// the family is used.
    ///
    /// The default value is `0`.
    pub general_queue_family_index: u32,

    /// Queue family of a dedicated compute queue, if the device was created with one. Queue `0`
    /// of the family is used.
    ///
    /// The default value is `None`.
    pub compute_queue_family_index: Option<u32>,

    /// Whether `VK_KHR_acceleration_structure` and `VK_KHR_ray_tracing_pipeline` are enabled on
    /// the device.
    ///
    /// The default value is `false`.
    pub ray_tracing: bool,

    /// Whether `VK_AMD_rasterization_order` is enabled on the device. Without it,
    /// [`RasterizationOrder::Relaxed`] behaves like [`RasterizationOrder::Ordered`].
    ///
    /// The default value is `false`.
    pub rasterization_order: bool,

    pub _ne: NonExhaustive,
}

impl Default for VulkanBackendCreateInfo {
    #[inline]
    fn default() -> Self {
        Self {
            general_queue_family_index: 0,
            compute_queue_family_index: None,
            ray_tracing: false,
            rasterization_order: false,
            _ne: NonExhaustive(()),
        }
    }
}

/// The geometry an acceleration structure is built from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccelerationStructureGeometry {
    /// Triangles of a bottom level structure.
    Triangles {
        vertex_format: Format,
        vertex_address: DeviceSize,
        vertex_stride: DeviceSize,
        max_vertex: u32,
        index_type: IndexType,
        index_address: DeviceSize,
        triangle_count: u32,
    },
    /// Instances of bottom level structures, for a top level structure.
    Instances {
        address: DeviceSize,
        instance_count: u32,
    },
}

/// A native acceleration structure, and what it is built from.
#[derive(Debug)]
pub struct VulkanAccelerationStructure {
    pub handle: vk::AccelerationStructureKHR,
    pub geometry: AccelerationStructureGeometry,
}

impl VulkanAccelerationStructure {
    #[inline]
    pub fn ty(&self) -> AccelerationStructureType {
        match self.geometry {
            AccelerationStructureGeometry::Triangles { .. } => {
                AccelerationStructureType::BottomLevel
            }
            AccelerationStructureGeometry::Instances { .. } => AccelerationStructureType::TopLevel,
        }
    }
}

struct Queue {
    family_index: u32,
    // Submissions to a queue must be externally synchronized.
    handle: Mutex<vk::Queue>,
}

/// A [`Backend`] on top of an `ash` device.
pub struct VulkanBackend {
    device: ash::Device,
    general_queue: Queue,
    compute_queue: Option<Queue>,
    acceleration_structure_fns: Option<khr::acceleration_structure::Device>,
    ray_tracing_pipeline_fns: Option<khr::ray_tracing_pipeline::Device>,
    rasterization_order: bool,
}

impl VulkanBackend {
    /// Creates a backend that records into and submits to `device`.
    ///
    /// # Safety
    ///
    /// - `device` must have been created from `instance`, with a queue in each of the queue
    ///   families of `create_info`, and with the extensions that `create_info` says are enabled.
    /// - `device` must outlive the backend and every object created through it.
    pub unsafe fn new(
        instance: &ash::Instance,
        device: ash::Device,
        create_info: VulkanBackendCreateInfo,
    ) -> Self {
        let VulkanBackendCreateInfo {
            general_queue_family_index,
            compute_queue_family_index,
            ray_tracing,
            rasterization_order,
            _ne: _,
        } = create_info;

        let queue = |family_index| Queue {
            family_index,
            handle: Mutex::new(unsafe { device.get_device_queue(family_index, 0) }),
        };
        let general_queue = queue(general_queue_family_index);
        let compute_queue = compute_queue_family_index
            .filter(|&family_index| family_index != general_queue_family_index)
            .map(queue);

        let (acceleration_structure_fns, ray_tracing_pipeline_fns) = if ray_tracing {
            (
                Some(khr::acceleration_structure::Device::new(instance, &device)),
                Some(khr::ray_tracing_pipeline::Device::new(instance, &device)),
            )
        } else {
            (None, None)
        };

        log::debug!(
            "created a Vulkan backend with general queue family {}, compute queue family {:?}",
            general_queue_family_index,
            compute_queue.as_ref().map(|queue| queue.family_index),
        );

        VulkanBackend {
            device,
            general_queue,
            compute_queue,
            acceleration_structure_fns,
            ray_tracing_pipeline_fns,
            rasterization_order,
        }
    }

    #[inline]
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    fn queue(&self, family_index: u32) -> &Queue {
        match &self.compute_queue {
            Some(queue) if queue.family_index == family_index => queue,
            _ => {
                debug_assert_eq!(self.general_queue.family_index, family_index);
                &self.general_queue
            }
        }
    }

    /// # Panics
    ///
    /// - Panics if ray tracing is not enabled.
    fn acceleration_structure_fns(&self) -> &khr::acceleration_structure::Device {
        self.acceleration_structure_fns
            .as_ref()
            .expect("ray tracing is not enabled on the backend")
    }

    /// # Panics
    ///
    /// - Panics if ray tracing is not enabled.
    fn ray_tracing_pipeline_fns(&self) -> &khr::ray_tracing_pipeline::Device {
        self.ray_tracing_pipeline_fns
            .as_ref()
            .expect("ray tracing is not enabled on the backend")
    }
}

impl fmt::Debug for VulkanBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VulkanBackend")
            .field("device", &self.device.handle())
            .field("general_queue_family", &self.general_queue.family_index)
            .field(
                "compute_queue_family",
                &self.compute_queue.as_ref().map(|queue| queue.family_index),
            )
            .field("ray_tracing", &self.ray_tracing_pipeline_fns.is_some())
            .finish_non_exhaustive()
    }
}

impl Backend for VulkanBackend {
    type CommandPool = vk::CommandPool;
    type CommandBuffer = vk::CommandBuffer;
    type Fence = vk::Fence;
    type Pipeline = vk::Pipeline;
    type PipelineLayout = vk::PipelineLayout;
    type ShaderModule = vk::ShaderModule;
    type DescriptorSetLayout = vk::DescriptorSetLayout;
    type DescriptorPool = vk::DescriptorPool;
    type DescriptorSet = vk::DescriptorSet;
    type Buffer = vk::Buffer;
    type Image = vk::Image;
    type ImageView = vk::ImageView;
    type Sampler = vk::Sampler;
    type QueryPool = vk::QueryPool;
    type RenderPass = vk::RenderPass;
    type Framebuffer = vk::Framebuffer;
    type AccelerationStructure = VulkanAccelerationStructure;

    fn queue_family_index(&self, queue: QueueType) -> Option<u32> {
        match queue {
            QueueType::General => Some(self.general_queue.family_index),
            QueueType::Compute => self.compute_queue.as_ref().map(|queue| queue.family_index),
        }
    }

    fn wait_idle(&self) -> Result<(), NativeError> {
        // Waiting for the device also accesses every queue.
        let _general = self.general_queue.handle.lock();
        let _compute = self.compute_queue.as_ref().map(|queue| queue.handle.lock());

        unsafe { self.device.device_wait_idle() }?;

        Ok(())
    }

    fn create_command_pool(&self, queue_family_index: u32) -> Result<vk::CommandPool, NativeError> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family_index);

        Ok(unsafe { self.device.create_command_pool(&create_info, None) }?)
    }

    unsafe fn destroy_command_pool(&self, pool: vk::CommandPool) {
        unsafe { self.device.destroy_command_pool(pool, None) };
    }

    unsafe fn allocate_command_buffer(
        &self,
        pool: vk::CommandPool,
        level: CommandBufferLevel,
    ) -> Result<vk::CommandBuffer, NativeError> {
        let allocate_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(level.into())
            .command_buffer_count(1);
        let command_buffers = unsafe { self.device.allocate_command_buffers(&allocate_info) }?;

        Ok(command_buffers[0])
    }

    unsafe fn free_command_buffer(&self, pool: vk::CommandPool, cmdb: vk::CommandBuffer) {
        unsafe { self.device.free_command_buffers(pool, &[cmdb]) };
    }

    unsafe fn reset_command_buffer(&self, cmdb: vk::CommandBuffer) -> Result<(), NativeError> {
        unsafe {
            self.device
                .reset_command_buffer(cmdb, vk::CommandBufferResetFlags::empty())
        }?;

        Ok(())
    }

    unsafe fn begin_command_buffer(
        &self,
        cmdb: vk::CommandBuffer,
        info: &CommandBufferBeginInfo<Self>,
    ) -> Result<(), NativeError> {
        let inheritance_info = info.inheritance.as_ref().map(|inheritance| {
            vk::CommandBufferInheritanceInfo::default()
                .render_pass(inheritance.render_pass)
                .subpass(0)
                .framebuffer(inheritance.framebuffer)
        });

        let mut begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        if let Some(inheritance_info) = &inheritance_info {
            begin_info = begin_info
                .flags(
                    vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT
                        | vk::CommandBufferUsageFlags::RENDER_PASS_CONTINUE,
                )
                .inheritance_info(inheritance_info);
        }

        unsafe { self.device.begin_command_buffer(cmdb, &begin_info) }?;

        Ok(())
    }

    unsafe fn end_command_buffer(&self, cmdb: vk::CommandBuffer) -> Result<(), NativeError> {
        unsafe { self.device.end_command_buffer(cmdb) }?;

        Ok(())
    }

    unsafe fn queue_submit(
        &self,
        queue_family_index: u32,
        command_buffers: &[vk::CommandBuffer],
        fence: vk::Fence,
    ) -> Result<(), NativeError> {
        let submit_info = vk::SubmitInfo::default().command_buffers(command_buffers);
        let queue = self.queue(queue_family_index).handle.lock();

        unsafe { self.device.queue_submit(*queue, &[submit_info], fence) }?;

        Ok(())
    }

    fn create_fence(&self) -> Result<vk::Fence, NativeError> {
        let create_info = vk::FenceCreateInfo::default();

        Ok(unsafe { self.device.create_fence(&create_info, None) }?)
    }

    unsafe fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) };
    }

    unsafe fn fence_status(&self, fence: vk::Fence) -> Result<bool, NativeError> {
        Ok(unsafe { self.device.get_fence_status(fence) }?)
    }

    unsafe fn wait_fence(&self, fence: vk::Fence, timeout: Duration) -> Result<bool, NativeError> {
        let timeout_ns = u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX);

        match unsafe { self.device.wait_for_fences(&[fence], true, timeout_ns) } {
            Ok(()) => Ok(true),
            Err(vk::Result::TIMEOUT) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    unsafe fn create_graphics_pipeline(
        &self,
        desc: &GraphicsPipelineDesc<Self>,
    ) -> Result<vk::Pipeline, NativeError> {
        let stages: SmallVec<[_; 5]> = desc.stages.iter().map(shader_stage_create_info).collect();

        let vertex_bindings: SmallVec<[_; MAX_VERTEX_ATTRIBUTES]> = desc
            .vertex_bindings
            .iter()
            .map(|binding| vk::VertexInputBindingDescription {
                binding: binding.binding,
                stride: binding.stride,
                input_rate: binding.step_rate.into(),
            })
            .collect();
        let vertex_attributes: SmallVec<[_; MAX_VERTEX_ATTRIBUTES]> = desc
            .vertex_attributes
            .iter()
            .map(|attribute| vk::VertexInputAttributeDescription {
                location: attribute.location,
                binding: attribute.binding,
                format: attribute.format.into(),
                offset: attribute.offset,
            })
            .collect();
        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&vertex_bindings)
            .vertex_attribute_descriptions(&vertex_attributes);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(desc.input_assembly.topology.into())
            .primitive_restart_enable(desc.input_assembly.primitive_restart_enable);

        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization = &desc.rasterization;
        let mut rasterization_order = vk::PipelineRasterizationStateRasterizationOrderAMD::default()
            .rasterization_order(match rasterization.rasterization_order {
                RasterizationOrder::Ordered => vk::RasterizationOrderAMD::STRICT,
                RasterizationOrder::Relaxed => vk::RasterizationOrderAMD::RELAXED,
            });
        let mut rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(rasterization.fill_mode.into())
            .cull_mode(rasterization.cull_mode.into())
            .front_face(rasterization.front_face.into())
            .depth_bias_enable(rasterization.depth_bias_enable)
            .depth_bias_constant_factor(rasterization.depth_bias_constant_factor)
            .depth_bias_slope_factor(rasterization.depth_bias_slope_factor)
            .line_width(1.0);

        if self.rasterization_order {
            rasterization_state = rasterization_state.push_next(&mut rasterization_order);
        }

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .alpha_to_coverage_enable(
                desc.color_blend
                    .as_ref()
                    .is_some_and(|color_blend| color_blend.alpha_to_coverage_enable),
            );

        let depth_stencil_state = desc.depth_stencil.map(|depth_stencil| {
            let stencil = depth_stencil.stencil.unwrap_or_default();

            vk::PipelineDepthStencilStateCreateInfo::default()
                .depth_test_enable(depth_stencil.depth_test_enable())
                .depth_write_enable(depth_stencil.depth.is_some_and(|depth| depth.write_enable))
                .depth_compare_op(
                    depth_stencil
                        .depth
                        .map_or(vk::CompareOp::ALWAYS, |depth| depth.compare_op.into()),
                )
                .stencil_test_enable(depth_stencil.stencil_test_enable())
                .front(stencil_op_state(stencil.front))
                .back(stencil_op_state(stencil.back))
        });

        let color_blend_attachments: SmallVec<[_; MAX_COLOR_ATTACHMENTS]> = desc
            .color_blend
            .iter()
            .flat_map(|color_blend| &color_blend.attachments)
            .map(|attachment| {
                vk::PipelineColorBlendAttachmentState::default()
                    .blend_enable(attachment.blend_enable())
                    .src_color_blend_factor(attachment.src_color_blend_factor.into())
                    .dst_color_blend_factor(attachment.dst_color_blend_factor.into())
                    .color_blend_op(attachment.color_blend_op.into())
                    .src_alpha_blend_factor(attachment.src_alpha_blend_factor.into())
                    .dst_alpha_blend_factor(attachment.dst_alpha_blend_factor.into())
                    .alpha_blend_op(attachment.alpha_blend_op.into())
                    .color_write_mask(attachment.color_write_mask.into())
            })
            .collect();
        let color_blend_state =
            vk::PipelineColorBlendStateCreateInfo::default().attachments(&color_blend_attachments);

        let dynamic_states = DynamicState::PIPELINE_DYNAMIC_STATES.map(vk::DynamicState::from);
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let mut create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(desc.layout)
            .render_pass(desc.render_pass)
            .subpass(0);

        if let Some(depth_stencil_state) = &depth_stencil_state {
            create_info = create_info.depth_stencil_state(depth_stencil_state);
        }

        let pipelines = unsafe {
            self.device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
        }
        .map_err(|(_, err)| err)?;

        Ok(pipelines[0])
    }

    unsafe fn create_compute_pipeline(
        &self,
        stage: &ShaderStageDesc<Self>,
        layout: vk::PipelineLayout,
    ) -> Result<vk::Pipeline, NativeError> {
        let create_info = vk::ComputePipelineCreateInfo::default()
            .stage(shader_stage_create_info(stage))
            .layout(layout);

        let pipelines = unsafe {
            self.device
                .create_compute_pipelines(vk::PipelineCache::null(), &[create_info], None)
        }
        .map_err(|(_, err)| err)?;

        Ok(pipelines[0])
    }

    unsafe fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe { self.device.destroy_pipeline(pipeline, None) };
    }

    fn create_descriptor_pool(
        &self,
        max_sets: u32,
        pool_sizes: &[DescriptorPoolSize],
    ) -> Result<vk::DescriptorPool, NativeError> {
        let pool_sizes: SmallVec<[_; 8]> = pool_sizes
            .iter()
            .map(|pool_size| vk::DescriptorPoolSize {
                ty: pool_size.ty.into(),
                descriptor_count: pool_size.descriptor_count,
            })
            .collect();
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(&pool_sizes);

        Ok(unsafe { self.device.create_descriptor_pool(&create_info, None) }?)
    }

    unsafe fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        unsafe { self.device.destroy_descriptor_pool(pool, None) };
    }

    unsafe fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> Result<vk::DescriptorSet, NativeError> {
        let allocate_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(slice::from_ref(&layout));
        let sets = unsafe { self.device.allocate_descriptor_sets(&allocate_info) }?;

        Ok(sets[0])
    }

    unsafe fn update_descriptor_set(
        &self,
        set: vk::DescriptorSet,
        writes: &[DescriptorWrite<'_, Self>],
    ) {
        let update = |write: vk::WriteDescriptorSet<'_>| unsafe {
            self.device.update_descriptor_sets(&[write], &[]);
        };

        for write in writes {
            let base = vk::WriteDescriptorSet::default()
                .dst_set(set)
                .dst_binding(write.binding)
                .dst_array_element(write.array_element)
                .descriptor_type(write.resource.descriptor_type().into());

            match write.resource {
                DescriptorWriteResource::CombinedImageSampler {
                    view,
                    layout,
                    sampler,
                } => {
                    let image_info = vk::DescriptorImageInfo {
                        sampler,
                        image_view: view,
                        image_layout: layout.into(),
                    };
                    update(base.image_info(slice::from_ref(&image_info)));
                }
                DescriptorWriteResource::SampledImage { view, layout } => {
                    let image_info = vk::DescriptorImageInfo {
                        sampler: vk::Sampler::null(),
                        image_view: view,
                        image_layout: layout.into(),
                    };
                    update(base.image_info(slice::from_ref(&image_info)));
                }
                DescriptorWriteResource::Sampler(sampler) => {
                    let image_info = vk::DescriptorImageInfo {
                        sampler,
                        image_view: vk::ImageView::null(),
                        image_layout: vk::ImageLayout::UNDEFINED,
                    };
                    update(base.image_info(slice::from_ref(&image_info)));
                }
                DescriptorWriteResource::UniformBuffer {
                    buffer,
                    offset,
                    range,
                }
                | DescriptorWriteResource::StorageBuffer {
                    buffer,
                    offset,
                    range,
                } => {
                    let buffer_info = vk::DescriptorBufferInfo {
                        buffer,
                        offset,
                        range,
                    };
                    update(base.buffer_info(slice::from_ref(&buffer_info)));
                }
                DescriptorWriteResource::StorageImage { view } => {
                    let image_info = vk::DescriptorImageInfo {
                        sampler: vk::Sampler::null(),
                        image_view: view,
                        image_layout: vk::ImageLayout::GENERAL,
                    };
                    update(base.image_info(slice::from_ref(&image_info)));
                }
                DescriptorWriteResource::AccelerationStructure(acceleration_structure) => {
                    let mut acceleration_structure_info =
                        vk::WriteDescriptorSetAccelerationStructureKHR::default()
                            .acceleration_structures(slice::from_ref(
                                &acceleration_structure.handle,
                            ));
                    update(
                        base.descriptor_count(1)
                            .push_next(&mut acceleration_structure_info),
                    );
                }
            }
        }
    }

    unsafe fn cmd_bind_pipeline(
        &self,
        cmdb: vk::CommandBuffer,
        bind_point: PipelineBindPoint,
        pipeline: vk::Pipeline,
    ) {
        unsafe {
            self.device
                .cmd_bind_pipeline(cmdb, bind_point.into(), pipeline)
        };
    }

    unsafe fn cmd_bind_descriptor_sets(
        &self,
        cmdb: vk::CommandBuffer,
        bind_point: PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    ) {
        unsafe {
            self.device
                .cmd_bind_descriptor_sets(cmdb, bind_point.into(), layout, first_set, sets, &[])
        };
    }

    unsafe fn cmd_bind_vertex_buffers(
        &self,
        cmdb: vk::CommandBuffer,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[DeviceSize],
    ) {
        unsafe {
            self.device
                .cmd_bind_vertex_buffers(cmdb, first_binding, buffers, offsets)
        };
    }

    unsafe fn cmd_bind_index_buffer(
        &self,
        cmdb: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: DeviceSize,
        index_type: IndexType,
    ) {
        unsafe {
            self.device
                .cmd_bind_index_buffer(cmdb, buffer, offset, index_type.into())
        };
    }

    unsafe fn cmd_set_viewport(&self, cmdb: vk::CommandBuffer, viewport: &Viewport) {
        unsafe { self.device.cmd_set_viewport(cmdb, 0, &[viewport.into()]) };
    }

    unsafe fn cmd_set_scissor(&self, cmdb: vk::CommandBuffer, scissor: &Rect2D) {
        unsafe { self.device.cmd_set_scissor(cmdb, 0, &[scissor.into()]) };
    }

    unsafe fn cmd_set_stencil_compare_mask(
        &self,
        cmdb: vk::CommandBuffer,
        faces: FaceSelection,
        mask: u32,
    ) {
        unsafe {
            self.device
                .cmd_set_stencil_compare_mask(cmdb, faces.into(), mask)
        };
    }

    unsafe fn cmd_set_stencil_write_mask(
        &self,
        cmdb: vk::CommandBuffer,
        faces: FaceSelection,
        mask: u32,
    ) {
        unsafe { self.device.cmd_set_stencil_write_mask(cmdb, faces.into(), mask) };
    }

    unsafe fn cmd_set_stencil_reference(
        &self,
        cmdb: vk::CommandBuffer,
        faces: FaceSelection,
        reference: u32,
    ) {
        unsafe {
            self.device
                .cmd_set_stencil_reference(cmdb, faces.into(), reference)
        };
    }

    unsafe fn cmd_set_line_width(&self, cmdb: vk::CommandBuffer, width: f32) {
        unsafe { self.device.cmd_set_line_width(cmdb, width) };
    }

    unsafe fn cmd_push_constants(
        &self,
        cmdb: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: ShaderStages,
        offset: u32,
        data: &[u8],
    ) {
        unsafe {
            self.device
                .cmd_push_constants(cmdb, layout, stages.into(), offset, data)
        };
    }

    unsafe fn cmd_begin_render_pass(
        &self,
        cmdb: vk::CommandBuffer,
        info: &RenderPassBeginInfo<'_, Self>,
    ) {
        let clear_values: SmallVec<[vk::ClearValue; MAX_COLOR_ATTACHMENTS + 1]> =
            info.clear_values.iter().map(Into::into).collect();
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(info.render_pass)
            .framebuffer(info.framebuffer)
            .render_area((&info.render_area).into())
            .clear_values(&clear_values);

        unsafe {
            self.device
                .cmd_begin_render_pass(cmdb, &begin_info, info.contents.into())
        };
    }

    unsafe fn cmd_end_render_pass(&self, cmdb: vk::CommandBuffer) {
        unsafe { self.device.cmd_end_render_pass(cmdb) };
    }

    unsafe fn cmd_draw(
        &self,
        cmdb: vk::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        unsafe {
            self.device.cmd_draw(
                cmdb,
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            )
        };
    }

    unsafe fn cmd_draw_indexed(
        &self,
        cmdb: vk::CommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        unsafe {
            self.device.cmd_draw_indexed(
                cmdb,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            )
        };
    }

    unsafe fn cmd_draw_indirect(
        &self,
        cmdb: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: DeviceSize,
        draw_count: u32,
        stride: u32,
    ) {
        unsafe {
            self.device
                .cmd_draw_indirect(cmdb, buffer, offset, draw_count, stride)
        };
    }

    unsafe fn cmd_draw_indexed_indirect(
        &self,
        cmdb: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: DeviceSize,
        draw_count: u32,
        stride: u32,
    ) {
        unsafe {
            self.device
                .cmd_draw_indexed_indirect(cmdb, buffer, offset, draw_count, stride)
        };
    }

    unsafe fn cmd_dispatch(
        &self,
        cmdb: vk::CommandBuffer,
        group_count_x: u32,
        group_count_y: u32,
        group_count_z: u32,
    ) {
        unsafe {
            self.device
                .cmd_dispatch(cmdb, group_count_x, group_count_y, group_count_z)
        };
    }

    unsafe fn cmd_trace_rays(
        &self,
        cmdb: vk::CommandBuffer,
        tables: &ShaderBindingTables,
        width: u32,
        height: u32,
        depth: u32,
    ) {
        unsafe {
            self.ray_tracing_pipeline_fns().cmd_trace_rays(
                cmdb,
                &(&tables.raygen).into(),
                &(&tables.miss).into(),
                &(&tables.hit).into(),
                &(&tables.callable).into(),
                width,
                height,
                depth,
            )
        };
    }

    unsafe fn cmd_pipeline_barrier(
        &self,
        cmdb: vk::CommandBuffer,
        dependency_info: &DependencyInfo<'_, Self>,
    ) {
        let memory_barriers: SmallVec<[_; 2]> = dependency_info
            .memory_barriers
            .iter()
            .map(|barrier| {
                vk::MemoryBarrier::default()
                    .src_access_mask(barrier.src_access.into())
                    .dst_access_mask(barrier.dst_access.into())
            })
            .collect();
        let buffer_memory_barriers: SmallVec<[_; 8]> = dependency_info
            .buffer_memory_barriers
            .iter()
            .map(|barrier| {
                vk::BufferMemoryBarrier::default()
                    .src_access_mask(barrier.src_access.into())
                    .dst_access_mask(barrier.dst_access.into())
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .buffer(barrier.buffer)
                    .offset(barrier.offset)
                    .size(barrier.size)
            })
            .collect();
        let image_memory_barriers: SmallVec<[_; 8]> = dependency_info
            .image_memory_barriers
            .iter()
            .map(|barrier| {
                vk::ImageMemoryBarrier::default()
                    .src_access_mask(barrier.src_access.into())
                    .dst_access_mask(barrier.dst_access.into())
                    .old_layout(barrier.old_layout.into())
                    .new_layout(barrier.new_layout.into())
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(barrier.image)
                    .subresource_range((&barrier.subresource_range).into())
            })
            .collect();

        unsafe {
            self.device.cmd_pipeline_barrier(
                cmdb,
                dependency_info.src_stages.into(),
                dependency_info.dst_stages.into(),
                vk::DependencyFlags::empty(),
                &memory_barriers,
                &buffer_memory_barriers,
                &image_memory_barriers,
            )
        };
    }

    unsafe fn cmd_reset_query_pool(
        &self,
        cmdb: vk::CommandBuffer,
        pool: vk::QueryPool,
        first_query: u32,
        query_count: u32,
    ) {
        unsafe {
            self.device
                .cmd_reset_query_pool(cmdb, pool, first_query, query_count)
        };
    }

    unsafe fn cmd_begin_query(&self, cmdb: vk::CommandBuffer, pool: vk::QueryPool, query: u32) {
        unsafe {
            self.device
                .cmd_begin_query(cmdb, pool, query, vk::QueryControlFlags::empty())
        };
    }

    unsafe fn cmd_end_query(&self, cmdb: vk::CommandBuffer, pool: vk::QueryPool, query: u32) {
        unsafe { self.device.cmd_end_query(cmdb, pool, query) };
    }

    unsafe fn cmd_write_timestamp(&self, cmdb: vk::CommandBuffer, pool: vk::QueryPool, query: u32) {
        unsafe {
            self.device.cmd_write_timestamp(
                cmdb,
                vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                pool,
                query,
            )
        };
    }

    unsafe fn cmd_copy_query_pool_results(
        &self,
        cmdb: vk::CommandBuffer,
        pool: vk::QueryPool,
        first_query: u32,
        query_count: u32,
        dst_buffer: vk::Buffer,
        dst_offset: DeviceSize,
        stride: DeviceSize,
    ) {
        unsafe {
            self.device.cmd_copy_query_pool_results(
                cmdb,
                pool,
                first_query,
                query_count,
                dst_buffer,
                dst_offset,
                stride,
                vk::QueryResultFlags::WAIT,
            )
        };
    }

    unsafe fn cmd_execute_commands(
        &self,
        cmdb: vk::CommandBuffer,
        command_buffers: &[vk::CommandBuffer],
    ) {
        unsafe { self.device.cmd_execute_commands(cmdb, command_buffers) };
    }

    unsafe fn cmd_fill_buffer(
        &self,
        cmdb: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: DeviceSize,
        size: DeviceSize,
        data: u32,
    ) {
        unsafe { self.device.cmd_fill_buffer(cmdb, buffer, offset, size, data) };
    }

    unsafe fn cmd_copy_buffer(
        &self,
        cmdb: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Buffer,
        regions: &[BufferCopy],
    ) {
        let regions: SmallVec<[vk::BufferCopy; 1]> = regions.iter().map(Into::into).collect();

        unsafe { self.device.cmd_copy_buffer(cmdb, src, dst, &regions) };
    }

    unsafe fn cmd_copy_buffer_to_image(
        &self,
        cmdb: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Image,
        dst_layout: ImageLayout,
        regions: &[BufferImageCopy],
    ) {
        let regions: SmallVec<[vk::BufferImageCopy; 1]> =
            regions.iter().map(Into::into).collect();

        unsafe {
            self.device
                .cmd_copy_buffer_to_image(cmdb, src, dst, dst_layout.into(), &regions)
        };
    }

    unsafe fn cmd_blit_image(
        &self,
        cmdb: vk::CommandBuffer,
        src: vk::Image,
        src_layout: ImageLayout,
        dst: vk::Image,
        dst_layout: ImageLayout,
        regions: &[ImageBlit],
    ) {
        let regions: SmallVec<[vk::ImageBlit; 1]> = regions.iter().map(Into::into).collect();

        unsafe {
            self.device.cmd_blit_image(
                cmdb,
                src,
                src_layout.into(),
                dst,
                dst_layout.into(),
                &regions,
                vk::Filter::LINEAR,
            )
        };
    }

    unsafe fn cmd_clear_color_image(
        &self,
        cmdb: vk::CommandBuffer,
        image: vk::Image,
        layout: ImageLayout,
        color: &ClearColorValue,
        range: &ImageSubresourceRange,
    ) {
        unsafe {
            self.device.cmd_clear_color_image(
                cmdb,
                image,
                layout.into(),
                &color.into(),
                &[range.into()],
            )
        };
    }

    unsafe fn cmd_clear_depth_stencil_image(
        &self,
        cmdb: vk::CommandBuffer,
        image: vk::Image,
        layout: ImageLayout,
        depth: f32,
        stencil: u32,
        range: &ImageSubresourceRange,
    ) {
        unsafe {
            self.device.cmd_clear_depth_stencil_image(
                cmdb,
                image,
                layout.into(),
                &vk::ClearDepthStencilValue { depth, stencil },
                &[range.into()],
            )
        };
    }

    unsafe fn cmd_build_acceleration_structure(
        &self,
        cmdb: vk::CommandBuffer,
        acceleration_structure: &VulkanAccelerationStructure,
        scratch_address: DeviceSize,
    ) {
        let (ty, geometry, primitive_count) = match acceleration_structure.geometry {
            AccelerationStructureGeometry::Triangles {
                vertex_format,
                vertex_address,
                vertex_stride,
                max_vertex,
                index_type,
                index_address,
                triangle_count,
            } => {
                let triangles = vk::AccelerationStructureGeometryTrianglesDataKHR::default()
                    .vertex_format(vertex_format.into())
                    .vertex_data(vk::DeviceOrHostAddressConstKHR {
                        device_address: vertex_address,
                    })
                    .vertex_stride(vertex_stride)
                    .max_vertex(max_vertex)
                    .index_type(index_type.into())
                    .index_data(vk::DeviceOrHostAddressConstKHR {
                        device_address: index_address,
                    });
                let geometry = vk::AccelerationStructureGeometryKHR::default()
                    .geometry_type(vk::GeometryTypeKHR::TRIANGLES)
                    .geometry(vk::AccelerationStructureGeometryDataKHR { triangles })
                    .flags(vk::GeometryFlagsKHR::OPAQUE);

                (
                    vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL,
                    geometry,
                    triangle_count,
                )
            }
            AccelerationStructureGeometry::Instances {
                address,
                instance_count,
            } => {
                let instances = vk::AccelerationStructureGeometryInstancesDataKHR::default()
                    .array_of_pointers(false)
                    .data(vk::DeviceOrHostAddressConstKHR {
                        device_address: address,
                    });
                let geometry = vk::AccelerationStructureGeometryKHR::default()
                    .geometry_type(vk::GeometryTypeKHR::INSTANCES)
                    .geometry(vk::AccelerationStructureGeometryDataKHR { instances });

                (
                    vk::AccelerationStructureTypeKHR::TOP_LEVEL,
                    geometry,
                    instance_count,
                )
            }
        };

        let build_info = vk::AccelerationStructureBuildGeometryInfoKHR::default()
            .ty(ty)
            .flags(vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE)
            .mode(vk::BuildAccelerationStructureModeKHR::BUILD)
            .dst_acceleration_structure(acceleration_structure.handle)
            .geometries(slice::from_ref(&geometry))
            .scratch_data(vk::DeviceOrHostAddressKHR {
                device_address: scratch_address,
            });
        let range_info =
            vk::AccelerationStructureBuildRangeInfoKHR::default().primitive_count(primitive_count);

        unsafe {
            self.acceleration_structure_fns()
                .cmd_build_acceleration_structures(
                    cmdb,
                    slice::from_ref(&build_info),
                    &[slice::from_ref(&range_info)],
                )
        };
    }
}

fn shader_stage_create_info(
    stage: &ShaderStageDesc<VulkanBackend>,
) -> vk::PipelineShaderStageCreateInfo<'_> {
    vk::PipelineShaderStageCreateInfo::default()
        .stage(stage.stage.into())
        .module(stage.module)
        .name(&stage.entry_point)
}

fn stencil_op_state(face: StencilFaceState) -> vk::StencilOpState {
    // Masks and reference are dynamic.
    vk::StencilOpState {
        fail_op: face.fail_op.into(),
        pass_op: face.pass_op.into(),
        depth_fail_op: face.depth_fail_op.into(),
        compare_op: face.compare_op.into(),
        compare_mask: 0,
        write_mask: 0,
        reference: 0,
    }
}

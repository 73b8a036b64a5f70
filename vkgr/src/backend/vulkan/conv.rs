// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Conversions between the types of the crate and their `ash::vk` counterparts.
//!
//! The raw values of the flag types of the crate are the Vulkan ones, so flags convert bit for
//! bit.

use crate::{
    backend::{
        BufferCopy, BufferImageCopy, ClearColorValue, ClearValue, CommandBufferLevel, ImageBlit,
        ImageSubresourceLayers, IndexType, PipelineBindPoint, Rect2D, StridedDeviceAddressRegion,
        SubpassContents, Viewport,
    },
    descriptor_set::DescriptorType,
    format::Format,
    pipeline::{
        BlendFactor, BlendOperation, ColorComponents, CompareOperation, DynamicState,
        FaceSelection, FillMode, FrontFace, PrimitiveTopology, StencilOperation, VertexStepRate,
    },
    shader::ShaderStages,
    sync::{AccessFlags, ImageAspects, ImageLayout, ImageSubresourceRange, PipelineStages},
};
use ash::vk;

macro_rules! flags_into_vk {
    ($($ty:ty => $vk_ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for $vk_ty {
                #[inline]
                fn from(val: $ty) -> Self {
                    Self::from_raw(val.as_raw())
                }
            }
        )*
    };
}

flags_into_vk! {
    ShaderStages => vk::ShaderStageFlags,
    PipelineStages => vk::PipelineStageFlags,
    AccessFlags => vk::AccessFlags,
    ImageAspects => vk::ImageAspectFlags,
    FaceSelection => vk::CullModeFlags,
    ColorComponents => vk::ColorComponentFlags,
}

impl From<FaceSelection> for vk::StencilFaceFlags {
    #[inline]
    fn from(val: FaceSelection) -> Self {
        Self::from_raw(val.as_raw())
    }
}

impl From<Format> for vk::Format {
    fn from(val: Format) -> Self {
        match val {
            Format::Undefined => vk::Format::UNDEFINED,
            Format::R8Unorm => vk::Format::R8_UNORM,
            Format::R8G8Unorm => vk::Format::R8G8_UNORM,
            Format::R8G8B8A8Unorm => vk::Format::R8G8B8A8_UNORM,
            Format::R8G8B8A8Srgb => vk::Format::R8G8B8A8_SRGB,
            Format::B8G8R8A8Unorm => vk::Format::B8G8R8A8_UNORM,
            Format::B8G8R8A8Srgb => vk::Format::B8G8R8A8_SRGB,
            Format::A2B10G10R10UnormPack32 => vk::Format::A2B10G10R10_UNORM_PACK32,
            Format::B10G11R11UfloatPack32 => vk::Format::B10G11R11_UFLOAT_PACK32,
            Format::R16G16Sfloat => vk::Format::R16G16_SFLOAT,
            Format::R16G16B16A16Sfloat => vk::Format::R16G16B16A16_SFLOAT,
            Format::R32Uint => vk::Format::R32_UINT,
            Format::R32Sfloat => vk::Format::R32_SFLOAT,
            Format::R32G32Sfloat => vk::Format::R32G32_SFLOAT,
            Format::R32G32B32Sfloat => vk::Format::R32G32B32_SFLOAT,
            Format::R32G32B32A32Sfloat => vk::Format::R32G32B32A32_SFLOAT,
            Format::D16Unorm => vk::Format::D16_UNORM,
            Format::D32Sfloat => vk::Format::D32_SFLOAT,
            Format::S8Uint => vk::Format::S8_UINT,
            Format::D24UnormS8Uint => vk::Format::D24_UNORM_S8_UINT,
            Format::D32SfloatS8Uint => vk::Format::D32_SFLOAT_S8_UINT,
        }
    }
}

impl From<ImageLayout> for vk::ImageLayout {
    fn from(val: ImageLayout) -> Self {
        match val {
            ImageLayout::Undefined => vk::ImageLayout::UNDEFINED,
            ImageLayout::General => vk::ImageLayout::GENERAL,
            ImageLayout::ColorAttachmentOptimal => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            ImageLayout::DepthStencilAttachmentOptimal => {
                vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
            }
            ImageLayout::DepthStencilReadOnlyOptimal => {
                vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
            }
            ImageLayout::ShaderReadOnlyOptimal => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            ImageLayout::TransferSrcOptimal => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            ImageLayout::TransferDstOptimal => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            ImageLayout::PresentSrc => vk::ImageLayout::PRESENT_SRC_KHR,
        }
    }
}

impl From<DescriptorType> for vk::DescriptorType {
    fn from(val: DescriptorType) -> Self {
        match val {
            DescriptorType::CombinedTextureSampler => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            DescriptorType::Texture => vk::DescriptorType::SAMPLED_IMAGE,
            DescriptorType::Sampler => vk::DescriptorType::SAMPLER,
            DescriptorType::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
            DescriptorType::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
            DescriptorType::Image => vk::DescriptorType::STORAGE_IMAGE,
            DescriptorType::AccelerationStructure => {
                vk::DescriptorType::ACCELERATION_STRUCTURE_KHR
            }
        }
    }
}

impl From<CommandBufferLevel> for vk::CommandBufferLevel {
    #[inline]
    fn from(val: CommandBufferLevel) -> Self {
        match val {
            CommandBufferLevel::Primary => vk::CommandBufferLevel::PRIMARY,
            CommandBufferLevel::Secondary => vk::CommandBufferLevel::SECONDARY,
        }
    }
}

impl From<PipelineBindPoint> for vk::PipelineBindPoint {
    #[inline]
    fn from(val: PipelineBindPoint) -> Self {
        match val {
            PipelineBindPoint::Graphics => vk::PipelineBindPoint::GRAPHICS,
            PipelineBindPoint::Compute => vk::PipelineBindPoint::COMPUTE,
            PipelineBindPoint::RayTracing => vk::PipelineBindPoint::RAY_TRACING_KHR,
        }
    }
}

impl From<IndexType> for vk::IndexType {
    #[inline]
    fn from(val: IndexType) -> Self {
        match val {
            IndexType::U16 => vk::IndexType::UINT16,
            IndexType::U32 => vk::IndexType::UINT32,
        }
    }
}

impl From<SubpassContents> for vk::SubpassContents {
    #[inline]
    fn from(val: SubpassContents) -> Self {
        match val {
            SubpassContents::Inline => vk::SubpassContents::INLINE,
            SubpassContents::SecondaryCommandBuffers => {
                vk::SubpassContents::SECONDARY_COMMAND_BUFFERS
            }
        }
    }
}

impl From<DynamicState> for vk::DynamicState {
    #[inline]
    fn from(val: DynamicState) -> Self {
        match val {
            DynamicState::Viewport => vk::DynamicState::VIEWPORT,
            DynamicState::Scissor => vk::DynamicState::SCISSOR,
            DynamicState::StencilCompareMask => vk::DynamicState::STENCIL_COMPARE_MASK,
            DynamicState::StencilWriteMask => vk::DynamicState::STENCIL_WRITE_MASK,
            DynamicState::StencilReference => vk::DynamicState::STENCIL_REFERENCE,
            DynamicState::LineWidth => vk::DynamicState::LINE_WIDTH,
        }
    }
}

impl From<PrimitiveTopology> for vk::PrimitiveTopology {
    #[inline]
    fn from(val: PrimitiveTopology) -> Self {
        match val {
            PrimitiveTopology::PointList => vk::PrimitiveTopology::POINT_LIST,
            PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
            PrimitiveTopology::LineStrip => vk::PrimitiveTopology::LINE_STRIP,
            PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
            PrimitiveTopology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
            PrimitiveTopology::PatchList => vk::PrimitiveTopology::PATCH_LIST,
        }
    }
}

impl From<FillMode> for vk::PolygonMode {
    #[inline]
    fn from(val: FillMode) -> Self {
        match val {
            FillMode::Points => vk::PolygonMode::POINT,
            FillMode::Wireframe => vk::PolygonMode::LINE,
            FillMode::Solid => vk::PolygonMode::FILL,
        }
    }
}

impl From<FrontFace> for vk::FrontFace {
    #[inline]
    fn from(val: FrontFace) -> Self {
        match val {
            FrontFace::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
            FrontFace::Clockwise => vk::FrontFace::CLOCKWISE,
        }
    }
}

impl From<CompareOperation> for vk::CompareOp {
    fn from(val: CompareOperation) -> Self {
        match val {
            CompareOperation::Always => vk::CompareOp::ALWAYS,
            CompareOperation::Less => vk::CompareOp::LESS,
            CompareOperation::Equal => vk::CompareOp::EQUAL,
            CompareOperation::LessEqual => vk::CompareOp::LESS_OR_EQUAL,
            CompareOperation::Greater => vk::CompareOp::GREATER,
            CompareOperation::GreaterEqual => vk::CompareOp::GREATER_OR_EQUAL,
            CompareOperation::NotEqual => vk::CompareOp::NOT_EQUAL,
            CompareOperation::Never => vk::CompareOp::NEVER,
        }
    }
}

impl From<StencilOperation> for vk::StencilOp {
    fn from(val: StencilOperation) -> Self {
        match val {
            StencilOperation::Keep => vk::StencilOp::KEEP,
            StencilOperation::Zero => vk::StencilOp::ZERO,
            StencilOperation::Replace => vk::StencilOp::REPLACE,
            StencilOperation::IncrementAndClamp => vk::StencilOp::INCREMENT_AND_CLAMP,
            StencilOperation::DecrementAndClamp => vk::StencilOp::DECREMENT_AND_CLAMP,
            StencilOperation::Invert => vk::StencilOp::INVERT,
            StencilOperation::IncrementAndWrap => vk::StencilOp::INCREMENT_AND_WRAP,
            StencilOperation::DecrementAndWrap => vk::StencilOp::DECREMENT_AND_WRAP,
        }
    }
}

impl From<BlendFactor> for vk::BlendFactor {
    fn from(val: BlendFactor) -> Self {
        match val {
            BlendFactor::Zero => vk::BlendFactor::ZERO,
            BlendFactor::One => vk::BlendFactor::ONE,
            BlendFactor::SrcColor => vk::BlendFactor::SRC_COLOR,
            BlendFactor::OneMinusSrcColor => vk::BlendFactor::ONE_MINUS_SRC_COLOR,
            BlendFactor::DstColor => vk::BlendFactor::DST_COLOR,
            BlendFactor::OneMinusDstColor => vk::BlendFactor::ONE_MINUS_DST_COLOR,
            BlendFactor::SrcAlpha => vk::BlendFactor::SRC_ALPHA,
            BlendFactor::OneMinusSrcAlpha => vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
            BlendFactor::DstAlpha => vk::BlendFactor::DST_ALPHA,
            BlendFactor::OneMinusDstAlpha => vk::BlendFactor::ONE_MINUS_DST_ALPHA,
            BlendFactor::SrcAlphaSaturate => vk::BlendFactor::SRC_ALPHA_SATURATE,
        }
    }
}

impl From<BlendOperation> for vk::BlendOp {
    #[inline]
    fn from(val: BlendOperation) -> Self {
        match val {
            BlendOperation::Add => vk::BlendOp::ADD,
            BlendOperation::Subtract => vk::BlendOp::SUBTRACT,
            BlendOperation::ReverseSubtract => vk::BlendOp::REVERSE_SUBTRACT,
            BlendOperation::Min => vk::BlendOp::MIN,
            BlendOperation::Max => vk::BlendOp::MAX,
        }
    }
}

impl From<VertexStepRate> for vk::VertexInputRate {
    #[inline]
    fn from(val: VertexStepRate) -> Self {
        match val {
            VertexStepRate::Vertex => vk::VertexInputRate::VERTEX,
            VertexStepRate::Instance => vk::VertexInputRate::INSTANCE,
        }
    }
}

impl From<&Viewport> for vk::Viewport {
    #[inline]
    fn from(val: &Viewport) -> Self {
        vk::Viewport {
            x: val.x,
            y: val.y,
            width: val.width,
            height: val.height,
            min_depth: val.min_depth,
            max_depth: val.max_depth,
        }
    }
}

impl From<&Rect2D> for vk::Rect2D {
    #[inline]
    fn from(val: &Rect2D) -> Self {
        vk::Rect2D {
            offset: vk::Offset2D { x: val.x, y: val.y },
            extent: vk::Extent2D {
                width: val.width,
                height: val.height,
            },
        }
    }
}

impl From<&ClearColorValue> for vk::ClearColorValue {
    #[inline]
    fn from(val: &ClearColorValue) -> Self {
        match *val {
            ClearColorValue::Float(float32) => vk::ClearColorValue { float32 },
            ClearColorValue::Int(int32) => vk::ClearColorValue { int32 },
            ClearColorValue::Uint(uint32) => vk::ClearColorValue { uint32 },
        }
    }
}

impl From<&ClearValue> for vk::ClearValue {
    #[inline]
    fn from(val: &ClearValue) -> Self {
        match val {
            ClearValue::Color(color) => vk::ClearValue {
                color: color.into(),
            },
            &ClearValue::DepthStencil { depth, stencil } => vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth, stencil },
            },
        }
    }
}

impl From<&ImageSubresourceRange> for vk::ImageSubresourceRange {
    #[inline]
    fn from(val: &ImageSubresourceRange) -> Self {
        vk::ImageSubresourceRange {
            aspect_mask: val.aspects.into(),
            base_mip_level: val.base_mip_level,
            level_count: val.level_count,
            base_array_layer: val.base_array_layer,
            layer_count: val.layer_count,
        }
    }
}

impl From<&ImageSubresourceLayers> for vk::ImageSubresourceLayers {
    #[inline]
    fn from(val: &ImageSubresourceLayers) -> Self {
        vk::ImageSubresourceLayers {
            aspect_mask: val.aspects.into(),
            mip_level: val.mip_level,
            base_array_layer: val.base_array_layer,
            layer_count: val.layer_count,
        }
    }
}

impl From<&BufferCopy> for vk::BufferCopy {
    #[inline]
    fn from(val: &BufferCopy) -> Self {
        vk::BufferCopy {
            src_offset: val.src_offset,
            dst_offset: val.dst_offset,
            size: val.size,
        }
    }
}

impl From<&BufferImageCopy> for vk::BufferImageCopy {
    fn from(val: &BufferImageCopy) -> Self {
        let [x, y, z] = val.image_offset;
        let [width, height, depth] = val.image_extent;

        vk::BufferImageCopy {
            buffer_offset: val.buffer_offset,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: (&val.image_subresource).into(),
            image_offset: vk::Offset3D { x, y, z },
            image_extent: vk::Extent3D {
                width,
                height,
                depth,
            },
        }
    }
}

impl From<&ImageBlit> for vk::ImageBlit {
    fn from(val: &ImageBlit) -> Self {
        let offsets = |offsets: [[i32; 3]; 2]| offsets.map(|[x, y, z]| vk::Offset3D { x, y, z });

        vk::ImageBlit {
            src_subresource: (&val.src_subresource).into(),
            src_offsets: offsets(val.src_offsets),
            dst_subresource: (&val.dst_subresource).into(),
            dst_offsets: offsets(val.dst_offsets),
        }
    }
}

impl From<&StridedDeviceAddressRegion> for vk::StridedDeviceAddressRegionKHR {
    #[inline]
    fn from(val: &StridedDeviceAddressRegion) -> Self {
        vk::StridedDeviceAddressRegionKHR {
            device_address: val.device_address,
            stride: val.stride,
            size: val.size,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        pipeline::{ColorComponents, FaceSelection},
        shader::ShaderStages,
        sync::{AccessFlags, ImageAspects, PipelineStages},
    };
    use ash::vk;

    #[test]
    fn flags_are_bit_identical() {
        assert_eq!(
            vk::ShaderStageFlags::from(ShaderStages::FRAGMENT | ShaderStages::CLOSEST_HIT),
            vk::ShaderStageFlags::FRAGMENT | vk::ShaderStageFlags::CLOSEST_HIT_KHR,
        );
        assert_eq!(
            vk::PipelineStageFlags::from(
                PipelineStages::TRANSFER | PipelineStages::ACCELERATION_STRUCTURE_BUILD,
            ),
            vk::PipelineStageFlags::TRANSFER
                | vk::PipelineStageFlags::ACCELERATION_STRUCTURE_BUILD_KHR,
        );
        assert_eq!(
            vk::AccessFlags::from(AccessFlags::ACCELERATION_STRUCTURE_WRITE),
            vk::AccessFlags::ACCELERATION_STRUCTURE_WRITE_KHR,
        );
        assert_eq!(
            vk::ImageAspectFlags::from(ImageAspects::DEPTH | ImageAspects::STENCIL),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL,
        );
        assert_eq!(
            vk::CullModeFlags::from(FaceSelection::FRONT_AND_BACK),
            vk::CullModeFlags::FRONT_AND_BACK,
        );
        assert_eq!(
            vk::ColorComponentFlags::from(ColorComponents::all()),
            vk::ColorComponentFlags::R
                | vk::ColorComponentFlags::G
                | vk::ColorComponentFlags::B
                | vk::ColorComponentFlags::A,
        );
    }
}

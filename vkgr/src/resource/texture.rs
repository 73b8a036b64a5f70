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
    format::Format,
    macros::{gr_bitflags, gr_enum, impl_id_counter},
    sync::{AccessFlags, ImageAspects, ImageLayout, ImageSubresourceRange, PipelineStages},
    NonExhaustive,
};
use std::{fmt, num::NonZero, sync::Arc};

gr_bitflags! {
    /// How a texture is used by the device. The layout of a texture is derived from its usage.
    TextureUsage = u32;

    SAMPLED_GEOMETRY = 1 << 0,
    SAMPLED_FRAGMENT = 1 << 1,
    SAMPLED_COMPUTE = 1 << 2,
    SAMPLED_TRACE_RAYS = 1 << 3,
    IMAGE_GEOMETRY_READ = 1 << 4,
    IMAGE_GEOMETRY_WRITE = 1 << 5,
    IMAGE_FRAGMENT_READ = 1 << 6,
    IMAGE_FRAGMENT_WRITE = 1 << 7,
    IMAGE_COMPUTE_READ = 1 << 8,
    IMAGE_COMPUTE_WRITE = 1 << 9,
    IMAGE_TRACE_RAYS_READ = 1 << 10,
    IMAGE_TRACE_RAYS_WRITE = 1 << 11,
    FRAMEBUFFER_ATTACHMENT_READ = 1 << 12,
    FRAMEBUFFER_ATTACHMENT_WRITE = 1 << 13,
    TRANSFER_DESTINATION = 1 << 14,
    GENERATE_MIPMAPS = 1 << 15,
    PRESENT = 1 << 16,
}

impl TextureUsage {
    pub const ALL_SAMPLED: Self = Self::SAMPLED_GEOMETRY
        .union(Self::SAMPLED_FRAGMENT)
        .union(Self::SAMPLED_COMPUTE)
        .union(Self::SAMPLED_TRACE_RAYS);

    pub const ALL_IMAGE: Self = Self::IMAGE_GEOMETRY_READ
        .union(Self::IMAGE_GEOMETRY_WRITE)
        .union(Self::IMAGE_FRAGMENT_READ)
        .union(Self::IMAGE_FRAGMENT_WRITE)
        .union(Self::IMAGE_COMPUTE_READ)
        .union(Self::IMAGE_COMPUTE_WRITE)
        .union(Self::IMAGE_TRACE_RAYS_READ)
        .union(Self::IMAGE_TRACE_RAYS_WRITE);

    pub const ALL_FRAMEBUFFER_ATTACHMENT: Self =
        Self::FRAMEBUFFER_ATTACHMENT_READ.union(Self::FRAMEBUFFER_ATTACHMENT_WRITE);
}

gr_enum! {
    /// The dimensionality of a texture.
    TextureType;

    Texture1D,
    Texture2D,
    Texture3D,
    Texture2DArray,
    TextureCube,
}

/// Parameters to wrap a native texture.
#[derive(Clone, Debug)]
pub struct TextureCreateInfo {
    /// The default value is empty.
    pub name: String,

    /// The default value is [`Format::Undefined`], which must be overridden.
    pub format: Format,

    /// The default value is [`TextureType::Texture2D`].
    pub ty: TextureType,

    /// The default value is `[1, 1, 1]`.
    pub extent: [u32; 3],

    /// Cube textures count each face as a layer.
    ///
    /// The default value is `1`.
    pub layer_count: u32,

    /// The default value is `1`.
    pub mip_count: u32,

    /// The default value is empty, which must be overridden.
    pub usage: TextureUsage,

    pub _ne: NonExhaustive,
}

impl Default for TextureCreateInfo {
    #[inline]
    fn default() -> Self {
        Self {
            name: String::new(),
            format: Format::Undefined,
            ty: TextureType::Texture2D,
            extent: [1; 3],
            layer_count: 1,
            mip_count: 1,
            usage: TextureUsage::empty(),
            _ne: NonExhaustive(()),
        }
    }
}

/// A native image and its metadata.
pub struct Texture<B: Backend> {
    id: NonZero<u64>,
    image: B::Image,
    name: String,
    format: Format,
    ty: TextureType,
    extent: [u32; 3],
    layer_count: u32,
    mip_count: u32,
    usage: TextureUsage,
}

impl<B: Backend> Texture<B> {
    /// Wraps a native image.
    ///
    /// # Panics
    ///
    /// - Panics if the format is undefined, the usage is empty, or a count or extent is zero.
    pub fn from_handle(image: B::Image, create_info: TextureCreateInfo) -> Arc<Self> {
        let TextureCreateInfo {
            name,
            format,
            ty,
            extent,
            layer_count,
            mip_count,
            usage,
            _ne: _,
        } = create_info;

        assert_ne!(format, Format::Undefined);
        assert!(!usage.is_empty());
        assert!(extent.iter().all(|&e| e > 0));
        assert!(layer_count > 0 && mip_count > 0);

        Arc::new(Texture {
            id: Self::next_id(),
            image,
            name,
            format,
            ty,
            extent,
            layer_count,
            mip_count,
            usage,
        })
    }

    #[inline]
    pub fn handle(&self) -> B::Image {
        self.image
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn format(&self) -> Format {
        self.format
    }

    #[inline]
    pub fn ty(&self) -> TextureType {
        self.ty
    }

    #[inline]
    pub fn extent(&self) -> [u32; 3] {
        self.extent
    }

    #[inline]
    pub fn layer_count(&self) -> u32 {
        self.layer_count
    }

    #[inline]
    pub fn mip_count(&self) -> u32 {
        self.mip_count
    }

    #[inline]
    pub fn usage(&self) -> TextureUsage {
        self.usage
    }

    /// Returns the extent of mip `level`.
    #[inline]
    pub fn mip_extent(&self, level: u32) -> [u32; 3] {
        self.extent.map(|e| (e >> level).max(1))
    }

    /// Returns the layout the texels of mip `level` are in when the texture is used as `usage`.
    pub fn layout(&self, usage: TextureUsage, level: u32) -> ImageLayout {
        debug_assert!(self.usage.contains(usage));
        let depth_stencil = self.format.is_depth_stencil();

        if usage.is_empty() {
            ImageLayout::Undefined
        } else if (usage - TextureUsage::ALL_SAMPLED).is_empty() {
            if depth_stencil {
                ImageLayout::DepthStencilReadOnlyOptimal
            } else {
                ImageLayout::ShaderReadOnlyOptimal
            }
        } else if usage.intersects(TextureUsage::ALL_IMAGE) {
            ImageLayout::General
        } else if usage.intersects(TextureUsage::FRAMEBUFFER_ATTACHMENT_WRITE)
            && (usage - TextureUsage::ALL_FRAMEBUFFER_ATTACHMENT).is_empty()
        {
            if depth_stencil {
                ImageLayout::DepthStencilAttachmentOptimal
            } else {
                ImageLayout::ColorAttachmentOptimal
            }
        } else if usage.intersects(TextureUsage::FRAMEBUFFER_ATTACHMENT_READ)
            && (usage - TextureUsage::FRAMEBUFFER_ATTACHMENT_READ - TextureUsage::ALL_SAMPLED)
                .is_empty()
        {
            if depth_stencil {
                ImageLayout::DepthStencilReadOnlyOptimal
            } else {
                ImageLayout::General
            }
        } else if usage == TextureUsage::GENERATE_MIPMAPS {
            if level == 0 {
                ImageLayout::TransferSrcOptimal
            } else {
                ImageLayout::TransferDstOptimal
            }
        } else if usage == TextureUsage::TRANSFER_DESTINATION {
            ImageLayout::TransferDstOptimal
        } else if usage == TextureUsage::PRESENT {
            ImageLayout::PresentSrc
        } else {
            ImageLayout::General
        }
    }

    /// Returns the stages and accesses covered by `usage`.
    pub(crate) fn barrier_scope(&self, usage: TextureUsage) -> BarrierScope {
        let mut scope = BarrierScope::default();
        let depth_stencil = self.format.is_depth_stencil();

        let shader_stages = [
            (
                TextureUsage::SAMPLED_GEOMETRY | TextureUsage::IMAGE_GEOMETRY_READ,
                TextureUsage::IMAGE_GEOMETRY_WRITE,
                PipelineStages::PRE_RASTERIZATION_SHADERS,
            ),
            (
                TextureUsage::SAMPLED_FRAGMENT | TextureUsage::IMAGE_FRAGMENT_READ,
                TextureUsage::IMAGE_FRAGMENT_WRITE,
                PipelineStages::FRAGMENT_SHADER,
            ),
            (
                TextureUsage::SAMPLED_COMPUTE | TextureUsage::IMAGE_COMPUTE_READ,
                TextureUsage::IMAGE_COMPUTE_WRITE,
                PipelineStages::COMPUTE_SHADER,
            ),
            (
                TextureUsage::SAMPLED_TRACE_RAYS | TextureUsage::IMAGE_TRACE_RAYS_READ,
                TextureUsage::IMAGE_TRACE_RAYS_WRITE,
                PipelineStages::RAY_TRACING_SHADER,
            ),
        ];

        for (read, write, stages) in shader_stages {
            if usage.intersects(read) {
                scope.add(stages, AccessFlags::SHADER_READ);
            }

            if usage.intersects(write) {
                scope.add(stages, AccessFlags::SHADER_WRITE);
            }
        }

        if usage.intersects(TextureUsage::FRAMEBUFFER_ATTACHMENT_READ) {
            if depth_stencil {
                scope.add(
                    PipelineStages::FRAGMENT_TESTS,
                    AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ,
                );
            } else {
                scope.add(
                    PipelineStages::COLOR_ATTACHMENT_OUTPUT,
                    AccessFlags::COLOR_ATTACHMENT_READ,
                );
            }
        }

        if usage.intersects(TextureUsage::FRAMEBUFFER_ATTACHMENT_WRITE) {
            if depth_stencil {
                scope.add(
                    PipelineStages::FRAGMENT_TESTS,
                    AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                );
            } else {
                scope.add(
                    PipelineStages::COLOR_ATTACHMENT_OUTPUT,
                    AccessFlags::COLOR_ATTACHMENT_WRITE,
                );
            }
        }

        if usage.intersects(TextureUsage::GENERATE_MIPMAPS) {
            scope.add(
                PipelineStages::TRANSFER,
                AccessFlags::TRANSFER_READ | AccessFlags::TRANSFER_WRITE,
            );
        }

        if usage.intersects(TextureUsage::TRANSFER_DESTINATION) {
            scope.add(PipelineStages::TRANSFER, AccessFlags::TRANSFER_WRITE);
        }

        if usage.intersects(TextureUsage::PRESENT) {
            scope.add(PipelineStages::BOTTOM_OF_PIPE, AccessFlags::MEMORY_READ);
        }

        scope
    }

    /// Returns the source and destination scopes of a transition from `before` to `after`.
    pub fn barrier_info(
        &self,
        before: TextureUsage,
        after: TextureUsage,
    ) -> (BarrierScope, BarrierScope) {
        debug_assert!(self.usage.contains(before) && self.usage.contains(after));

        (
            self.barrier_scope(before).or_top_of_pipe(),
            self.barrier_scope(after).or_bottom_of_pipe(),
        )
    }

    /// Converts a subresource description into a native range.
    pub fn subresource_range(&self, info: &TextureSubresourceInfo) -> ImageSubresourceRange {
        assert!(info.first_mipmap + info.mipmap_count <= self.mip_count);
        assert!(info.first_layer + info.layer_count <= self.layer_count);

        let aspects = if info.depth_stencil_aspect.is_empty() {
            self.format.aspects()
        } else {
            debug_assert!(self.format.aspects().contains(info.depth_stencil_aspect));
            info.depth_stencil_aspect
        };

        ImageSubresourceRange {
            aspects,
            base_mip_level: info.first_mipmap,
            level_count: info.mipmap_count,
            base_array_layer: info.first_layer,
            layer_count: info.layer_count,
        }
    }
}

impl<B: Backend> fmt::Debug for Texture<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.id)
            .field("image", &self.image)
            .field("name", &self.name)
            .field("format", &self.format)
            .field("extent", &self.extent)
            .field("usage", &self.usage)
            .finish_non_exhaustive()
    }
}

impl<B: Backend> GrObject for Texture<B> {
    fn object_type(&self) -> GrObjectType {
        GrObjectType::Texture
    }

    fn uuid(&self) -> NonZero<u64> {
        self.id
    }
}

impl_id_counter!(Texture<B: Backend>);

/// A range of mips and layers of a texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureSubresourceInfo {
    pub first_mipmap: u32,
    pub mipmap_count: u32,
    pub first_layer: u32,
    pub layer_count: u32,
    /// For depth/stencil textures, the aspects covered. Empty means every aspect of the format.
    pub depth_stencil_aspect: ImageAspects,
}

impl TextureSubresourceInfo {
    /// Every mip and layer of `texture`.
    pub fn whole<B: Backend>(texture: &Texture<B>) -> Self {
        Self {
            first_mipmap: 0,
            mipmap_count: texture.mip_count(),
            first_layer: 0,
            layer_count: texture.layer_count(),
            depth_stencil_aspect: ImageAspects::empty(),
        }
    }

    /// One mip of one layer.
    pub fn surface(level: u32, layer: u32) -> Self {
        Self {
            first_mipmap: level,
            mipmap_count: 1,
            first_layer: layer,
            layer_count: 1,
            depth_stencil_aspect: ImageAspects::empty(),
        }
    }
}

/// A native image view over a subresource range of a [`Texture`].
pub struct TextureView<B: Backend> {
    id: NonZero<u64>,
    view: B::ImageView,
    texture: Arc<Texture<B>>,
    subresource: TextureSubresourceInfo,
}

impl<B: Backend> TextureView<B> {
    /// Wraps a native image view.
    ///
    /// # Panics
    ///
    /// - Panics if `subresource` is out of the range of `texture`.
    pub fn from_handle(
        view: B::ImageView,
        texture: Arc<Texture<B>>,
        subresource: TextureSubresourceInfo,
    ) -> Arc<Self> {
        let _ = texture.subresource_range(&subresource);

        Arc::new(TextureView {
            id: Self::next_id(),
            view,
            texture,
            subresource,
        })
    }

    #[inline]
    pub fn handle(&self) -> B::ImageView {
        self.view
    }

    #[inline]
    pub fn texture(&self) -> &Arc<Texture<B>> {
        &self.texture
    }

    #[inline]
    pub fn subresource(&self) -> &TextureSubresourceInfo {
        &self.subresource
    }

    #[inline]
    pub fn subresource_range(&self) -> ImageSubresourceRange {
        self.texture.subresource_range(&self.subresource)
    }
}

impl<B: Backend> fmt::Debug for TextureView<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextureView")
            .field("id", &self.id)
            .field("view", &self.view)
            .field("texture", &self.texture)
            .field("subresource", &self.subresource)
            .finish()
    }
}

impl<B: Backend> GrObject for TextureView<B> {
    fn object_type(&self) -> GrObjectType {
        GrObjectType::TextureView
    }

    fn uuid(&self) -> NonZero<u64> {
        self.id
    }
}

impl_id_counter!(TextureView<B: Backend>);

/// A native sampler.
pub struct Sampler<B: Backend> {
    id: NonZero<u64>,
    handle: B::Sampler,
}

impl<B: Backend> Sampler<B> {
    pub fn from_handle(handle: B::Sampler) -> Arc<Self> {
        Arc::new(Sampler {
            id: Self::next_id(),
            handle,
        })
    }

    #[inline]
    pub fn handle(&self) -> B::Sampler {
        self.handle
    }
}

impl<B: Backend> fmt::Debug for Sampler<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sampler")
            .field("id", &self.id)
            .field("handle", &self.handle)
            .finish()
    }
}

impl<B: Backend> GrObject for Sampler<B> {
    fn object_type(&self) -> GrObjectType {
        GrObjectType::Sampler
    }

    fn uuid(&self) -> NonZero<u64> {
        self.id
    }
}

impl_id_counter!(Sampler<B: Backend>);

#[cfg(test)]
mod tests {
    use super::{Texture, TextureCreateInfo, TextureSubresourceInfo, TextureUsage};
    use crate::{
        backend::null::{NullBackend, NullHandle},
        format::Format,
        sync::{AccessFlags, ImageAspects, ImageLayout, PipelineStages},
    };

    fn texture(format: Format, usage: TextureUsage) -> std::sync::Arc<Texture<NullBackend>> {
        Texture::from_handle(
            NullHandle::new(),
            TextureCreateInfo {
                format,
                extent: [256, 128, 1],
                mip_count: 4,
                usage,
                ..Default::default()
            },
        )
    }

    #[test]
    fn layouts() {
        let color = texture(
            Format::R8G8B8A8Unorm,
            TextureUsage::SAMPLED_FRAGMENT
                | TextureUsage::FRAMEBUFFER_ATTACHMENT_WRITE
                | TextureUsage::GENERATE_MIPMAPS
                | TextureUsage::IMAGE_COMPUTE_WRITE,
        );

        assert_eq!(
            color.layout(TextureUsage::SAMPLED_FRAGMENT, 0),
            ImageLayout::ShaderReadOnlyOptimal,
        );
        assert_eq!(
            color.layout(TextureUsage::FRAMEBUFFER_ATTACHMENT_WRITE, 0),
            ImageLayout::ColorAttachmentOptimal,
        );
        assert_eq!(
            color.layout(TextureUsage::GENERATE_MIPMAPS, 0),
            ImageLayout::TransferSrcOptimal,
        );
        assert_eq!(
            color.layout(TextureUsage::GENERATE_MIPMAPS, 2),
            ImageLayout::TransferDstOptimal,
        );
        assert_eq!(
            color.layout(TextureUsage::IMAGE_COMPUTE_WRITE, 0),
            ImageLayout::General,
        );
        assert_eq!(
            color.layout(TextureUsage::empty(), 0),
            ImageLayout::Undefined,
        );

        let depth = texture(
            Format::D32Sfloat,
            TextureUsage::SAMPLED_FRAGMENT | TextureUsage::ALL_FRAMEBUFFER_ATTACHMENT,
        );

        assert_eq!(
            depth.layout(TextureUsage::ALL_FRAMEBUFFER_ATTACHMENT, 0),
            ImageLayout::DepthStencilAttachmentOptimal,
        );
        assert_eq!(
            depth.layout(
                TextureUsage::FRAMEBUFFER_ATTACHMENT_READ | TextureUsage::SAMPLED_FRAGMENT,
                0,
            ),
            ImageLayout::DepthStencilReadOnlyOptimal,
        );
    }

    #[test]
    fn attachment_to_sampled_barrier() {
        let color = texture(
            Format::R8G8B8A8Unorm,
            TextureUsage::SAMPLED_FRAGMENT | TextureUsage::FRAMEBUFFER_ATTACHMENT_WRITE,
        );

        let (src, dst) = color.barrier_info(
            TextureUsage::FRAMEBUFFER_ATTACHMENT_WRITE,
            TextureUsage::SAMPLED_FRAGMENT,
        );

        assert_eq!(src.stages, PipelineStages::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(src.access, AccessFlags::COLOR_ATTACHMENT_WRITE);
        assert_eq!(dst.stages, PipelineStages::FRAGMENT_SHADER);
        assert_eq!(dst.access, AccessFlags::SHADER_READ);
    }

    #[test]
    fn subresource_range_defaults_to_format_aspects() {
        let depth = texture(Format::D24UnormS8Uint, TextureUsage::SAMPLED_FRAGMENT);
        let range = depth.subresource_range(&TextureSubresourceInfo::whole(&depth));

        assert_eq!(range.aspects, ImageAspects::DEPTH | ImageAspects::STENCIL);
        assert_eq!(range.level_count, 4);
        assert_eq!(depth.mip_extent(3), [32, 16, 1]);
    }
}

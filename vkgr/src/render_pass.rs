// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Framebuffers: the set of attachments a render pass draws into.
//!
//! The native render pass and framebuffer are created by the resource subsystem. A
//! [`Framebuffer`] bundles them with the attachment views (which it keeps alive) and computes the
//! signature that the pipeline cache uses to tell render passes apart.

use crate::{
    backend::{Backend, ClearValue},
    format::Format,
    hash::compute_hash,
    macros::impl_id_counter,
    pipeline::MAX_COLOR_ATTACHMENTS,
    resource::{GrObject, GrObjectType, TextureView},
    NonExhaustive,
};
use smallvec::SmallVec;
use std::{fmt, num::NonZero, sync::Arc};

/// One attachment of a framebuffer.
pub struct FramebufferAttachment<B: Backend> {
    pub view: Arc<TextureView<B>>,
    /// Used when the native render pass clears the attachment on load.
    pub clear_value: ClearValue,
}

impl<B: Backend> FramebufferAttachment<B> {
    #[inline]
    pub fn new(view: Arc<TextureView<B>>) -> Self {
        Self {
            view,
            clear_value: ClearValue::default(),
        }
    }
}

impl<B: Backend> Clone for FramebufferAttachment<B> {
    fn clone(&self) -> Self {
        Self {
            view: self.view.clone(),
            clear_value: self.clear_value,
        }
    }
}

/// Parameters to wrap a native framebuffer.
pub struct FramebufferCreateInfo<B: Backend> {
    /// The default value is empty.
    pub name: String,

    /// The native render pass the framebuffer is compatible with.
    ///
    /// The default value is `None`, which must be overridden.
    pub render_pass: Option<B::RenderPass>,

    /// The default value is `None`, which must be overridden.
    pub framebuffer: Option<B::Framebuffer>,

    /// The default value is empty.
    pub color_attachments: SmallVec<[FramebufferAttachment<B>; MAX_COLOR_ATTACHMENTS]>,

    /// The default value is `None`.
    pub depth_stencil_attachment: Option<FramebufferAttachment<B>>,

    /// Whether this is the framebuffer of a presentable image. Rendering to it flips the
    /// viewport and the front face.
    ///
    /// The default value is `false`.
    pub default_framebuffer: bool,

    pub _ne: NonExhaustive,
}

impl<B: Backend> Default for FramebufferCreateInfo<B> {
    #[inline]
    fn default() -> Self {
        Self {
            name: String::new(),
            render_pass: None,
            framebuffer: None,
            color_attachments: SmallVec::new(),
            depth_stencil_attachment: None,
            default_framebuffer: false,
            _ne: NonExhaustive(()),
        }
    }
}

/// A native framebuffer together with its attachments.
pub struct Framebuffer<B: Backend> {
    id: NonZero<u64>,
    name: String,
    render_pass: B::RenderPass,
    framebuffer: B::Framebuffer,
    color_attachments: SmallVec<[FramebufferAttachment<B>; MAX_COLOR_ATTACHMENTS]>,
    depth_stencil_attachment: Option<FramebufferAttachment<B>>,
    clear_values: SmallVec<[ClearValue; MAX_COLOR_ATTACHMENTS + 1]>,
    extent: [u32; 2],
    default_framebuffer: bool,
    signature: u64,
}

impl<B: Backend> Framebuffer<B> {
    /// Wraps a native framebuffer.
    ///
    /// # Panics
    ///
    /// - Panics if the render pass or framebuffer handle is missing.
    /// - Panics if there are no attachments or more than [`MAX_COLOR_ATTACHMENTS`] color ones.
    /// - Panics if a color attachment has a depth/stencil format or the other way around.
    /// - Panics if the attachments don't all have the same extent.
    pub fn new(create_info: FramebufferCreateInfo<B>) -> Arc<Self> {
        let FramebufferCreateInfo {
            name,
            render_pass,
            framebuffer,
            color_attachments,
            depth_stencil_attachment,
            default_framebuffer,
            _ne: _,
        } = create_info;

        let render_pass = render_pass.expect("a framebuffer needs a render pass");
        let framebuffer = framebuffer.expect("a framebuffer needs a native framebuffer");

        assert!(color_attachments.len() <= MAX_COLOR_ATTACHMENTS);
        assert!(!color_attachments.is_empty() || depth_stencil_attachment.is_some());

        for attachment in &color_attachments {
            assert!(!attachment.view.texture().format().is_depth_stencil());
        }

        if let Some(attachment) = &depth_stencil_attachment {
            assert!(attachment.view.texture().format().is_depth_stencil());
        }

        let extent = {
            let first = color_attachments
                .iter()
                .chain(&depth_stencil_attachment)
                .next()
                .map(mip_extent)
                .unwrap_or_default();

            for attachment in color_attachments.iter().chain(&depth_stencil_attachment) {
                assert_eq!(
                    mip_extent(attachment),
                    first,
                    "the attachments of a framebuffer must have the same extent",
                );
            }

            first
        };

        let clear_values = color_attachments
            .iter()
            .chain(&depth_stencil_attachment)
            .map(|attachment| attachment.clear_value)
            .collect();

        let color_formats: SmallVec<[Format; MAX_COLOR_ATTACHMENTS]> = color_attachments
            .iter()
            .map(|attachment| attachment.view.texture().format())
            .collect();
        let depth_stencil_format = depth_stencil_attachment
            .as_ref()
            .map(|attachment| attachment.view.texture().format());
        // The default framebuffer flips the front face of the pipelines drawing into it.
        let signature = compute_hash(&(
            render_pass,
            &color_formats[..],
            depth_stencil_format,
            default_framebuffer,
        ));

        Arc::new(Framebuffer {
            id: Self::next_id(),
            name,
            render_pass,
            framebuffer,
            color_attachments,
            depth_stencil_attachment,
            clear_values,
            extent,
            default_framebuffer,
            signature,
        })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn render_pass(&self) -> B::RenderPass {
        self.render_pass
    }

    #[inline]
    pub fn handle(&self) -> B::Framebuffer {
        self.framebuffer
    }

    #[inline]
    pub fn color_attachments(&self) -> &[FramebufferAttachment<B>] {
        &self.color_attachments
    }

    #[inline]
    pub fn depth_stencil_attachment(&self) -> Option<&FramebufferAttachment<B>> {
        self.depth_stencil_attachment.as_ref()
    }

    /// Clear values of the color attachments followed by the depth/stencil one.
    #[inline]
    pub fn clear_values(&self) -> &[ClearValue] {
        &self.clear_values
    }

    /// Bit `i` is set if color attachment `i` exists.
    #[inline]
    pub fn color_attachment_mask(&self) -> u8 {
        ((1u32 << self.color_attachments.len()) - 1) as u8
    }

    #[inline]
    pub fn has_depth(&self) -> bool {
        self.depth_stencil_format().is_some_and(Format::has_depth)
    }

    #[inline]
    pub fn has_stencil(&self) -> bool {
        self.depth_stencil_format().is_some_and(Format::has_stencil)
    }

    fn depth_stencil_format(&self) -> Option<Format> {
        self.depth_stencil_attachment
            .as_ref()
            .map(|attachment| attachment.view.texture().format())
    }

    /// Width and height shared by every attachment.
    #[inline]
    pub fn extent(&self) -> [u32; 2] {
        self.extent
    }

    #[inline]
    pub fn is_default_framebuffer(&self) -> bool {
        self.default_framebuffer
    }

    /// Hash of the render pass and the attachment formats. Framebuffers with equal signatures
    /// can share pipelines.
    #[inline]
    pub fn signature(&self) -> u64 {
        self.signature
    }
}

fn mip_extent<B: Backend>(attachment: &FramebufferAttachment<B>) -> [u32; 2] {
    let view = &attachment.view;
    let [width, height, _] = view.texture().mip_extent(view.subresource().first_mipmap);

    [width, height]
}

impl<B: Backend> fmt::Debug for Framebuffer<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Framebuffer")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("render_pass", &self.render_pass)
            .field("framebuffer", &self.framebuffer)
            .field("extent", &self.extent)
            .field("default_framebuffer", &self.default_framebuffer)
            .finish_non_exhaustive()
    }
}

impl<B: Backend> GrObject for Framebuffer<B> {
    fn object_type(&self) -> GrObjectType {
        GrObjectType::Framebuffer
    }

    fn uuid(&self) -> NonZero<u64> {
        self.id
    }
}

impl_id_counter!(Framebuffer<B: Backend>);

#[cfg(test)]
mod tests {
    use crate::{backend::null::NullHandle, format::Format};

    #[test]
    fn masks_and_signature() {
        let render_pass = NullHandle::new();
        let a = gr_framebuffer!(render_pass, [Format::R8G8B8A8Unorm, Format::R16G16Sfloat], None);
        let b = gr_framebuffer!(
            render_pass,
            [Format::R8G8B8A8Unorm, Format::R16G16Sfloat],
            Some(Format::D24UnormS8Uint),
        );
        let c = gr_framebuffer!(render_pass, [Format::R8G8B8A8Unorm, Format::R16G16Sfloat], None);

        assert_eq!(a.color_attachment_mask(), 0b11);
        assert!(!a.has_depth() && !a.has_stencil());
        assert!(b.has_depth() && b.has_stencil());
        assert_ne!(a.signature(), b.signature());
        assert_eq!(a.signature(), c.signature());
        assert_eq!(b.clear_values().len(), 3);
    }
}

// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

#![cfg(test)]

/// Wraps a fresh null buffer of the given size and usage.
macro_rules! gr_buffer {
    ($size:expr, $usage:expr $(,)?) => {{
        $crate::resource::Buffer::<$crate::backend::null::NullBackend>::from_handle(
            $crate::backend::null::NullHandle::new(),
            $crate::resource::BufferCreateInfo {
                size: $size,
                usage: $usage,
                ..Default::default()
            },
        )
    }};
}

/// Wraps a fresh null 2D texture.
macro_rules! gr_texture {
    ([$width:expr, $height:expr], $mip_count:expr, $format:expr, $usage:expr $(,)?) => {{
        $crate::resource::Texture::<$crate::backend::null::NullBackend>::from_handle(
            $crate::backend::null::NullHandle::new(),
            $crate::resource::TextureCreateInfo {
                format: $format,
                extent: [$width, $height, 1],
                mip_count: $mip_count,
                usage: $usage,
                ..Default::default()
            },
        )
    }};
}

/// Creates a 16x16 framebuffer compatible with `$render_pass`, with one color attachment per
/// format and an optional depth/stencil attachment. A trailing `default` marks it as the
/// framebuffer of a presentable image.
macro_rules! gr_framebuffer {
    (@build $render_pass:expr, [$($color:expr),*], $depth_stencil:expr, $default:expr) => {{
        use $crate::{
            backend::null::NullBackend,
            render_pass::{Framebuffer, FramebufferAttachment, FramebufferCreateInfo},
            resource::{TextureSubresourceInfo, TextureUsage, TextureView},
        };

        let attachment = |format: $crate::format::Format| {
            let texture = gr_texture!(
                [16, 16],
                1,
                format,
                TextureUsage::ALL_FRAMEBUFFER_ATTACHMENT
                    | TextureUsage::ALL_SAMPLED
                    | TextureUsage::TRANSFER_DESTINATION,
            );
            let subresource = TextureSubresourceInfo::whole(&texture);

            FramebufferAttachment::<NullBackend>::new(TextureView::from_handle(
                $crate::backend::null::NullHandle::new(),
                texture,
                subresource,
            ))
        };
        let depth_stencil: Option<$crate::format::Format> = $depth_stencil;

        Framebuffer::new(FramebufferCreateInfo {
            render_pass: Some($render_pass),
            framebuffer: Some($crate::backend::null::NullHandle::new()),
            color_attachments: [$($color),*].into_iter().map(attachment).collect(),
            depth_stencil_attachment: depth_stencil.map(attachment),
            default_framebuffer: $default,
            ..Default::default()
        })
    }};
    ($render_pass:expr, [$($color:expr),* $(,)?], $depth_stencil:expr $(,)?) => {
        gr_framebuffer!(@build $render_pass, [$($color),*], $depth_stencil, false)
    };
    ($render_pass:expr, [$($color:expr),* $(,)?], $depth_stencil:expr, default $(,)?) => {
        gr_framebuffer!(@build $render_pass, [$($color),*], $depth_stencil, true)
    };
}

/// Creates a vertex and fragment program reading the attributes of `$attributes` and writing the
/// color attachments of `$colors`.
macro_rules! gr_graphics_program {
    ($attributes:expr, $colors:expr $(,)?) => {{
        use $crate::{
            backend::null::NullBackend,
            shader::{ShaderProgram, ShaderProgramCreateInfo, ShaderStageDesc, ShaderStages},
        };

        let handle = $crate::backend::null::NullHandle::new;

        ShaderProgram::<NullBackend>::new(ShaderProgramCreateInfo {
            name: "graphics".to_owned(),
            stages: [
                ShaderStageDesc::new(ShaderStages::VERTEX, handle()),
                ShaderStageDesc::new(ShaderStages::FRAGMENT, handle()),
            ]
            .into_iter()
            .collect(),
            layout: Some(handle()),
            vertex_attribute_mask: $attributes,
            color_attachment_write_mask: $colors,
            ..Default::default()
        })
    }};
}

/// Creates a compute program with a 16 byte push constant block and no descriptor sets.
macro_rules! gr_compute_program {
    () => {{
        use $crate::{
            backend::null::{NullBackend, NullHandle},
            shader::{ShaderProgram, ShaderProgramCreateInfo, ShaderStageDesc, ShaderStages},
        };

        ShaderProgram::<NullBackend>::new(ShaderProgramCreateInfo {
            name: "compute".to_owned(),
            stages: [ShaderStageDesc::new(ShaderStages::COMPUTE, NullHandle::new())]
                .into_iter()
                .collect(),
            layout: Some(NullHandle::new()),
            push_constant_size: 16,
            ..Default::default()
        })
    }};
}

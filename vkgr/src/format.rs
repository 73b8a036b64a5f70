// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Formats of texels and vertex attributes.

use crate::{macros::gr_enum, sync::ImageAspects};

gr_enum! {
    /// Describes how the bytes of a texel or a vertex attribute are interpreted.
    Format
    impl {
        /// Returns the aspects that a texture of this format has.
        pub const fn aspects(self) -> ImageAspects {
            match self {
                Format::D16Unorm | Format::D32Sfloat => ImageAspects::DEPTH,
                Format::S8Uint => ImageAspects::STENCIL,
                Format::D24UnormS8Uint | Format::D32SfloatS8Uint => {
                    ImageAspects::DEPTH.union(ImageAspects::STENCIL)
                }
                Format::Undefined => ImageAspects::empty(),
                _ => ImageAspects::COLOR,
            }
        }

        /// Returns whether the format has a depth component.
        #[inline]
        pub const fn has_depth(self) -> bool {
            self.aspects().intersects(ImageAspects::DEPTH)
        }

        /// Returns whether the format has a stencil component.
        #[inline]
        pub const fn has_stencil(self) -> bool {
            self.aspects().intersects(ImageAspects::STENCIL)
        }

        /// Returns whether the format is a depth and/or stencil format.
        #[inline]
        pub const fn is_depth_stencil(self) -> bool {
            self.aspects().intersects(ImageAspects::DEPTH.union(ImageAspects::STENCIL))
        }

        /// Returns the size in bytes of one texel or vertex attribute.
        pub const fn block_size(self) -> u32 {
            match self {
                Format::Undefined => 0,
                Format::R8Unorm | Format::S8Uint => 1,
                Format::R8G8Unorm | Format::D16Unorm => 2,
                Format::R8G8B8A8Unorm
                | Format::R8G8B8A8Srgb
                | Format::B8G8R8A8Unorm
                | Format::B8G8R8A8Srgb
                | Format::A2B10G10R10UnormPack32
                | Format::B10G11R11UfloatPack32
                | Format::R16G16Sfloat
                | Format::R32Uint
                | Format::R32Sfloat
                | Format::D32Sfloat
                | Format::D24UnormS8Uint => 4,
                Format::R16G16B16A16Sfloat
                | Format::R32G32Sfloat
                | Format::D32SfloatS8Uint => 8,
                Format::R32G32B32Sfloat => 12,
                Format::R32G32B32A32Sfloat => 16,
            }
        }
    }
    ;

    Undefined,
    R8Unorm,
    R8G8Unorm,
    R8G8B8A8Unorm,
    R8G8B8A8Srgb,
    B8G8R8A8Unorm,
    B8G8R8A8Srgb,
    A2B10G10R10UnormPack32,
    B10G11R11UfloatPack32,
    R16G16Sfloat,
    R16G16B16A16Sfloat,
    R32Uint,
    R32Sfloat,
    R32G32Sfloat,
    R32G32B32Sfloat,
    R32G32B32A32Sfloat,
    D16Unorm,
    D32Sfloat,
    S8Uint,
    D24UnormS8Uint,
    D32SfloatS8Uint,
}

impl Default for Format {
    #[inline]
    fn default() -> Self {
        Format::Undefined
    }
}

#[cfg(test)]
mod tests {
    use super::Format;
    use crate::sync::ImageAspects;

    #[test]
    fn aspects() {
        assert_eq!(Format::R8G8B8A8Unorm.aspects(), ImageAspects::COLOR);
        assert!(Format::D24UnormS8Uint.has_depth());
        assert!(Format::D24UnormS8Uint.has_stencil());
        assert!(!Format::D32Sfloat.has_stencil());
        assert!(!Format::R32Sfloat.is_depth_stencil());
    }
}

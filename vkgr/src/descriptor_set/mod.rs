// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Bindings of resources to shaders.
//!
//! A command buffer keeps one [`DescriptorSetState`] per set index. Binding a resource only
//! records it in the state. Before a draw or a dispatch every dirty state is resolved into a
//! native descriptor set by the [`DescriptorSetFactory`], which caches sets by their content:
//! binding the same resources again reuses the same native set.
//!
//! Native sets are never freed one by one. A cached set that hasn't been used for
//! [`descriptor_frame_buffering`](crate::GrConfig::descriptor_frame_buffering) frames is assumed
//! to be no longer in use by the device, and is rewritten with new content.

pub use self::{
    factory::{DescriptorSetFactory, DescriptorSetFactoryStats},
    state::DescriptorSetState,
};
use crate::{
    backend::{Backend, DescriptorPoolSize},
    macros::{gr_enum, impl_id_counter},
    shader::ShaderStages,
};
use smallvec::SmallVec;
use std::{fmt, num::NonZero, sync::Arc};

mod factory;
mod state;

/// Maximum binding number, plus one, of a descriptor set.
pub const MAX_BINDINGS_PER_DESCRIPTOR_SET: usize = 32;

gr_enum! {
    /// The type of a descriptor.
    DescriptorType;

    CombinedTextureSampler,
    Texture,
    Sampler,
    UniformBuffer,
    StorageBuffer,
    /// A storage image.
    Image,
    AccelerationStructure,
}

/// One binding of a descriptor set layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DescriptorBindingInfo {
    pub binding: u32,
    pub ty: DescriptorType,
    /// Number of array elements. `1` for a binding that isn't an array.
    pub array_size: u32,
    pub stages: ShaderStages,
}

/// A native descriptor set layout and the bindings it was created from.
pub struct DescriptorSetLayout<B: Backend> {
    id: NonZero<u64>,
    handle: B::DescriptorSetLayout,
    bindings: SmallVec<[DescriptorBindingInfo; 8]>,
    pool_sizes: SmallVec<[DescriptorPoolSize; DescriptorType::COUNT]>,
}

impl<B: Backend> DescriptorSetLayout<B> {
    /// Wraps a native descriptor set layout.
    ///
    /// # Panics
    ///
    /// - Panics if a binding number is used twice or is not below
    ///   [`MAX_BINDINGS_PER_DESCRIPTOR_SET`].
    /// - Panics if a binding has an array size of zero.
    pub fn from_handle(
        handle: B::DescriptorSetLayout,
        bindings: impl IntoIterator<Item = DescriptorBindingInfo>,
    ) -> Arc<Self> {
        let mut bindings: SmallVec<[DescriptorBindingInfo; 8]> = bindings.into_iter().collect();
        bindings.sort_unstable_by_key(|info| info.binding);

        let mut seen = 0u32;

        for info in &bindings {
            assert!((info.binding as usize) < MAX_BINDINGS_PER_DESCRIPTOR_SET);
            assert!(info.array_size > 0);
            assert!(
                seen & (1 << info.binding) == 0,
                "binding {} is used twice",
                info.binding,
            );
            seen |= 1 << info.binding;
        }

        let mut pool_sizes: SmallVec<[DescriptorPoolSize; DescriptorType::COUNT]> =
            SmallVec::new();

        for info in &bindings {
            match pool_sizes.iter_mut().find(|size| size.ty == info.ty) {
                Some(size) => size.descriptor_count += info.array_size,
                None => pool_sizes.push(DescriptorPoolSize {
                    ty: info.ty,
                    descriptor_count: info.array_size,
                }),
            }
        }

        Arc::new(DescriptorSetLayout {
            id: Self::next_id(),
            handle,
            bindings,
            pool_sizes,
        })
    }

    #[inline]
    pub fn handle(&self) -> B::DescriptorSetLayout {
        self.handle
    }

    /// The bindings, sorted by binding number.
    #[inline]
    pub fn bindings(&self) -> &[DescriptorBindingInfo] {
        &self.bindings
    }

    #[inline]
    pub fn binding(&self, binding: u32) -> Option<&DescriptorBindingInfo> {
        self.bindings.iter().find(|info| info.binding == binding)
    }

    /// Number of descriptors of each type that one set needs.
    #[inline]
    pub(crate) fn pool_sizes(&self) -> &[DescriptorPoolSize] {
        &self.pool_sizes
    }
}

impl<B: Backend> fmt::Debug for DescriptorSetLayout<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorSetLayout")
            .field("id", &self.id)
            .field("handle", &self.handle)
            .field("bindings", &self.bindings)
            .finish()
    }
}

impl_id_counter!(DescriptorSetLayout<B: Backend>);

#[cfg(test)]
mod tests {
    use super::{DescriptorBindingInfo, DescriptorSetLayout, DescriptorType};
    use crate::{
        backend::null::{NullBackend, NullHandle},
        shader::ShaderStages,
    };

    #[test]
    fn pool_sizes_sum_per_type() {
        let layout = DescriptorSetLayout::<NullBackend>::from_handle(
            NullHandle::new(),
            [
                DescriptorBindingInfo {
                    binding: 2,
                    ty: DescriptorType::Texture,
                    array_size: 4,
                    stages: ShaderStages::FRAGMENT,
                },
                DescriptorBindingInfo {
                    binding: 0,
                    ty: DescriptorType::UniformBuffer,
                    array_size: 1,
                    stages: ShaderStages::VERTEX,
                },
                DescriptorBindingInfo {
                    binding: 1,
                    ty: DescriptorType::Texture,
                    array_size: 1,
                    stages: ShaderStages::FRAGMENT,
                },
            ],
        );

        assert_eq!(layout.bindings()[0].binding, 0);
        assert_eq!(layout.pool_sizes().len(), 2);
        assert_eq!(
            layout
                .pool_sizes()
                .iter()
                .find(|size| size.ty == DescriptorType::Texture)
                .map(|size| size.descriptor_count),
            Some(5),
        );
    }

    #[test]
    #[should_panic]
    fn duplicate_binding() {
        let info = DescriptorBindingInfo {
            binding: 3,
            ty: DescriptorType::Sampler,
            array_size: 1,
            stages: ShaderStages::FRAGMENT,
        };

        DescriptorSetLayout::<NullBackend>::from_handle(NullHandle::new(), [info, info]);
    }
}

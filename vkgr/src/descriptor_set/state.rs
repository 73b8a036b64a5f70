// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

use super::{
    DescriptorSetFactory, DescriptorSetLayout, DescriptorType, MAX_BINDINGS_PER_DESCRIPTOR_SET,
};
use crate::{
    backend::{Backend, DescriptorWrite, DescriptorWriteResource},
    hash::{append_hash, compute_hash},
    resource::{AccelerationStructure, Buffer, BufferUsage, Sampler, TextureUsage, TextureView},
    sync::ImageLayout,
    DeviceSize, NativeError, WHOLE_SIZE,
};
use smallvec::SmallVec;
use std::{fmt, sync::Arc};

/// What is bound to one array element of one binding.
enum Slot<B: Backend> {
    TextureAndSampler {
        view: Arc<TextureView<B>>,
        layout: ImageLayout,
        sampler: Arc<Sampler<B>>,
    },
    Texture {
        view: Arc<TextureView<B>>,
        layout: ImageLayout,
    },
    Sampler(Arc<Sampler<B>>),
    UniformBuffer {
        buffer: Arc<Buffer<B>>,
        offset: DeviceSize,
        range: DeviceSize,
    },
    StorageBuffer {
        buffer: Arc<Buffer<B>>,
        offset: DeviceSize,
        range: DeviceSize,
    },
    Image(Arc<TextureView<B>>),
    AccelerationStructure(Arc<AccelerationStructure<B>>),
}

impl<B: Backend> Slot<B> {
    fn descriptor_type(&self) -> DescriptorType {
        match self {
            Slot::TextureAndSampler { .. } => DescriptorType::CombinedTextureSampler,
            Slot::Texture { .. } => DescriptorType::Texture,
            Slot::Sampler(_) => DescriptorType::Sampler,
            Slot::UniformBuffer { .. } => DescriptorType::UniformBuffer,
            Slot::StorageBuffer { .. } => DescriptorType::StorageBuffer,
            Slot::Image(_) => DescriptorType::Image,
            Slot::AccelerationStructure(_) => DescriptorType::AccelerationStructure,
        }
    }

    /// Hashes the identity of the bound objects and their metadata.
    fn content_hash(&self, seed: u64) -> u64 {
        match self {
            Slot::TextureAndSampler {
                view,
                layout,
                sampler,
            } => append_hash(&(0u8, view.id(), layout, sampler.id()), seed),
            Slot::Texture { view, layout } => append_hash(&(1u8, view.id(), layout), seed),
            Slot::Sampler(sampler) => append_hash(&(2u8, sampler.id()), seed),
            Slot::UniformBuffer {
                buffer,
                offset,
                range,
            } => append_hash(&(3u8, buffer.id(), offset, range), seed),
            Slot::StorageBuffer {
                buffer,
                offset,
                range,
            } => append_hash(&(4u8, buffer.id(), offset, range), seed),
            Slot::Image(view) => append_hash(&(5u8, view.id()), seed),
            Slot::AccelerationStructure(accel) => append_hash(&(6u8, accel.id()), seed),
        }
    }

    fn write_resource(&self) -> DescriptorWriteResource<'_, B> {
        match self {
            Slot::TextureAndSampler {
                view,
                layout,
                sampler,
            } => DescriptorWriteResource::CombinedImageSampler {
                view: view.handle(),
                layout: *layout,
                sampler: sampler.handle(),
            },
            Slot::Texture { view, layout } => DescriptorWriteResource::SampledImage {
                view: view.handle(),
                layout: *layout,
            },
            Slot::Sampler(sampler) => DescriptorWriteResource::Sampler(sampler.handle()),
            Slot::UniformBuffer {
                buffer,
                offset,
                range,
            } => DescriptorWriteResource::UniformBuffer {
                buffer: buffer.handle(),
                offset: *offset,
                range: *range,
            },
            Slot::StorageBuffer {
                buffer,
                offset,
                range,
            } => DescriptorWriteResource::StorageBuffer {
                buffer: buffer.handle(),
                offset: *offset,
                range: *range,
            },
            Slot::Image(view) => DescriptorWriteResource::StorageImage { view: view.handle() },
            Slot::AccelerationStructure(accel) => {
                DescriptorWriteResource::AccelerationStructure(accel.handle())
            }
        }
    }
}

/// The resources bound to one descriptor set index of a command buffer.
///
/// Binding marks the binding dirty. Dirty bindings stay dirty until [`flush`](Self::flush)
/// resolves the whole set into a native descriptor set.
pub struct DescriptorSetState<B: Backend> {
    layout: Option<Arc<DescriptorSetLayout<B>>>,
    bindings: [SmallVec<[Option<Slot<B>>; 1]>; MAX_BINDINGS_PER_DESCRIPTOR_SET],
    dirty_bindings: u32,
    layout_dirty: bool,
    bound_set: Option<B::DescriptorSet>,
}

impl<B: Backend> Default for DescriptorSetState<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> DescriptorSetState<B> {
    pub fn new() -> Self {
        DescriptorSetState {
            layout: None,
            bindings: std::array::from_fn(|_| SmallVec::new()),
            dirty_bindings: 0,
            layout_dirty: false,
            bound_set: None,
        }
    }

    /// Sets the layout the bound resources are resolved against. `None` if the bound program
    /// doesn't use this set.
    pub fn set_layout(&mut self, layout: Option<&Arc<DescriptorSetLayout<B>>>) {
        let same = match (&self.layout, layout) {
            (Some(a), Some(b)) => a.id() == b.id(),
            (None, None) => true,
            _ => false,
        };

        if !same {
            self.layout = layout.cloned();
            self.layout_dirty = true;
        }
    }

    #[inline]
    pub fn layout(&self) -> Option<&Arc<DescriptorSetLayout<B>>> {
        self.layout.as_ref()
    }

    /// Forces the next flush to return the set even if it didn't change. Used when the set has
    /// to be bound again, for example to a different bind point.
    #[inline]
    pub(crate) fn invalidate(&mut self) {
        self.layout_dirty = true;
        self.bound_set = None;
    }

    /// Returns whether the next flush will resolve the set.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.layout.is_some() && (self.layout_dirty || self.dirty_bindings != 0)
    }

    fn set_slot(&mut self, binding: u32, array_index: u32, slot: Slot<B>) {
        assert!(
            (binding as usize) < MAX_BINDINGS_PER_DESCRIPTOR_SET,
            "binding {} is out of range",
            binding,
        );

        let slots = &mut self.bindings[binding as usize];
        let index = array_index as usize;

        if slots.len() <= index {
            slots.resize_with(index + 1, || None);
        }

        slots[index] = Some(slot);
        self.dirty_bindings |= 1 << binding;
    }

    /// Binds a range of a uniform buffer. A `range` of [`WHOLE_SIZE`] binds the rest of the
    /// buffer.
    ///
    /// # Panics
    ///
    /// - Panics if the buffer lacks uniform usage or the range is out of the buffer.
    pub fn bind_uniform_buffer(
        &mut self,
        binding: u32,
        array_index: u32,
        buffer: &Arc<Buffer<B>>,
        offset: DeviceSize,
        range: DeviceSize,
    ) {
        assert!(buffer.usage().intersects(BufferUsage::ALL_UNIFORM));
        let range = buffer_range(buffer, offset, range);

        self.set_slot(
            binding,
            array_index,
            Slot::UniformBuffer {
                buffer: buffer.clone(),
                offset,
                range,
            },
        );
    }

    /// Binds a range of a storage buffer. A `range` of [`WHOLE_SIZE`] binds the rest of the
    /// buffer.
    ///
    /// # Panics
    ///
    /// - Panics if the buffer lacks storage usage or the range is out of the buffer.
    pub fn bind_storage_buffer(
        &mut self,
        binding: u32,
        array_index: u32,
        buffer: &Arc<Buffer<B>>,
        offset: DeviceSize,
        range: DeviceSize,
    ) {
        assert!(buffer.usage().intersects(BufferUsage::ALL_STORAGE));
        let range = buffer_range(buffer, offset, range);

        self.set_slot(
            binding,
            array_index,
            Slot::StorageBuffer {
                buffer: buffer.clone(),
                offset,
                range,
            },
        );
    }

    /// Binds a sampled texture. Its layout is the one of the sampled usages of the texture.
    pub fn bind_texture(&mut self, binding: u32, array_index: u32, view: &Arc<TextureView<B>>) {
        let layout = sampled_layout(view);

        self.set_slot(
            binding,
            array_index,
            Slot::Texture {
                view: view.clone(),
                layout,
            },
        );
    }

    pub fn bind_texture_and_sampler(
        &mut self,
        binding: u32,
        array_index: u32,
        view: &Arc<TextureView<B>>,
        sampler: &Arc<Sampler<B>>,
    ) {
        let layout = sampled_layout(view);

        self.set_slot(
            binding,
            array_index,
            Slot::TextureAndSampler {
                view: view.clone(),
                layout,
                sampler: sampler.clone(),
            },
        );
    }

    pub fn bind_sampler(&mut self, binding: u32, array_index: u32, sampler: &Arc<Sampler<B>>) {
        self.set_slot(binding, array_index, Slot::Sampler(sampler.clone()));
    }

    /// Binds a storage image.
    ///
    /// # Panics
    ///
    /// - Panics if the view covers more than one mip level.
    /// - Panics if the texture lacks image usage.
    pub fn bind_image(&mut self, binding: u32, array_index: u32, view: &Arc<TextureView<B>>) {
        assert_eq!(
            view.subresource().mipmap_count,
            1,
            "a storage image view must cover exactly one mip level",
        );
        assert!(view.texture().usage().intersects(TextureUsage::ALL_IMAGE));

        self.set_slot(binding, array_index, Slot::Image(view.clone()));
    }

    pub fn bind_acceleration_structure(
        &mut self,
        binding: u32,
        array_index: u32,
        accel: &Arc<AccelerationStructure<B>>,
    ) {
        self.set_slot(
            binding,
            array_index,
            Slot::AccelerationStructure(accel.clone()),
        );
    }

    /// Resolves the set if it is dirty.
    ///
    /// Returns the native set to bind, or `None` if the set bound last is still the right one.
    /// With `validate`, every binding of the layout must be bound with a resource of the right
    /// type; otherwise unbound elements are left unwritten.
    ///
    /// # Panics
    ///
    /// - Panics if `validate` is true and a binding is missing or has the wrong type.
    pub fn flush(
        &mut self,
        factory: &DescriptorSetFactory<B>,
        validate: bool,
    ) -> Result<Option<B::DescriptorSet>, NativeError> {
        if !self.is_dirty() {
            return Ok(None);
        }

        let Some(layout) = self.layout.clone() else {
            return Ok(None);
        };

        let mut hash = compute_hash(&layout.id());

        for info in layout.bindings() {
            let slots = &self.bindings[info.binding as usize];

            for array_index in 0..info.array_size {
                let slot = slots.get(array_index as usize).and_then(Option::as_ref);

                match slot {
                    Some(slot) => {
                        if validate {
                            assert_eq!(
                                slot.descriptor_type(),
                                info.ty,
                                "binding {}[{}] has the wrong descriptor type",
                                info.binding,
                                array_index,
                            );
                        }

                        hash = append_hash(&(info.binding, array_index), hash);
                        hash = slot.content_hash(hash);
                    }
                    None => {
                        assert!(
                            !validate,
                            "binding {}[{}] is not bound",
                            info.binding,
                            array_index,
                        );
                    }
                }
            }
        }

        let bindings = &self.bindings;
        let (set, written) = factory.get_or_create(&layout, hash, || {
            let mut writes = SmallVec::<[DescriptorWrite<'_, B>; 8]>::new();

            for info in layout.bindings() {
                let slots = &bindings[info.binding as usize];

                for (array_index, slot) in slots.iter().enumerate().take(info.array_size as usize)
                {
                    if let Some(slot) = slot
                        .as_ref()
                        .filter(|slot| slot.descriptor_type() == info.ty)
                    {
                        writes.push(DescriptorWrite {
                            binding: info.binding,
                            array_element: array_index as u32,
                            resource: slot.write_resource(),
                        });
                    }
                }
            }

            writes
        })?;

        self.dirty_bindings = 0;
        self.layout_dirty = false;

        if !written && self.bound_set == Some(set) {
            Ok(None)
        } else {
            self.bound_set = Some(set);
            Ok(Some(set))
        }
    }

    /// Unbinds everything and forgets the layout.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

fn buffer_range<B: Backend>(
    buffer: &Buffer<B>,
    offset: DeviceSize,
    range: DeviceSize,
) -> DeviceSize {
    assert!(offset < buffer.size(), "offset {} is out of the buffer", offset);

    let range = if range == WHOLE_SIZE {
        buffer.size() - offset
    } else {
        range
    };

    assert!(
        range > 0 && offset + range <= buffer.size(),
        "range {}..{} is out of the buffer",
        offset,
        offset + range,
    );

    range
}

fn sampled_layout<B: Backend>(view: &TextureView<B>) -> ImageLayout {
    let texture = view.texture();
    let usage = texture.usage() & TextureUsage::ALL_SAMPLED;
    assert!(!usage.is_empty(), "texture `{}` can't be sampled", texture.name());

    texture.layout(usage, view.subresource().first_mipmap)
}

impl<B: Backend> fmt::Debug for DescriptorSetState<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorSetState")
            .field("layout", &self.layout)
            .field("dirty_bindings", &format_args!("{:#034b}", self.dirty_bindings))
            .field("layout_dirty", &self.layout_dirty)
            .field("bound_set", &self.bound_set)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::DescriptorSetState;
    use crate::{
        backend::null::{NullBackend, NullHandle},
        descriptor_set::{
            DescriptorBindingInfo, DescriptorSetFactory, DescriptorSetLayout, DescriptorType,
        },
        resource::BufferUsage,
        shader::ShaderStages,
        GrConfig, WHOLE_SIZE,
    };
    use std::sync::Arc;

    fn two_buffer_layout() -> Arc<DescriptorSetLayout<NullBackend>> {
        DescriptorSetLayout::from_handle(
            NullHandle::new(),
            [0, 1].map(|binding| DescriptorBindingInfo {
                binding,
                ty: DescriptorType::UniformBuffer,
                array_size: 1,
                stages: ShaderStages::VERTEX,
            }),
        )
    }

    #[test]
    fn flush_resolves_once() {
        let backend = Arc::new(NullBackend::new());
        let factory = DescriptorSetFactory::new(backend.clone(), &GrConfig::default());
        let layout = two_buffer_layout();
        let a = gr_buffer!(256, BufferUsage::UNIFORM_GEOMETRY);
        let b = gr_buffer!(256, BufferUsage::UNIFORM_GEOMETRY);

        let mut state = DescriptorSetState::new();
        assert!(!state.is_dirty());

        state.set_layout(Some(&layout));
        state.bind_uniform_buffer(0, 0, &a, 0, WHOLE_SIZE);
        state.bind_uniform_buffer(1, 0, &b, 0, 64);
        assert!(state.is_dirty());

        let first = state.flush(&factory, true).unwrap();
        assert!(first.is_some());
        assert!(!state.is_dirty());
        assert_eq!(state.flush(&factory, true).unwrap(), None);

        // Rebinding the same resources resolves to the bound set.
        state.bind_uniform_buffer(1, 0, &b, 0, 64);
        assert!(state.is_dirty());
        assert_eq!(state.flush(&factory, true).unwrap(), None);

        state.bind_uniform_buffer(1, 0, &b, 64, 64);
        let second = state.flush(&factory, true).unwrap();
        assert!(second.is_some() && second != first);

        // Going back to the first content hits the cache.
        state.bind_uniform_buffer(1, 0, &b, 0, 64);
        assert_eq!(state.flush(&factory, true).unwrap(), first);
        assert_eq!(backend.allocated_descriptor_set_count(), 2);
    }

    #[test]
    fn binding_keeps_siblings_dirty() {
        let backend = Arc::new(NullBackend::new());
        let factory = DescriptorSetFactory::new(backend, &GrConfig::default());
        let layout = two_buffer_layout();
        let a = gr_buffer!(256, BufferUsage::UNIFORM_FRAGMENT);

        let mut state = DescriptorSetState::new();
        state.set_layout(Some(&layout));
        state.bind_uniform_buffer(0, 0, &a, 0, WHOLE_SIZE);
        state.bind_uniform_buffer(1, 0, &a, 0, WHOLE_SIZE);
        state.bind_uniform_buffer(0, 0, &a, 128, WHOLE_SIZE);

        assert_eq!(state.dirty_bindings, 0b11);
        state.flush(&factory, true).unwrap();
        assert_eq!(state.dirty_bindings, 0);
    }

    #[test]
    fn no_layout_no_set() {
        let backend = Arc::new(NullBackend::new());
        let factory = DescriptorSetFactory::new(backend, &GrConfig::default());
        let a = gr_buffer!(256, BufferUsage::UNIFORM_COMPUTE);

        let mut state = DescriptorSetState::new();
        state.bind_uniform_buffer(0, 0, &a, 0, WHOLE_SIZE);

        assert!(!state.is_dirty());
        assert_eq!(state.flush(&factory, true).unwrap(), None);
    }

    #[test]
    #[should_panic = "is not bound"]
    fn validation_catches_missing_binding() {
        let backend = Arc::new(NullBackend::new());
        let factory = DescriptorSetFactory::new(backend, &GrConfig::default());
        let layout = two_buffer_layout();
        let a = gr_buffer!(256, BufferUsage::UNIFORM_GEOMETRY);

        let mut state = DescriptorSetState::new();
        state.set_layout(Some(&layout));
        state.bind_uniform_buffer(0, 0, &a, 0, WHOLE_SIZE);
        let _ = state.flush(&factory, true);
    }

    #[test]
    #[should_panic]
    fn range_out_of_buffer() {
        let a = gr_buffer!(256, BufferUsage::UNIFORM_GEOMETRY);
        DescriptorSetState::<NullBackend>::new().bind_uniform_buffer(0, 0, &a, 200, 100);
    }
}

// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

use crate::resource::{GrObject, GrObjectType};
use std::{fmt, sync::Arc};

/// Strong references to the objects used by the commands of a command buffer, one bucket per
/// object type.
///
/// Commands tend to reference the same few objects over and over, so a new reference is only
/// appended if it isn't among the last `search_window` entries of its bucket. An object can still
/// end up in a bucket more than once, which is harmless.
pub(crate) struct ObjectReferences {
    buckets: [Vec<Arc<dyn GrObject>>; GrObjectType::COUNT],
    search_window: usize,
}

impl ObjectReferences {
    pub(crate) fn new(search_window: usize) -> Self {
        ObjectReferences {
            buckets: Default::default(),
            search_window,
        }
    }

    pub(crate) fn push(&mut self, object: Arc<dyn GrObject>) {
        let uuid = object.uuid();
        let bucket = &mut self.buckets[object.object_type() as usize];
        let start = bucket.len().saturating_sub(self.search_window);

        if bucket[start..].iter().any(|existing| existing.uuid() == uuid) {
            return;
        }

        bucket.push(object);
    }

    #[inline]
    pub(crate) fn push_arc<T: GrObject>(&mut self, object: &Arc<T>) {
        self.push(object.clone());
    }

    /// Total number of references held.
    pub(crate) fn len(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, ty: GrObjectType, uuid: std::num::NonZero<u64>) -> bool {
        self.buckets[ty as usize]
            .iter()
            .any(|object| object.uuid() == uuid)
    }

    /// Drops every reference. Keeps the allocations.
    pub(crate) fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
    }
}

impl fmt::Debug for ObjectReferences {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_map();

        for ty in GrObjectType::ALL {
            let count = self.buckets[ty as usize].len();

            if count != 0 {
                list.entry(&ty, &count);
            }
        }

        list.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::ObjectReferences;
    use crate::{
        backend::null::{NullBackend, NullHandle},
        resource::{BufferUsage, GrObjectType, Sampler},
    };
    use std::sync::Arc;

    #[test]
    fn dedups_within_window() {
        let mut refs = ObjectReferences::new(4);
        let buffer = gr_buffer!(16, BufferUsage::VERTEX);

        refs.push_arc(&buffer);
        refs.push_arc(&buffer);
        assert_eq!(refs.len(), 1);
        assert_eq!(Arc::strong_count(&buffer), 2);

        // Other types don't push the buffer out of its window.
        let samplers: Vec<_> = (0..8)
            .map(|_| Sampler::<NullBackend>::from_handle(NullHandle::new()))
            .collect();

        for sampler in &samplers {
            refs.push_arc(sampler);
        }

        refs.push_arc(&buffer);
        assert_eq!(refs.len(), 9);
        assert!(refs.contains(GrObjectType::Buffer, buffer.id()));
    }

    #[test]
    fn pushed_out_of_window_is_appended_again() {
        let mut refs = ObjectReferences::new(2);
        let buffers: Vec<_> = (0..3)
            .map(|_| gr_buffer!(16, BufferUsage::INDEX))
            .collect();

        for buffer in &buffers {
            refs.push_arc(buffer);
        }

        refs.push_arc(&buffers[0]);
        assert_eq!(refs.len(), 4);
        assert_eq!(Arc::strong_count(&buffers[0]), 3);

        refs.clear();
        assert_eq!(refs.len(), 0);
        assert_eq!(Arc::strong_count(&buffers[0]), 1);
    }
}

// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Tunables of the backend core.

use crate::NonExhaustive;
use std::time::Duration;

/// Longest time a fence wait is allowed to block.
pub const MAX_FENCE_WAIT: Duration = Duration::from_secs(10);

/// Parameters to create a new [`GrManager`](crate::GrManager).
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct GrConfig {
    /// Check bound descriptors against the layouts of the bound program before every draw.
    ///
    /// The default value is `cfg!(debug_assertions)`.
    pub validation: bool,

    /// Route compute work to a dedicated compute queue when the backend has one.
    ///
    /// The default value is `true`.
    pub async_compute: bool,

    /// Number of sets the first descriptor pool of a layout can hold.
    ///
    /// The default value is `64`.
    pub descriptor_pool_initial_size: u32,

    /// Growth factor of every following descriptor pool.
    ///
    /// The default value is `2.0`.
    pub descriptor_pool_size_scale: f32,

    /// Number of frames a cached descriptor set must go unused before its slot can be rewritten.
    ///
    /// The default value is `300`.
    pub descriptor_frame_buffering: u32,

    /// Longest time a fence wait blocks. Values above [`MAX_FENCE_WAIT`] are clamped.
    ///
    /// The default value is [`MAX_FENCE_WAIT`].
    pub max_fence_wait: Duration,

    /// Number of most recent entries searched before a new object reference is appended.
    ///
    /// The default value is `16`.
    pub reference_search_window: usize,

    /// Size in bytes of the push constant block.
    ///
    /// The default value is `128`.
    pub max_push_constant_size: u32,

    #[cfg_attr(feature = "serde", serde(skip))]
    pub _ne: NonExhaustive,
}

impl Default for GrConfig {
    #[inline]
    fn default() -> Self {
        Self {
            validation: cfg!(debug_assertions),
            async_compute: true,
            descriptor_pool_initial_size: 64,
            descriptor_pool_size_scale: 2.0,
            descriptor_frame_buffering: 300,
            max_fence_wait: MAX_FENCE_WAIT,
            reference_search_window: 16,
            max_push_constant_size: 128,
            _ne: NonExhaustive(()),
        }
    }
}

impl GrConfig {
    /// Clamps values that are out of range and logs what was changed.
    pub(crate) fn sanitized(mut self) -> Self {
        if self.max_fence_wait > MAX_FENCE_WAIT {
            log::warn!(
                "max_fence_wait of {:?} clamped to {:?}",
                self.max_fence_wait,
                MAX_FENCE_WAIT,
            );
            self.max_fence_wait = MAX_FENCE_WAIT;
        }

        if self.descriptor_pool_initial_size == 0 {
            log::warn!("descriptor_pool_initial_size of 0 raised to 1");
            self.descriptor_pool_initial_size = 1;
        }

        if self.descriptor_pool_size_scale.is_nan() || self.descriptor_pool_size_scale < 1.0 {
            log::warn!(
                "descriptor_pool_size_scale of {} raised to 1.0",
                self.descriptor_pool_size_scale,
            );
            self.descriptor_pool_size_scale = 1.0;
        }

        self
    }
}

#[cfg(test)]
mod tests {
    use super::{GrConfig, MAX_FENCE_WAIT};
    use std::time::Duration;

    #[test]
    fn defaults() {
        let config = GrConfig::default();

        assert_eq!(config.descriptor_pool_initial_size, 64);
        assert_eq!(config.descriptor_frame_buffering, 300);
        assert_eq!(config.reference_search_window, 16);
        assert_eq!(config.max_fence_wait, MAX_FENCE_WAIT);
    }

    #[test]
    fn sanitize_clamps() {
        let config = GrConfig {
            max_fence_wait: Duration::from_secs(60),
            descriptor_pool_initial_size: 0,
            descriptor_pool_size_scale: 0.5,
            ..Default::default()
        }
        .sanitized();

        assert_eq!(config.max_fence_wait, MAX_FENCE_WAIT);
        assert_eq!(config.descriptor_pool_initial_size, 1);
        assert_eq!(config.descriptor_pool_size_scale, 1.0);
    }
}

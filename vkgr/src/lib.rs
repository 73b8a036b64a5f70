// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Command recording and pipeline state caching core of a Vulkan rendering backend.
//!
//! # Brief summary
//!
//! - A [`GrManager`] owns the shared state of the backend: the per-thread
//!   [command buffer pools](command_buffer::CommandBufferFactory), the
//!   [pipeline cache](pipeline::PipelineFactory) and the
//!   [descriptor set allocator](descriptor_set::DescriptorSetFactory).
//!
//! - A [`CommandBuffer`](command_buffer::CommandBuffer) records high level commands. Fixed
//!   function state is collected by a [`PipelineStateTracker`](pipeline::PipelineStateTracker)
//!   and only turned into a native pipeline when a draw is issued. Barriers, query resets, query
//!   result copies and secondary command buffer executions are batched and emitted in groups.
//!
//! - Every object referenced by a recorded command is kept alive by the command buffer until the
//!   GPU has signaled the [`Fence`](sync::Fence) of the submission.
//!
//! - The [`RenderableDrawer`](drawer::RenderableDrawer) merges consecutive compatible renderables
//!   into instanced draw calls.
//!
//! Everything is generic over a [`Backend`](backend::Backend). The
//! [`VulkanBackend`](backend::vulkan::VulkanBackend) drives a real device through `ash`, the
//! [`NullBackend`](backend::null::NullBackend) records every native call so that the recording
//! logic can be inspected without a GPU.

pub use crate::{
    backend::Backend,
    command_buffer::{CommandBuffer, CommandBufferInitInfo, QueueType},
    config::GrConfig,
    device::GrManager,
};
use std::{error::Error, fmt};

#[macro_use]
mod tests;
mod macros;

pub mod backend;
mod cache;
pub mod command_buffer;
pub mod config;
pub mod descriptor_set;
pub mod device;
pub mod drawer;
pub mod format;
mod hash;
pub mod pipeline;
pub mod render_pass;
pub mod resource;
pub mod shader;
pub mod sync;

/// Represents memory size and offset values on a device.
pub type DeviceSize = u64;

/// Special size meaning "until the end of the buffer".
pub const WHOLE_SIZE: DeviceSize = u64::MAX;

/// Error returned by a native backend call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NativeError {
    OutOfHostMemory,
    OutOfDeviceMemory,
    OutOfPoolMemory,
    FragmentedPool,
    DeviceLost,
    /// A wait on a fence did not complete in time.
    Timeout,
    /// The requested feature has not been enabled on the backend.
    FeatureNotEnabled,
    Unnamed(i32),
}

impl NativeError {
    /// Returns whether this error means that a descriptor pool ran out of space, in which case a
    /// new pool should be created.
    #[inline]
    pub fn is_pool_exhausted(self) -> bool {
        matches!(self, Self::OutOfPoolMemory | Self::FragmentedPool)
    }
}

impl Error for NativeError {}

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeError::OutOfHostMemory => write!(f, "A host memory allocation has failed."),
            NativeError::OutOfDeviceMemory => {
                write!(f, "A device memory allocation has failed.")
            }
            NativeError::OutOfPoolMemory => write!(f, "A pool memory allocation has failed."),
            NativeError::FragmentedPool => write!(
                f,
                "A pool allocation has failed due to fragmentation of the pool's memory.",
            ),
            NativeError::DeviceLost => write!(f, "The logical or physical device has been lost."),
            NativeError::Timeout => write!(f, "A wait operation has not completed in time."),
            NativeError::FeatureNotEnabled => {
                write!(f, "The backend was created without the required feature.")
            }
            NativeError::Unnamed(result) => {
                write!(f, "Unnamed error, VkResult value {}", result)
            }
        }
    }
}

impl From<ash::vk::Result> for NativeError {
    fn from(val: ash::vk::Result) -> Self {
        match val {
            ash::vk::Result::ERROR_OUT_OF_HOST_MEMORY => NativeError::OutOfHostMemory,
            ash::vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => NativeError::OutOfDeviceMemory,
            ash::vk::Result::ERROR_OUT_OF_POOL_MEMORY => NativeError::OutOfPoolMemory,
            ash::vk::Result::ERROR_FRAGMENTED_POOL => NativeError::FragmentedPool,
            ash::vk::Result::ERROR_DEVICE_LOST => NativeError::DeviceLost,
            ash::vk::Result::TIMEOUT => NativeError::Timeout,
            ash::vk::Result::ERROR_EXTENSION_NOT_PRESENT
            | ash::vk::Result::ERROR_FEATURE_NOT_PRESENT => NativeError::FeatureNotEnabled,
            other => NativeError::Unnamed(other.as_raw()),
        }
    }
}

/// A helper type for non-exhaustive structs.
///
/// This type cannot be constructed outside this crate. Structures with a field of this type can
/// only be constructed by calling a constructor function or `Default::default()`. The effect is
/// similar to the standard Rust `#[non_exhaustive]` attribute, except that it does not prevent
/// update syntax from being used.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct NonExhaustive(pub(crate) ());

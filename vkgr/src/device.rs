// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! The entry point of the crate.
//!
//! A [`GrManager`] wraps a [`Backend`] together with the state shared by every command buffer:
//! the command buffer factory, the pipeline cache and the descriptor set allocator.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use vkgr::{backend::null::NullBackend, CommandBufferInitInfo, GrConfig, GrManager};
//!
//! let backend = Arc::new(NullBackend::new());
//! let manager = GrManager::new(backend, GrConfig::default()).unwrap();
//!
//! let mut cmdb = manager
//!     .new_command_buffer(CommandBufferInitInfo::default())
//!     .unwrap();
//! // ... record commands ...
//! cmdb.end_recording().unwrap();
//!
//! let fence = manager.submit(cmdb).unwrap();
//! # let _ = fence;
//! ```

use crate::{
    command_buffer::{
        CommandBuffer, CommandBufferFactory, CommandBufferFactoryStats, CommandBufferInitInfo,
    },
    config::GrConfig,
    descriptor_set::{DescriptorSetFactory, DescriptorSetFactoryStats},
    pipeline::{PipelineFactory, PipelineFactoryStats},
    sync::Fence,
    Backend, NativeError,
};
use std::{fmt, sync::Arc};

/// State shared by the manager and every command buffer it created.
pub(crate) struct Shared<B: Backend> {
    pub(crate) backend: Arc<B>,
    pub(crate) config: GrConfig,
    pub(crate) command_buffer_factory: CommandBufferFactory<B>,
    pub(crate) pipeline_factory: PipelineFactory<B>,
    pub(crate) descriptor_set_factory: DescriptorSetFactory<B>,
}

/// Counters of every factory of a [`GrManager`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GrManagerStats {
    pub command_buffers: CommandBufferFactoryStats,
    pub pipelines: PipelineFactoryStats,
    pub descriptor_sets: DescriptorSetFactoryStats,
}

/// Owns the backend and the caches shared by command buffers.
///
/// `GrManager` is `Send + Sync`: command buffers can be created and recorded on any number of
/// threads at once.
pub struct GrManager<B: Backend> {
    shared: Arc<Shared<B>>,
}

impl<B: Backend> GrManager<B> {
    /// Creates a new `GrManager`. Out of range values of `config` are clamped.
    ///
    /// Returns [`NativeError::FeatureNotEnabled`] if the backend has no general queue.
    pub fn new(backend: Arc<B>, config: GrConfig) -> Result<Self, NativeError> {
        let config = config.sanitized();
        let command_buffer_factory = CommandBufferFactory::new(backend.clone(), &config)?;
        let pipeline_factory = PipelineFactory::new(backend.clone());
        let descriptor_set_factory = DescriptorSetFactory::new(backend.clone(), &config);

        log::debug!("created a manager with {:?}", config);

        Ok(GrManager {
            shared: Arc::new(Shared {
                backend,
                config,
                command_buffer_factory,
                pipeline_factory,
                descriptor_set_factory,
            }),
        })
    }

    #[inline]
    pub fn backend(&self) -> &Arc<B> {
        &self.shared.backend
    }

    #[inline]
    pub fn config(&self) -> &GrConfig {
        &self.shared.config
    }

    #[inline]
    pub fn command_buffer_factory(&self) -> &CommandBufferFactory<B> {
        &self.shared.command_buffer_factory
    }

    #[inline]
    pub fn pipeline_factory(&self) -> &PipelineFactory<B> {
        &self.shared.pipeline_factory
    }

    #[inline]
    pub fn descriptor_set_factory(&self) -> &DescriptorSetFactory<B> {
        &self.shared.descriptor_set_factory
    }

    /// Acquires a command buffer of the current thread and begins recording.
    ///
    /// # Panics
    ///
    /// - Panics if `init_info.framebuffer` is missing for a secondary command buffer, or given
    ///   for a primary one.
    pub fn new_command_buffer(
        &self,
        init_info: CommandBufferInitInfo<B>,
    ) -> Result<CommandBuffer<B>, NativeError> {
        CommandBuffer::new(self.shared.clone(), init_info)
    }

    /// Submits a finalized primary command buffer to its queue.
    ///
    /// Everything the command buffer references stays alive until the returned fence signals.
    ///
    /// # Panics
    ///
    /// - Panics if the command buffer is still recording or is a secondary one.
    pub fn submit(&self, command_buffer: CommandBuffer<B>) -> Result<Arc<Fence<B>>, NativeError> {
        assert!(
            command_buffer.is_finalized(),
            "command buffer `{}` submitted while recording",
            command_buffer.name(),
        );
        assert!(
            !command_buffer.is_second_level(),
            "secondary command buffers are executed, not submitted",
        );

        let shared = &self.shared;
        let fence = Fence::new(shared.backend.clone(), shared.config.max_fence_wait)?;
        let queue_family_index = shared
            .command_buffer_factory
            .queue_family_index(command_buffer.queue());

        unsafe {
            shared.backend.queue_submit(
                queue_family_index,
                &[command_buffer.handle()],
                fence.handle(),
            )
        }
        .inspect_err(|err| {
            log::error!(
                "failed to submit command buffer `{}`: {}",
                command_buffer.name(),
                err,
            );
        })?;

        log::trace!(
            "submitted command buffer `{}` to {:?} queue with fence {:?}",
            command_buffer.name(),
            command_buffer.queue(),
            fence.handle(),
        );

        command_buffer.alloc().set_fence(fence.clone());

        Ok(fence)
    }

    /// Advances the frame counter of the descriptor set cache.
    #[inline]
    pub fn end_frame(&self) {
        self.shared.descriptor_set_factory.new_frame();
    }

    /// Waits until the device is idle.
    pub fn finish(&self) -> Result<(), NativeError> {
        self.shared.backend.wait_idle().inspect_err(|err| {
            log::error!("failed to wait for the device: {}", err);
        })
    }

    /// Frees the idle command buffers of the current thread. Returns how many were freed.
    #[inline]
    pub fn trim_command_buffers(&self) -> usize {
        self.shared.command_buffer_factory.trim()
    }

    pub fn stats(&self) -> GrManagerStats {
        GrManagerStats {
            command_buffers: self.shared.command_buffer_factory.stats(),
            pipelines: self.shared.pipeline_factory.stats(),
            descriptor_sets: self.shared.descriptor_set_factory.stats(),
        }
    }
}

impl<B: Backend> Drop for GrManager<B> {
    fn drop(&mut self) {
        // Command buffers still alive keep the factories alive, and the factories destroy their
        // native objects once the last of them is gone.
        match self.shared.backend.wait_idle() {
            Ok(()) => self.shared.command_buffer_factory.release_references(),
            Err(err) => log::error!("failed to wait for the device on drop: {}", err),
        }
    }
}

impl<B: Backend> fmt::Debug for GrManager<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrManager")
            .field("config", &self.shared.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::GrManager;
    use crate::{
        backend::null::{NullBackend, NullHandle},
        command_buffer::{CommandBufferFlags, CommandBufferInitInfo, QueueType},
        format::Format,
        pipeline::PrimitiveTopology,
        resource::BufferUsage,
        GrConfig, WHOLE_SIZE,
    };
    use std::{sync::Arc, thread};

    #[test]
    fn references_released_after_fence() {
        let backend = Arc::new(NullBackend::new());
        let manager = GrManager::new(backend.clone(), GrConfig::default()).unwrap();
        let buffer = gr_buffer!(64, BufferUsage::TRANSFER_DESTINATION);

        let mut cmdb = manager
            .new_command_buffer(CommandBufferInitInfo::default())
            .unwrap();
        cmdb.fill_buffer(&buffer, 0, WHOLE_SIZE, 0);
        cmdb.end_recording().unwrap();

        let fence = manager.submit(cmdb).unwrap();
        assert_eq!(Arc::strong_count(&buffer), 2);

        // Acquiring reclaims what the device is done with.
        drop(
            manager
                .new_command_buffer(CommandBufferInitInfo::default())
                .unwrap(),
        );
        assert_eq!(Arc::strong_count(&buffer), 2);

        backend.signal_fence(fence.handle());
        drop(
            manager
                .new_command_buffer(CommandBufferInitInfo::default())
                .unwrap(),
        );
        assert_eq!(Arc::strong_count(&buffer), 1);
        assert_eq!(manager.stats().command_buffers.created_command_buffers, 2);
    }

    #[test]
    fn submitted_to_compute_queue() {
        let backend = Arc::new(NullBackend::new());
        let manager = GrManager::new(backend.clone(), GrConfig::default()).unwrap();

        let mut cmdb = manager
            .new_command_buffer(CommandBufferInitInfo {
                flags: CommandBufferFlags::COMPUTE_WORK,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(cmdb.queue(), QueueType::Compute);
        cmdb.end_recording().unwrap();
        let handle = cmdb.handle();

        manager.submit(cmdb).unwrap();
        let submissions = backend.submissions();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].queue_family_index, 1);
        assert_eq!(submissions[0].command_buffers, [handle]);
    }

    #[test]
    #[should_panic = "submitted while recording"]
    fn submit_while_recording() {
        let backend = Arc::new(NullBackend::new());
        let manager = GrManager::new(backend, GrConfig::default()).unwrap();

        let cmdb = manager
            .new_command_buffer(CommandBufferInitInfo::default())
            .unwrap();
        let _ = manager.submit(cmdb);
    }

    #[test]
    fn drop_destroys_native_objects() {
        let backend = Arc::new(NullBackend::new());
        let manager = GrManager::new(backend.clone(), GrConfig::default()).unwrap();
        let program = gr_graphics_program!(0, 0b1);
        let framebuffer = gr_framebuffer!(NullHandle::new(), [Format::R8G8B8A8Unorm], None);

        let mut secondary = manager
            .new_command_buffer(CommandBufferInitInfo {
                flags: CommandBufferFlags::GENERAL_WORK | CommandBufferFlags::SECOND_LEVEL,
                framebuffer: Some(framebuffer.clone()),
                ..Default::default()
            })
            .unwrap();
        secondary.bind_shader_program(&program);
        secondary.set_viewport(0, 0, 16, 16);
        secondary
            .draw_arrays(PrimitiveTopology::TriangleList, 3, 1, 0, 0)
            .unwrap();
        secondary.end_recording().unwrap();
        let secondary = Arc::new(secondary);

        let mut cmdb = manager
            .new_command_buffer(CommandBufferInitInfo::default())
            .unwrap();
        cmdb.begin_render_pass(&framebuffer, 0, 0, u32::MAX, u32::MAX);
        cmdb.push_second_level_command_buffer(&secondary);
        cmdb.end_render_pass();
        cmdb.end_recording().unwrap();
        drop(secondary);

        let fence = manager.submit(cmdb).unwrap();
        backend.signal_fence(fence.handle());
        drop(fence);

        assert_eq!(backend.live_command_buffer_count(), 2);
        assert_eq!(backend.live_pipeline_count(), 1);

        drop(manager);

        assert_eq!(backend.live_command_buffer_count(), 0);
        assert_eq!(backend.live_pipeline_count(), 0);
        assert_eq!(backend.live_fence_count(), 0);
        assert_eq!(backend.live_descriptor_pool_count(), 0);
    }

    #[test]
    fn record_on_many_threads() {
        let backend = Arc::new(NullBackend::new());
        backend.set_auto_signal(true);
        let manager = GrManager::new(backend.clone(), GrConfig::default()).unwrap();
        let buffer = gr_buffer!(256, BufferUsage::TRANSFER_DESTINATION);

        thread::scope(|scope| {
            for i in 0..4 {
                let manager = &manager;
                let buffer = &buffer;

                scope.spawn(move || {
                    for _ in 0..8 {
                        let mut cmdb = manager
                            .new_command_buffer(CommandBufferInitInfo::default())
                            .unwrap();
                        cmdb.fill_buffer(buffer, 0, 4, i);
                        cmdb.end_recording().unwrap();
                        manager.submit(cmdb).unwrap().wait(Default::default()).unwrap();
                    }
                });
            }
        });

        assert_eq!(backend.submissions().len(), 32);

        let stats = manager.stats().command_buffers;
        assert_eq!(
            stats.created_command_buffers + stats.reused_command_buffers,
            32,
        );
        // One command buffer per thread at most, since every fence signals at submission.
        assert!(stats.created_command_buffers <= 4);
    }
}

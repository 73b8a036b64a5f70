// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Recording of commands.
//!
//! A [`CommandBuffer`] is created by [`GrManager::new_command_buffer`](crate::GrManager), recorded
//! from one thread, then either submitted or executed by a primary command buffer.
//!
//! # Lifetime of the native command buffer
//!
//! Native command buffers come from the per-thread pools of the [`CommandBufferFactory`]. When a
//! `CommandBuffer` is dropped its native command buffer goes back to the pool of the thread that
//! created it, together with every object the recorded commands referenced. It is reused only
//! once the fence of its submission, if any, has signaled. Until then the referenced objects are
//! kept alive.
//!
//! # Batching
//!
//! Barriers, query resets, query result copies and executions of secondary command buffers are
//! not recorded right away. Consecutive commands of the same kind are gathered and recorded as
//! one native command when a command of another kind comes in.

pub use self::{
    pool::{CommandBufferFactory, CommandBufferFactoryStats},
    recorder::CommandBuffer,
};
use crate::{
    backend::Backend, macros::gr_bitflags, macros::gr_enum, render_pass::Framebuffer,
    NonExhaustive,
};
use std::sync::Arc;

mod batch;
mod dynamic_state;
mod pool;
mod recorder;
mod references;

gr_enum! {
    /// The queue a command buffer is submitted to.
    QueueType;

    General,
    /// A dedicated compute queue.
    Compute,
}

gr_bitflags! {
    /// Properties of a new command buffer.
    CommandBufferFlags = u32;

    /// A secondary command buffer, executed by a primary one inside a render pass.
    SECOND_LEVEL = 1 << 0,
    /// Will record graphics or transfer work.
    GENERAL_WORK = 1 << 1,
    /// Will record only compute work, so it can go to a dedicated compute queue.
    COMPUTE_WORK = 1 << 2,
    /// Will record few commands. Small and big command buffers come from different pools.
    SMALL_BATCH = 1 << 3,
}

/// Parameters to create a new [`CommandBuffer`].
pub struct CommandBufferInitInfo<B: Backend> {
    /// Name used in log messages.
    ///
    /// The default value is empty.
    pub name: String,

    /// The default value is [`CommandBufferFlags::GENERAL_WORK`].
    pub flags: CommandBufferFlags,

    /// The framebuffer a secondary command buffer is executed in. Required with
    /// [`CommandBufferFlags::SECOND_LEVEL`], forbidden otherwise.
    ///
    /// The default value is `None`.
    pub framebuffer: Option<Arc<Framebuffer<B>>>,

    pub _ne: NonExhaustive,
}

impl<B: Backend> Default for CommandBufferInitInfo<B> {
    #[inline]
    fn default() -> Self {
        Self {
            name: String::new(),
            flags: CommandBufferFlags::GENERAL_WORK,
            framebuffer: None,
            _ne: NonExhaustive(()),
        }
    }
}

// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Drawing of render queues.
//!
//! A render queue is an ordered list of [`RenderableQueueElement`]s, each of which knows how to
//! draw itself through its [`DrawCallback`]. The [`RenderableDrawer`] walks a queue in order and
//! merges runs of consecutive compatible elements, so that a run is drawn by a single call of
//! the callback with the user data of every element: one instanced drawcall instead of many.
//!
//! Two consecutive elements are compatible when:
//!
//! - They have the same callback.
//! - They have the same merge key, and that key isn't `0`.
//! - Their LODs are the same after being clamped to the LOD range of the draw.
//!
//! A run never holds more than [`MAX_INSTANCE_COUNT`] elements.

use crate::{command_buffer::CommandBuffer, Backend, NativeError};
use smallvec::SmallVec;
use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

/// Maximum number of elements merged into one drawcall.
pub const MAX_INSTANCE_COUNT: usize = 64;

/// Number of levels of detail a renderable can have.
pub const MAX_LOD_COUNT: u8 = 3;

/// Draws a run of merged elements. `user_data` holds the data of every element of the run, in
/// queue order, and its length is the number of instances to draw.
pub type DrawCallback<B, P, T> =
    fn(ctx: &mut DrawContext<'_, B, P>, user_data: &[&T]) -> Result<(), NativeError>;

/// What a [`DrawCallback`] draws with.
pub struct DrawContext<'a, B: Backend, P> {
    pub command_buffer: &'a mut CommandBuffer<B>,
    /// Parameters shared by the whole draw range, like the camera matrices.
    pub params: &'a P,
    /// The clamped LOD of every element of the run.
    pub lod: u8,
}

/// An element of a render queue.
pub struct RenderableQueueElement<'a, B: Backend, P, T> {
    pub callback: DrawCallback<B, P, T>,
    pub user_data: &'a T,
    /// Elements with the same non-zero key and the same callback can be drawn together. `0`
    /// means the element is always drawn alone.
    pub merge_key: u64,
    pub lod: u8,
}

impl<B: Backend, P, T> Clone for RenderableQueueElement<'_, B, P, T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<B: Backend, P, T> Copy for RenderableQueueElement<'_, B, P, T> {}

impl<B: Backend, P, T> fmt::Debug for RenderableQueueElement<'_, B, P, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderableQueueElement")
            .field("callback", &format_args!("{:#x}", self.callback as usize))
            .field("merge_key", &self.merge_key)
            .field("lod", &self.lod)
            .finish_non_exhaustive()
    }
}

/// Draws render queues, merging compatible elements into instanced drawcalls.
#[derive(Debug, Default)]
pub struct RenderableDrawer {
    drawcalls: AtomicU64,
    merged_drawcalls: AtomicU64,
}

impl RenderableDrawer {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Draws `elements` in order into `command_buffer`. The LOD of every element is clamped to
    /// `min_lod..=max_lod`.
    ///
    /// Errors of a callback are returned as is and the remaining elements are not drawn.
    ///
    /// # Panics
    ///
    /// - Panics if `min_lod` is greater than `max_lod`, or if `max_lod` is not less than
    ///   [`MAX_LOD_COUNT`].
    pub fn draw_range<B: Backend, P, T>(
        &self,
        command_buffer: &mut CommandBuffer<B>,
        params: &P,
        elements: &[RenderableQueueElement<'_, B, P, T>],
        min_lod: u8,
        max_lod: u8,
    ) -> Result<(), NativeError> {
        assert!(min_lod <= max_lod && max_lod < MAX_LOD_COUNT);

        let mut run = Run {
            head: None,
            user_data: SmallVec::new(),
        };

        for element in elements {
            if run.user_data.len() == MAX_INSTANCE_COUNT {
                self.flush(&mut run, command_buffer, params)?;
            }

            let lod = element.lod.clamp(min_lod, max_lod);

            let breaks_run = run
                .head
                .as_ref()
                .is_some_and(|(head, head_lod)| !can_merge(head, element) || *head_lod != lod);

            if breaks_run {
                self.flush(&mut run, command_buffer, params)?;
            }

            if run.head.is_none() {
                run.head = Some((*element, lod));
            }
            run.user_data.push(element.user_data);
        }

        self.flush(&mut run, command_buffer, params)
    }

    /// Number of drawcalls issued, after merging.
    #[inline]
    pub fn drawcall_count(&self) -> u64 {
        self.drawcalls.load(Ordering::Relaxed)
    }

    /// Number of drawcalls saved by merging.
    #[inline]
    pub fn merged_drawcall_count(&self) -> u64 {
        self.merged_drawcalls.load(Ordering::Relaxed)
    }

    fn flush<'a, B: Backend, P, T>(
        &self,
        run: &mut Run<'a, B, P, T>,
        command_buffer: &mut CommandBuffer<B>,
        params: &P,
    ) -> Result<(), NativeError> {
        let Some((head, lod)) = run.head.take() else {
            return Ok(());
        };

        let mut ctx = DrawContext {
            command_buffer,
            params,
            lod,
        };
        let result = (head.callback)(&mut ctx, &run.user_data);

        let instance_count = run.user_data.len() as u64;
        run.user_data.clear();

        self.drawcalls.fetch_add(1, Ordering::Relaxed);
        if instance_count > 1 {
            self.merged_drawcalls
                .fetch_add(instance_count - 1, Ordering::Relaxed);
            log::trace!("merged {} renderables into one drawcall", instance_count);
        }

        result
    }
}

/// The elements merged so far. All of them are compatible with `head`.
struct Run<'a, B: Backend, P, T> {
    head: Option<(RenderableQueueElement<'a, B, P, T>, u8)>,
    user_data: SmallVec<[&'a T; MAX_INSTANCE_COUNT]>,
}

fn can_merge<B: Backend, P, T>(
    a: &RenderableQueueElement<'_, B, P, T>,
    b: &RenderableQueueElement<'_, B, P, T>,
) -> bool {
    a.callback as usize == b.callback as usize && a.merge_key != 0 && a.merge_key == b.merge_key
}

#[cfg(test)]
mod tests {
    use super::{DrawContext, RenderableDrawer, RenderableQueueElement, MAX_INSTANCE_COUNT};
    use crate::{
        backend::null::{NullBackend, NullCommand, NullHandle},
        command_buffer::CommandBufferInitInfo,
        format::Format,
        pipeline::PrimitiveTopology,
        GrConfig, GrManager, NativeError,
    };
    use std::{cell::RefCell, sync::Arc};

    type Log = RefCell<Vec<(&'static str, u8, Vec<u32>)>>;

    fn log_opaque(
        ctx: &mut DrawContext<'_, NullBackend, Log>,
        ids: &[&u32],
    ) -> Result<(), NativeError> {
        ctx.params
            .borrow_mut()
            .push(("opaque", ctx.lod, ids.iter().map(|&&id| id).collect()));
        Ok(())
    }

    fn log_transparent(
        ctx: &mut DrawContext<'_, NullBackend, Log>,
        ids: &[&u32],
    ) -> Result<(), NativeError> {
        ctx.params
            .borrow_mut()
            .push(("transparent", ctx.lod, ids.iter().map(|&&id| id).collect()));
        Ok(())
    }

    fn opaque(
        id: &u32,
        merge_key: u64,
        lod: u8,
    ) -> RenderableQueueElement<'_, NullBackend, Log, u32> {
        RenderableQueueElement {
            callback: log_opaque,
            user_data: id,
            merge_key,
            lod,
        }
    }

    fn manager() -> (Arc<NullBackend>, GrManager<NullBackend>) {
        let backend = Arc::new(NullBackend::new());
        let manager = GrManager::new(backend.clone(), GrConfig::default()).unwrap();

        (backend, manager)
    }

    #[test]
    fn merge_predicate() {
        let (_backend, manager) = manager();
        let mut cmdb = manager
            .new_command_buffer(CommandBufferInitInfo::default())
            .unwrap();
        let ids: Vec<u32> = (0..8).collect();
        let elements = [
            opaque(&ids[0], 5, 1),
            opaque(&ids[1], 5, 1),
            // Different LOD.
            opaque(&ids[2], 5, 2),
            // Zero key never merges.
            opaque(&ids[3], 0, 2),
            opaque(&ids[4], 0, 2),
            RenderableQueueElement {
                callback: log_transparent,
                ..opaque(&ids[5], 5, 2)
            },
            opaque(&ids[6], 5, 2),
        ];

        let drawer = RenderableDrawer::new();
        let log = Log::default();
        drawer
            .draw_range(&mut cmdb, &log, &elements, 0, 2)
            .unwrap();

        assert_eq!(
            log.into_inner(),
            [
                ("opaque", 1, vec![0, 1]),
                ("opaque", 2, vec![2]),
                ("opaque", 2, vec![3]),
                ("opaque", 2, vec![4]),
                ("transparent", 2, vec![5]),
                ("opaque", 2, vec![6]),
            ],
        );
        assert_eq!(drawer.drawcall_count(), 6);
        assert_eq!(drawer.merged_drawcall_count(), 1);
    }

    #[test]
    fn equal_keys_and_lods_merge() {
        let (_backend, manager) = manager();
        let mut cmdb = manager
            .new_command_buffer(CommandBufferInitInfo::default())
            .unwrap();
        let ids = [0, 1, 2, 3];
        let elements = [
            opaque(&ids[0], 5, 1),
            opaque(&ids[1], 5, 1),
            opaque(&ids[2], 5, 2),
            opaque(&ids[3], 0, 1),
        ];

        let drawer = RenderableDrawer::new();
        let log = Log::default();
        drawer
            .draw_range(&mut cmdb, &log, &elements, 0, 2)
            .unwrap();

        assert_eq!(
            log.into_inner(),
            [
                ("opaque", 1, vec![0, 1]),
                ("opaque", 2, vec![2]),
                ("opaque", 1, vec![3]),
            ],
        );
        assert_eq!(drawer.drawcall_count(), 3);
        assert_eq!(drawer.merged_drawcall_count(), 1);
    }

    #[test]
    fn lods_merge_after_clamping() {
        let (_backend, manager) = manager();
        let mut cmdb = manager
            .new_command_buffer(CommandBufferInitInfo::default())
            .unwrap();
        let ids = [0, 1, 2];
        let elements: Vec<_> = ids
            .iter()
            .enumerate()
            .map(|(lod, id)| opaque(id, 1, lod as u8))
            .collect();

        let drawer = RenderableDrawer::new();
        let log = Log::default();
        drawer
            .draw_range(&mut cmdb, &log, &elements, 1, 1)
            .unwrap();

        assert_eq!(log.into_inner(), [("opaque", 1, vec![0, 1, 2])]);
    }

    #[test]
    fn runs_split_at_max_instance_count() {
        let (_backend, manager) = manager();
        let mut cmdb = manager
            .new_command_buffer(CommandBufferInitInfo::default())
            .unwrap();
        let ids: Vec<u32> = (0..MAX_INSTANCE_COUNT as u32 * 2 + 1).collect();
        let elements: Vec<_> = ids.iter().map(|id| opaque(id, 7, 0)).collect();

        let drawer = RenderableDrawer::new();
        let log = Log::default();
        drawer
            .draw_range(&mut cmdb, &log, &elements, 0, 0)
            .unwrap();

        let sizes: Vec<usize> = log
            .into_inner()
            .into_iter()
            .map(|(_, _, ids)| ids.len())
            .collect();
        assert_eq!(sizes, [MAX_INSTANCE_COUNT, MAX_INSTANCE_COUNT, 1]);
        assert_eq!(
            drawer.merged_drawcall_count(),
            2 * (MAX_INSTANCE_COUNT as u64 - 1),
        );
    }

    #[test]
    fn callback_error_stops_drawing() {
        fn fail(_: &mut DrawContext<'_, NullBackend, Log>, _: &[&u32]) -> Result<(), NativeError> {
            Err(NativeError::OutOfDeviceMemory)
        }

        let (_backend, manager) = manager();
        let mut cmdb = manager
            .new_command_buffer(CommandBufferInitInfo::default())
            .unwrap();
        let ids = [0, 1];
        let elements = [
            RenderableQueueElement {
                callback: fail,
                user_data: &ids[0],
                merge_key: 0,
                lod: 0,
            },
            opaque(&ids[1], 0, 0),
        ];

        let log = Log::default();
        assert_eq!(
            RenderableDrawer::new().draw_range(&mut cmdb, &log, &elements, 0, 0),
            Err(NativeError::OutOfDeviceMemory),
        );
        assert!(log.into_inner().is_empty());
    }

    #[test]
    fn merged_run_is_one_instanced_draw() {
        fn draw(
            ctx: &mut DrawContext<'_, NullBackend, ()>,
            ids: &[&u32],
        ) -> Result<(), NativeError> {
            ctx.command_buffer
                .draw_arrays(PrimitiveTopology::TriangleList, 3, ids.len() as u32, 0, 0)
        }

        let (backend, manager) = manager();
        let program = gr_graphics_program!(0, 0b1);
        let framebuffer = gr_framebuffer!(NullHandle::new(), [Format::R8G8B8A8Unorm], None);
        let ids = [0, 1, 2, 3];
        let elements: Vec<_> = ids
            .iter()
            .map(|id| RenderableQueueElement {
                callback: draw,
                user_data: id,
                merge_key: if *id < 3 { 1 } else { 2 },
                lod: 0,
            })
            .collect();

        let mut cmdb = manager
            .new_command_buffer(CommandBufferInitInfo::default())
            .unwrap();
        cmdb.bind_shader_program(&program);
        cmdb.begin_render_pass(&framebuffer, 0, 0, u32::MAX, u32::MAX);
        cmdb.set_viewport(0, 0, 16, 16);
        RenderableDrawer::new()
            .draw_range(&mut cmdb, &(), &elements, 0, 0)
            .unwrap();
        cmdb.end_render_pass();

        let instance_counts: Vec<u32> = backend
            .commands(cmdb.handle())
            .into_iter()
            .filter_map(|command| match command {
                NullCommand::Draw { instance_count, .. } => Some(instance_count),
                _ => None,
            })
            .collect();
        assert_eq!(instance_counts, [3, 1]);
    }
}

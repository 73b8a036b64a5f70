// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

use crate::{
    backend::{Backend, Rect2D, Viewport},
    pipeline::FaceSelection,
};

/// Value of a stencil mask or reference that was never set.
const UNSET_STENCIL_VALUE: u32 = 0x5A5A_5A5A;

/// A rectangle in framebuffer pixels: x, y, width, height.
type PixelRect = [u32; 4];

type StencilSetter<B> = unsafe fn(&B, <B as Backend>::CommandBuffer, FaceSelection, u32);

/// Caches the dynamic state of a command buffer so that only changes are recorded.
///
/// Viewport and scissor are recorded lazily by [`flush`](Self::flush) right before a draw,
/// since their native values depend on the framebuffer. Stencil values and line width are
/// recorded by the command buffer as soon as they change.
#[derive(Debug)]
pub(crate) struct DynamicState {
    viewport: PixelRect,
    viewport_dirty: bool,
    last_viewport: Option<Viewport>,

    scissor: PixelRect,
    scissor_dirty: bool,
    last_scissor: Option<Rect2D>,

    stencil_compare_masks: [u32; 2],
    stencil_write_masks: [u32; 2],
    stencil_references: [u32; 2],

    line_width: Option<f32>,
}

impl DynamicState {
    pub(crate) fn new() -> Self {
        DynamicState {
            viewport: [0; 4],
            viewport_dirty: true,
            last_viewport: None,
            scissor: [0, 0, u32::MAX, u32::MAX],
            scissor_dirty: true,
            last_scissor: None,
            stencil_compare_masks: [UNSET_STENCIL_VALUE; 2],
            stencil_write_masks: [UNSET_STENCIL_VALUE; 2],
            stencil_references: [UNSET_STENCIL_VALUE; 2],
            line_width: None,
        }
    }

    pub(crate) fn set_viewport(&mut self, x: u32, y: u32, width: u32, height: u32) {
        assert!(width > 0 && height > 0);

        if self.viewport != [x, y, width, height] {
            self.viewport = [x, y, width, height];
            self.viewport_dirty = true;
        }
    }

    pub(crate) fn set_scissor(&mut self, x: u32, y: u32, width: u32, height: u32) {
        assert!(width > 0 && height > 0);

        if self.scissor != [x, y, width, height] {
            self.scissor = [x, y, width, height];
            self.scissor_dirty = true;
        }
    }

    /// Viewport and scissor depend on the framebuffer extent, so they are computed again at the
    /// next flush.
    pub(crate) fn framebuffer_changed(&mut self) {
        self.viewport_dirty = true;
        self.scissor_dirty = true;
    }

    /// Returns the faces whose compare mask changed and must be recorded.
    #[inline]
    pub(crate) fn set_stencil_compare_mask(
        &mut self,
        faces: FaceSelection,
        mask: u32,
    ) -> FaceSelection {
        update_faces(&mut self.stencil_compare_masks, faces, mask)
    }

    /// Returns the faces whose write mask changed and must be recorded.
    #[inline]
    pub(crate) fn set_stencil_write_mask(
        &mut self,
        faces: FaceSelection,
        mask: u32,
    ) -> FaceSelection {
        update_faces(&mut self.stencil_write_masks, faces, mask)
    }

    /// Returns the faces whose reference changed and must be recorded.
    #[inline]
    pub(crate) fn set_stencil_reference(
        &mut self,
        faces: FaceSelection,
        reference: u32,
    ) -> FaceSelection {
        update_faces(&mut self.stencil_references, faces, reference)
    }

    /// Returns whether the width changed and must be recorded.
    pub(crate) fn set_line_width(&mut self, width: f32) -> bool {
        assert!(width > 0.0);

        if self.line_width.map(f32::to_bits) == Some(width.to_bits()) {
            false
        } else {
            self.line_width = Some(width);
            true
        }
    }

    /// Records the viewport and scissor if they changed, for a framebuffer of `extent` pixels.
    /// With `flip`, the Y axis points up.
    ///
    /// # Panics
    ///
    /// - Panics if no viewport was set.
    pub(crate) fn flush<B: Backend>(
        &mut self,
        backend: &B,
        cmdb: B::CommandBuffer,
        extent: [u32; 2],
        flip: bool,
    ) {
        if self.viewport_dirty {
            let viewport = compute_viewport(self.viewport, extent, flip);

            if self.last_viewport != Some(viewport) {
                unsafe { backend.cmd_set_viewport(cmdb, &viewport) };
                self.last_viewport = Some(viewport);
            }

            self.viewport_dirty = false;
        }

        if self.scissor_dirty {
            let scissor = compute_scissor(self.scissor, extent, flip);

            if self.last_scissor != Some(scissor) {
                unsafe { backend.cmd_set_scissor(cmdb, &scissor) };
                self.last_scissor = Some(scissor);
            }

            self.scissor_dirty = false;
        }

        // Line width is dynamic in every pipeline, so it needs a value before the first draw.
        if self.line_width.is_none() {
            self.line_width = Some(1.0);
            unsafe { backend.cmd_set_line_width(cmdb, 1.0) };
        }
    }

    /// Records the whole dynamic state again. Executing secondary command buffers leaves it
    /// undefined.
    pub(crate) fn rebind<B: Backend>(&mut self, backend: &B, cmdb: B::CommandBuffer) {
        self.viewport_dirty = true;
        self.last_viewport = None;
        self.scissor_dirty = true;
        self.last_scissor = None;

        let stencil: [([u32; 2], StencilSetter<B>); 3] = [
            (self.stencil_compare_masks, B::cmd_set_stencil_compare_mask),
            (self.stencil_write_masks, B::cmd_set_stencil_write_mask),
            (self.stencil_references, B::cmd_set_stencil_reference),
        ];

        for ([front, back], set) in stencil {
            if front == back {
                if front != UNSET_STENCIL_VALUE {
                    unsafe { set(backend, cmdb, FaceSelection::FRONT_AND_BACK, front) };
                }
            } else {
                if front != UNSET_STENCIL_VALUE {
                    unsafe { set(backend, cmdb, FaceSelection::FRONT, front) };
                }

                if back != UNSET_STENCIL_VALUE {
                    unsafe { set(backend, cmdb, FaceSelection::BACK, back) };
                }
            }
        }

        if let Some(width) = self.line_width {
            unsafe { backend.cmd_set_line_width(cmdb, width) };
        }
    }
}

fn update_faces(values: &mut [u32; 2], faces: FaceSelection, value: u32) -> FaceSelection {
    let mut changed = FaceSelection::empty();

    for (i, face) in [FaceSelection::FRONT, FaceSelection::BACK].into_iter().enumerate() {
        if faces.intersects(face) && values[i] != value {
            values[i] = value;
            changed |= face;
        }
    }

    changed
}

fn compute_viewport(
    [x, y, width, height]: PixelRect,
    [fb_width, fb_height]: [u32; 2],
    flip: bool,
) -> Viewport {
    let width = width.min(fb_width);
    let height = height.min(fb_height);
    assert!(width > 0 && height > 0, "no viewport was set");
    debug_assert!(x + width <= fb_width && y + height <= fb_height);

    Viewport {
        x: x as f32,
        y: if flip { (fb_height - y) as f32 } else { y as f32 },
        width: width as f32,
        height: if flip { -(height as f32) } else { height as f32 },
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

fn compute_scissor(
    [x, y, width, height]: PixelRect,
    [fb_width, fb_height]: [u32; 2],
    flip: bool,
) -> Rect2D {
    let width = width.min(fb_width);
    let height = height.min(fb_height);
    debug_assert!(x + width <= fb_width && y + height <= fb_height);

    Rect2D {
        x: x as i32,
        y: if flip { (fb_height - (y + height)) as i32 } else { y as i32 },
        width,
        height,
    }
}

#[cfg(test)]
mod tests {
    use super::{compute_scissor, compute_viewport, DynamicState};
    use crate::{
        backend::{
            null::{NullBackend, NullCommand, NullHandle},
            Rect2D, Viewport,
        },
        pipeline::FaceSelection,
    };

    #[test]
    fn flipped_viewport() {
        let viewport = compute_viewport([0, 10, 100, 50], [200, 100], true);
        assert_eq!(
            viewport,
            Viewport {
                x: 0.0,
                y: 90.0,
                width: 100.0,
                height: -50.0,
                min_depth: 0.0,
                max_depth: 1.0,
            },
        );

        let scissor = compute_scissor([0, 10, 100, 50], [200, 100], true);
        assert_eq!(
            scissor,
            Rect2D {
                x: 0,
                y: 40,
                width: 100,
                height: 50,
            },
        );
    }

    #[test]
    fn unbounded_scissor_is_clamped() {
        let scissor = compute_scissor([0, 0, u32::MAX, u32::MAX], [640, 480], false);
        assert_eq!((scissor.width, scissor.height), (640, 480));
    }

    #[test]
    fn recorded_only_on_change() {
        let backend = NullBackend::new();
        let cmdb = NullHandle::new();
        let mut state = DynamicState::new();

        state.set_viewport(0, 0, 64, 64);
        state.flush(&backend, cmdb, [64, 64], false);
        assert_eq!(backend.commands(cmdb).len(), 3);

        // Same native values.
        state.set_viewport(0, 0, 128, 128);
        state.flush(&backend, cmdb, [64, 64], false);
        assert_eq!(backend.commands(cmdb).len(), 3);

        assert_eq!(
            state.set_stencil_write_mask(FaceSelection::FRONT_AND_BACK, 0xFF),
            FaceSelection::FRONT_AND_BACK,
        );
        assert_eq!(
            state.set_stencil_write_mask(FaceSelection::FRONT_AND_BACK, 0xFF),
            FaceSelection::empty(),
        );
        assert_eq!(
            state.set_stencil_write_mask(FaceSelection::BACK, 0x0F),
            FaceSelection::BACK,
        );
        assert!(state.set_line_width(2.0));
        assert!(!state.set_line_width(2.0));
    }

    #[test]
    fn rebind_skips_unset_values() {
        let backend = NullBackend::new();
        let cmdb = NullHandle::new();
        let mut state = DynamicState::new();

        state.set_stencil_reference(FaceSelection::FRONT, 1);
        state.set_stencil_reference(FaceSelection::BACK, 2);
        state.set_stencil_compare_mask(FaceSelection::FRONT_AND_BACK, 0xFF);
        state.rebind(&backend, cmdb);

        assert_eq!(
            backend.commands(cmdb),
            [
                NullCommand::SetStencilCompareMask {
                    faces: FaceSelection::FRONT_AND_BACK,
                    value: 0xFF,
                },
                NullCommand::SetStencilReference {
                    faces: FaceSelection::FRONT,
                    value: 1,
                },
                NullCommand::SetStencilReference {
                    faces: FaceSelection::BACK,
                    value: 2,
                },
            ],
        );
    }
}

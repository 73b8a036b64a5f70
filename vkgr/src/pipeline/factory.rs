// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

#[cfg(debug_assertions)]
use super::desc::GraphicsPipelineDesc;
use super::tracker::PipelineStateTracker;
use crate::{
    backend::Backend,
    cache::{Lookup, OnceCache},
    shader::{ShaderProgram, ShaderProgramKind},
    NativeError,
};
use std::{
    fmt,
    num::NonZero,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

struct CachedPipeline<B: Backend> {
    handle: B::Pipeline,
    /// Kept to catch hash collisions.
    #[cfg(debug_assertions)]
    desc: Arc<GraphicsPipelineDesc<B>>,
}

impl<B: Backend> Clone for CachedPipeline<B> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle,
            #[cfg(debug_assertions)]
            desc: self.desc.clone(),
        }
    }
}

/// Counters of a [`PipelineFactory`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineFactoryStats {
    pub graphics_pipelines: usize,
    pub compute_pipelines: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

/// Creates native pipelines and caches them for the lifetime of the factory.
///
/// Graphics pipelines are keyed by the hash of a [`PipelineStateTracker`]. The hash is trusted:
/// two states with the same hash share a pipeline. Debug builds keep the description of every
/// pipeline and panic if a hit doesn't describe the same pipeline.
pub struct PipelineFactory<B: Backend> {
    backend: Arc<B>,
    graphics: OnceCache<u64, CachedPipeline<B>>,
    compute: OnceCache<NonZero<u64>, B::Pipeline>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<B: Backend> PipelineFactory<B> {
    pub fn new(backend: Arc<B>) -> Self {
        PipelineFactory {
            backend,
            graphics: OnceCache::new(),
            compute: OnceCache::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Flushes `tracker` and returns the pipeline for its state, or `None` if the state is the
    /// same as on the previous call with this tracker, in which case the bound pipeline is still
    /// the right one.
    ///
    /// # Panics
    ///
    /// - Panics if the backend fails to create the pipeline.
    pub fn get_or_create_pipeline(
        &self,
        tracker: &mut PipelineStateTracker<B>,
    ) -> Option<B::Pipeline> {
        let (hash, changed) = tracker.flush();

        if !changed {
            return None;
        }

        let result = self.graphics.get_or_try_insert::<NativeError>(hash, || {
            let desc = tracker.pipeline_desc();
            let handle = unsafe { self.backend.create_graphics_pipeline(&desc) }?;

            log::debug!("created graphics pipeline {:?} (hash {:#018x})", handle, hash);

            Ok(CachedPipeline {
                handle,
                #[cfg(debug_assertions)]
                desc: Arc::new(desc),
            })
        });

        let (cached, lookup) = result.unwrap_or_else(|err| {
            log::error!("failed to create a graphics pipeline (hash {:#018x}): {}", hash, err);
            panic!("failed to create a graphics pipeline: {}", err);
        });

        if lookup == Lookup::Miss {
            self.misses.fetch_add(1, Ordering::Relaxed);
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
            log::trace!("graphics pipeline cache hit (hash {:#018x})", hash);

            #[cfg(debug_assertions)]
            assert_eq!(
                *cached.desc,
                tracker.pipeline_desc(),
                "two pipeline states have the same hash {:#018x}",
                hash,
            );
        }

        Some(cached.handle)
    }

    /// Returns the pipeline of a compute program, creating it on first use.
    ///
    /// # Panics
    ///
    /// - Panics if `program` isn't a compute program.
    /// - Panics if the backend fails to create the pipeline.
    pub fn get_or_create_compute_pipeline(&self, program: &ShaderProgram<B>) -> B::Pipeline {
        assert_eq!(program.kind(), ShaderProgramKind::Compute);

        let result = self.compute.get_or_try_insert::<NativeError>(program.id(), || {
            let handle = unsafe {
                self.backend
                    .create_compute_pipeline(&program.stages()[0], program.pipeline_layout())
            }?;

            log::debug!(
                "created compute pipeline {:?} for program `{}`",
                handle,
                program.name(),
            );

            Ok(handle)
        });

        let (handle, lookup) = result.unwrap_or_else(|err| {
            log::error!(
                "failed to create the compute pipeline of program `{}`: {}",
                program.name(),
                err,
            );
            panic!("failed to create a compute pipeline: {}", err);
        });

        if lookup == Lookup::Miss {
            self.misses.fetch_add(1, Ordering::Relaxed);
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }

        handle
    }

    pub fn stats(&self) -> PipelineFactoryStats {
        PipelineFactoryStats {
            graphics_pipelines: self.graphics.len(),
            compute_pipelines: self.compute.len(),
            cache_hits: self.hits.load(Ordering::Relaxed),
            cache_misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl<B: Backend> Drop for PipelineFactory<B> {
    fn drop(&mut self) {
        let graphics = self.graphics.drain().map(|(_, cached)| cached.handle);
        let compute = self.compute.drain().map(|(_, handle)| handle);

        for handle in graphics.collect::<Vec<_>>().into_iter().chain(compute) {
            unsafe { self.backend.destroy_pipeline(handle) };
        }
    }
}

impl<B: Backend> fmt::Debug for PipelineFactory<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineFactory")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::PipelineFactory;
    use crate::{
        backend::null::{NullBackend, NullHandle},
        format::Format,
        pipeline::{CompareOperation, FrontFace, PipelineStateTracker, VertexStepRate},
    };
    use std::{
        sync::{Arc, Barrier},
        thread,
    };

    #[test]
    fn unchanged_state_needs_no_bind() {
        let backend = Arc::new(NullBackend::new());
        let factory = PipelineFactory::new(backend.clone());
        let program = gr_graphics_program!(0, 0b1);
        let framebuffer = gr_framebuffer!(
            NullHandle::new(),
            [Format::R8G8B8A8Unorm],
            Some(Format::D32Sfloat),
        );

        let mut tracker = PipelineStateTracker::new();
        tracker.bind_shader_program(&program);
        tracker.begin_render_pass(&framebuffer);

        let first = factory.get_or_create_pipeline(&mut tracker);
        assert!(first.is_some());
        assert_eq!(factory.get_or_create_pipeline(&mut tracker), None);

        tracker.set_depth_compare_operation(CompareOperation::LessEqual);
        let second = factory.get_or_create_pipeline(&mut tracker);
        assert!(second.is_some() && second != first);

        tracker.set_depth_compare_operation(CompareOperation::Less);
        assert_eq!(factory.get_or_create_pipeline(&mut tracker), first);

        let stats = factory.stats();
        assert_eq!(stats.graphics_pipelines, 2);
        assert_eq!((stats.cache_hits, stats.cache_misses), (1, 2));
        assert_eq!(backend.created_pipeline_count(), 2);

        drop(factory);
        assert_eq!(backend.live_pipeline_count(), 0);
    }

    #[test]
    fn default_framebuffer_gets_its_own_pipeline() {
        let backend = Arc::new(NullBackend::new());
        let factory = PipelineFactory::new(backend.clone());
        let program = gr_graphics_program!(0, 0b1);
        let render_pass = NullHandle::new();
        let offscreen = gr_framebuffer!(render_pass, [Format::R8G8B8A8Unorm], None);
        let presentable = gr_framebuffer!(render_pass, [Format::R8G8B8A8Unorm], None, default);
        assert_ne!(offscreen.signature(), presentable.signature());

        let mut tracker = PipelineStateTracker::new();
        tracker.bind_shader_program(&program);
        tracker.begin_render_pass(&offscreen);
        let a = factory.get_or_create_pipeline(&mut tracker);
        assert_eq!(tracker.pipeline_desc().rasterization.front_face, FrontFace::Clockwise);
        tracker.end_render_pass();

        tracker.begin_render_pass(&presentable);
        let b = factory.get_or_create_pipeline(&mut tracker);
        assert_eq!(
            tracker.pipeline_desc().rasterization.front_face,
            FrontFace::CounterClockwise,
        );

        assert!(a.is_some() && b.is_some() && a != b);
        assert_eq!(backend.created_pipeline_count(), 2);
    }

    #[test]
    fn concurrent_misses_create_once() {
        const THREADS: usize = 8;

        let backend = Arc::new(NullBackend::new());
        let factory = Arc::new(PipelineFactory::new(backend.clone()));
        let program = gr_graphics_program!(0b1, 0b1);
        let framebuffer = gr_framebuffer!(NullHandle::new(), [Format::R8G8B8A8Unorm], None);
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let factory = factory.clone();
                let program = program.clone();
                let framebuffer = framebuffer.clone();
                let barrier = barrier.clone();

                thread::spawn(move || {
                    let mut tracker = PipelineStateTracker::new();
                    tracker.bind_shader_program(&program);
                    tracker.set_vertex_attribute(0, 0, Format::R32G32B32A32Sfloat, 0);
                    tracker.bind_vertex_buffer(0, 16, VertexStepRate::Vertex);
                    tracker.begin_render_pass(&framebuffer);

                    barrier.wait();
                    factory.get_or_create_pipeline(&mut tracker)
                })
            })
            .collect();

        let pipelines: Vec<_> = handles
            .into_iter()
            .map(|handle| handle.join().unwrap().unwrap())
            .collect();

        assert!(pipelines.iter().all(|&pipeline| pipeline == pipelines[0]));
        assert_eq!(backend.created_pipeline_count(), 1);
        assert_eq!(factory.stats().cache_misses, 1);
    }

    #[test]
    fn compute_pipeline_cached_per_program() {
        let backend = Arc::new(NullBackend::new());
        let factory = PipelineFactory::new(backend.clone());
        let program = gr_compute_program!();

        let a = factory.get_or_create_compute_pipeline(&program);
        let b = factory.get_or_create_compute_pipeline(&program);
        assert_eq!(a, b);
        assert_eq!(backend.created_pipeline_count(), 1);
    }

    #[test]
    #[should_panic]
    fn creation_failure_is_fatal() {
        let backend = Arc::new(NullBackend::new());
        backend.fail_next_pipeline_creation();
        let factory = PipelineFactory::new(backend);
        let program = gr_compute_program!();

        factory.get_or_create_compute_pipeline(&program);
    }
}

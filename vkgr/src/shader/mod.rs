// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Linked shader programs.
//!
//! Shader compilation and reflection happen upstream. A [`ShaderProgram`] receives the native
//! modules, the pipeline layout and the reflected interface (vertex attributes read, color
//! attachments written, descriptor set layouts, push constant size), and gives them a stable
//! identity that the pipeline cache hashes.

pub use self::block::{write_shader_block_memory, ShaderVariableBlockInfo, ShaderVariableDataType};
use crate::{
    backend::Backend,
    descriptor_set::DescriptorSetLayout,
    macros::{gr_bitflags, gr_enum, impl_id_counter},
    pipeline::{MAX_COLOR_ATTACHMENTS, MAX_VERTEX_ATTRIBUTES},
    resource::{GrObject, GrObjectType},
    NonExhaustive,
};
use smallvec::SmallVec;
use std::{ffi::CString, fmt, num::NonZero, sync::Arc};

mod block;

/// Maximum number of descriptor sets a program can use.
pub const MAX_DESCRIPTOR_SETS: usize = 4;

gr_bitflags! {
    /// A set of shader stages.
    ShaderStages = u32;

    VERTEX = 0x1,
    TESSELLATION_CONTROL = 0x2,
    TESSELLATION_EVALUATION = 0x4,
    GEOMETRY = 0x8,
    FRAGMENT = 0x10,
    COMPUTE = 0x20,
    RAYGEN = 0x100,
    ANY_HIT = 0x200,
    CLOSEST_HIT = 0x400,
    MISS = 0x800,
    INTERSECTION = 0x1000,
    CALLABLE = 0x2000,
}

impl ShaderStages {
    pub const ALL_GRAPHICS: Self = Self::VERTEX
        .union(Self::TESSELLATION_CONTROL)
        .union(Self::TESSELLATION_EVALUATION)
        .union(Self::GEOMETRY)
        .union(Self::FRAGMENT);

    pub const ALL_RAY_TRACING: Self = Self::RAYGEN
        .union(Self::ANY_HIT)
        .union(Self::CLOSEST_HIT)
        .union(Self::MISS)
        .union(Self::INTERSECTION)
        .union(Self::CALLABLE);
}

gr_enum! {
    /// The kind of pipeline a program is bound to.
    ShaderProgramKind;

    Graphics,
    Compute,
    RayTracing,
}

/// One stage of a program: a native module and its entry point.
pub struct ShaderStageDesc<B: Backend> {
    /// Exactly one stage.
    pub stage: ShaderStages,
    pub module: B::ShaderModule,
    pub entry_point: CString,
}

impl<B: Backend> ShaderStageDesc<B> {
    /// Describes a stage whose entry point is `main`.
    pub fn new(stage: ShaderStages, module: B::ShaderModule) -> Self {
        Self {
            stage,
            module,
            entry_point: CString::from(c"main"),
        }
    }
}

impl<B: Backend> Clone for ShaderStageDesc<B> {
    fn clone(&self) -> Self {
        Self {
            stage: self.stage,
            module: self.module,
            entry_point: self.entry_point.clone(),
        }
    }
}

impl<B: Backend> PartialEq for ShaderStageDesc<B> {
    fn eq(&self, other: &Self) -> bool {
        self.stage == other.stage
            && self.module == other.module
            && self.entry_point == other.entry_point
    }
}

impl<B: Backend> fmt::Debug for ShaderStageDesc<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShaderStageDesc")
            .field("stage", &self.stage)
            .field("module", &self.module)
            .field("entry_point", &self.entry_point)
            .finish()
    }
}

/// Extra data of a ray tracing program.
pub struct RayTracingInfo<B: Backend> {
    /// The pipeline, created together with the program.
    pub pipeline: B::Pipeline,
    /// Number of ray types, which is the number of miss shaders and of hit groups per instance.
    pub ray_type_count: u32,
}

/// Parameters to create a new `ShaderProgram`.
pub struct ShaderProgramCreateInfo<B: Backend> {
    /// Name used in log messages.
    ///
    /// The default value is empty.
    pub name: String,

    /// The stages. A compute program has exactly one compute stage.
    ///
    /// The default value is empty, which must be overridden.
    pub stages: SmallVec<[ShaderStageDesc<B>; 5]>,

    /// The pipeline layout.
    ///
    /// The default value is `None`, which must be overridden.
    pub layout: Option<B::PipelineLayout>,

    /// The layout of every descriptor set the program uses, indexed by set number.
    ///
    /// The default value is empty.
    pub descriptor_set_layouts:
        SmallVec<[Option<Arc<DescriptorSetLayout<B>>>; MAX_DESCRIPTOR_SETS]>,

    /// Size in bytes of the push constant block. Zero if there is none.
    ///
    /// The default value is `0`.
    pub push_constant_size: u32,

    /// Bit `i` is set if the vertex stage reads the attribute at location `i`.
    ///
    /// The default value is `0`.
    pub vertex_attribute_mask: u8,

    /// Bit `i` is set if the fragment stage writes color attachment `i`.
    ///
    /// The default value is `0`.
    pub color_attachment_write_mask: u8,

    /// Required for ray tracing programs.
    ///
    /// The default value is `None`.
    pub ray_tracing: Option<RayTracingInfo<B>>,

    pub _ne: NonExhaustive,
}

impl<B: Backend> Default for ShaderProgramCreateInfo<B> {
    #[inline]
    fn default() -> Self {
        Self {
            name: String::new(),
            stages: SmallVec::new(),
            layout: None,
            descriptor_set_layouts: SmallVec::new(),
            push_constant_size: 0,
            vertex_attribute_mask: 0,
            color_attachment_write_mask: 0,
            ray_tracing: None,
            _ne: NonExhaustive(()),
        }
    }
}

/// A linked shader program.
pub struct ShaderProgram<B: Backend> {
    id: NonZero<u64>,
    name: String,
    kind: ShaderProgramKind,
    stages: SmallVec<[ShaderStageDesc<B>; 5]>,
    layout: B::PipelineLayout,
    descriptor_set_layouts: [Option<Arc<DescriptorSetLayout<B>>>; MAX_DESCRIPTOR_SETS],
    descriptor_set_mask: u8,
    push_constant_size: u32,
    push_constant_stages: ShaderStages,
    vertex_attribute_mask: u8,
    color_attachment_write_mask: u8,
    ray_tracing: Option<RayTracingInfo<B>>,
}

impl<B: Backend> ShaderProgram<B> {
    /// Creates a new `ShaderProgram`.
    ///
    /// # Panics
    ///
    /// - Panics if `create_info.layout` is `None`.
    /// - Panics if the stages mix graphics, compute and ray tracing stages.
    /// - Panics if a ray tracing program has no `ray_tracing` info.
    /// - Panics if the masks or the descriptor set count exceed the limits.
    pub fn new(create_info: ShaderProgramCreateInfo<B>) -> Arc<Self> {
        let ShaderProgramCreateInfo {
            name,
            stages,
            layout,
            descriptor_set_layouts,
            push_constant_size,
            vertex_attribute_mask,
            color_attachment_write_mask,
            ray_tracing,
            _ne: _,
        } = create_info;

        let layout = layout.expect("a shader program needs a pipeline layout");

        let all_stages = stages
            .iter()
            .fold(ShaderStages::empty(), |acc, stage| acc | stage.stage);

        let kind = if all_stages.intersects(ShaderStages::COMPUTE) {
            assert_eq!(stages.len(), 1, "a compute program has exactly one stage");
            ShaderProgramKind::Compute
        } else if all_stages.intersects(ShaderStages::ALL_RAY_TRACING) {
            assert!(
                !all_stages.intersects(ShaderStages::ALL_GRAPHICS),
                "ray tracing and graphics stages can't be mixed",
            );
            assert!(
                ray_tracing.is_some(),
                "a ray tracing program needs its pipeline",
            );
            ShaderProgramKind::RayTracing
        } else {
            assert!(
                all_stages.contains(ShaderStages::VERTEX),
                "a graphics program needs a vertex stage",
            );
            ShaderProgramKind::Graphics
        };

        assert!(descriptor_set_layouts.len() <= MAX_DESCRIPTOR_SETS);
        assert!((vertex_attribute_mask as u32) < (1 << MAX_VERTEX_ATTRIBUTES));
        assert!((color_attachment_write_mask as u32) < (1 << MAX_COLOR_ATTACHMENTS));
        assert!(
            color_attachment_write_mask & color_attachment_write_mask.wrapping_add(1) == 0,
            "color attachments written by a program can't have gaps",
        );

        let mut layouts: [Option<Arc<DescriptorSetLayout<B>>>; MAX_DESCRIPTOR_SETS] =
            Default::default();
        let mut descriptor_set_mask = 0;

        for (set, layout) in descriptor_set_layouts.into_iter().enumerate() {
            if layout.is_some() {
                descriptor_set_mask |= 1 << set;
            }

            layouts[set] = layout;
        }

        Arc::new(ShaderProgram {
            id: Self::next_id(),
            name,
            kind,
            stages,
            layout,
            descriptor_set_layouts: layouts,
            descriptor_set_mask,
            push_constant_size,
            push_constant_stages: all_stages,
            vertex_attribute_mask,
            color_attachment_write_mask,
            ray_tracing,
        })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn kind(&self) -> ShaderProgramKind {
        self.kind
    }

    #[inline]
    pub fn stages(&self) -> &[ShaderStageDesc<B>] {
        &self.stages
    }

    #[inline]
    pub fn pipeline_layout(&self) -> B::PipelineLayout {
        self.layout
    }

    /// Returns the layout of descriptor set `set`, if the program uses it.
    #[inline]
    pub fn descriptor_set_layout(&self, set: usize) -> Option<&Arc<DescriptorSetLayout<B>>> {
        self.descriptor_set_layouts.get(set)?.as_ref()
    }

    /// Bit `i` is set if the program uses descriptor set `i`.
    #[inline]
    pub fn descriptor_set_mask(&self) -> u8 {
        self.descriptor_set_mask
    }

    #[inline]
    pub fn push_constant_size(&self) -> u32 {
        self.push_constant_size
    }

    #[inline]
    pub fn push_constant_stages(&self) -> ShaderStages {
        self.push_constant_stages
    }

    #[inline]
    pub fn vertex_attribute_mask(&self) -> u8 {
        self.vertex_attribute_mask
    }

    #[inline]
    pub fn color_attachment_write_mask(&self) -> u8 {
        self.color_attachment_write_mask
    }

    #[inline]
    pub fn ray_tracing(&self) -> Option<&RayTracingInfo<B>> {
        self.ray_tracing.as_ref()
    }
}

impl<B: Backend> fmt::Debug for ShaderProgram<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShaderProgram")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl<B: Backend> GrObject for ShaderProgram<B> {
    fn object_type(&self) -> GrObjectType {
        GrObjectType::ShaderProgram
    }

    fn uuid(&self) -> NonZero<u64> {
        self.id
    }
}

impl_id_counter!(ShaderProgram<B: Backend>);

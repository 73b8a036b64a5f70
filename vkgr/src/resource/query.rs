// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

use super::{GrObject, GrObjectType};
use crate::{backend::Backend, macros::impl_id_counter};
use std::{fmt, num::NonZero, sync::Arc};

/// One slot of a native occlusion query pool.
pub struct OcclusionQuery<B: Backend> {
    id: NonZero<u64>,
    pool: B::QueryPool,
    index: u32,
}

impl<B: Backend> OcclusionQuery<B> {
    /// Wraps slot `index` of `pool`.
    pub fn from_handle(pool: B::QueryPool, index: u32) -> Arc<Self> {
        Arc::new(OcclusionQuery {
            id: Self::next_id(),
            pool,
            index,
        })
    }

    #[inline]
    pub fn pool(&self) -> B::QueryPool {
        self.pool
    }

    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }
}

impl<B: Backend> fmt::Debug for OcclusionQuery<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OcclusionQuery")
            .field("pool", &self.pool)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

impl<B: Backend> GrObject for OcclusionQuery<B> {
    fn object_type(&self) -> GrObjectType {
        GrObjectType::OcclusionQuery
    }

    fn uuid(&self) -> NonZero<u64> {
        self.id
    }
}

impl_id_counter!(OcclusionQuery<B: Backend>);

/// One slot of a native timestamp query pool.
pub struct TimestampQuery<B: Backend> {
    id: NonZero<u64>,
    pool: B::QueryPool,
    index: u32,
}

impl<B: Backend> TimestampQuery<B> {
    /// Wraps slot `index` of `pool`.
    pub fn from_handle(pool: B::QueryPool, index: u32) -> Arc<Self> {
        Arc::new(TimestampQuery {
            id: Self::next_id(),
            pool,
            index,
        })
    }

    #[inline]
    pub fn pool(&self) -> B::QueryPool {
        self.pool
    }

    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }
}

impl<B: Backend> fmt::Debug for TimestampQuery<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimestampQuery")
            .field("pool", &self.pool)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

impl<B: Backend> GrObject for TimestampQuery<B> {
    fn object_type(&self) -> GrObjectType {
        GrObjectType::TimestampQuery
    }

    fn uuid(&self) -> NonZero<u64> {
        self.id
    }
}

impl_id_counter!(TimestampQuery<B: Backend>);

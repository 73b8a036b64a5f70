// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

use crate::{backend::Backend, config::MAX_FENCE_WAIT, NativeError};
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

/// Signaled by the device when a submission has finished executing.
///
/// Once a fence has been observed signaled the result is cached, and the native object is never
/// queried again.
pub struct Fence<B: Backend> {
    backend: Arc<B>,
    handle: B::Fence,
    is_signaled: AtomicBool,
    max_wait: Duration,
}

impl<B: Backend> Fence<B> {
    /// Creates a new unsignaled `Fence`. Waits block for at most `max_wait`, clamped to
    /// [`MAX_FENCE_WAIT`].
    pub fn new(backend: Arc<B>, max_wait: Duration) -> Result<Arc<Self>, NativeError> {
        let handle = backend.create_fence().inspect_err(|err| {
            log::error!("failed to create a fence: {}", err);
        })?;

        Ok(Arc::new(Fence {
            backend,
            handle,
            is_signaled: AtomicBool::new(false),
            max_wait: max_wait.min(MAX_FENCE_WAIT),
        }))
    }

    #[inline]
    pub fn handle(&self) -> B::Fence {
        self.handle
    }

    /// Returns whether the fence is signaled, without blocking.
    pub fn is_signaled(&self) -> Result<bool, NativeError> {
        if self.is_signaled.load(Ordering::Acquire) {
            return Ok(true);
        }

        let signaled = unsafe { self.backend.fence_status(self.handle) }?;

        if signaled {
            self.is_signaled.store(true, Ordering::Release);
        }

        Ok(signaled)
    }

    /// Waits until the fence is signaled, for at most `timeout` (clamped to the maximum wait of
    /// the fence).
    ///
    /// Returns [`NativeError::Timeout`] if the fence is still unsignaled when the time is up.
    pub fn wait(&self, timeout: Duration) -> Result<(), NativeError> {
        if self.is_signaled.load(Ordering::Acquire) {
            return Ok(());
        }

        let timeout = timeout.min(self.max_wait);

        if unsafe { self.backend.wait_fence(self.handle, timeout) }? {
            self.is_signaled.store(true, Ordering::Release);
            Ok(())
        } else {
            log::warn!("fence {:?} not signaled after {:?}", self.handle, timeout);
            Err(NativeError::Timeout)
        }
    }
}

impl<B: Backend> Drop for Fence<B> {
    fn drop(&mut self) {
        unsafe { self.backend.destroy_fence(self.handle) };
    }
}

impl<B: Backend> fmt::Debug for Fence<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fence")
            .field("handle", &self.handle)
            .field("is_signaled", &self.is_signaled)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::Fence;
    use crate::{backend::null::NullBackend, NativeError};
    use std::{sync::Arc, time::Duration};

    #[test]
    fn wait_times_out() {
        let backend = Arc::new(NullBackend::new());
        let fence = Fence::new(backend.clone(), Duration::from_secs(1)).unwrap();

        assert!(!fence.is_signaled().unwrap());
        assert_eq!(
            fence.wait(Duration::from_millis(1)),
            Err(NativeError::Timeout),
        );

        backend.signal_fence(fence.handle());
        assert_eq!(fence.wait(Duration::ZERO), Ok(()));
        assert!(fence.is_signaled().unwrap());
    }

    #[test]
    fn destroyed_on_drop() {
        let backend = Arc::new(NullBackend::new());
        let fence = Fence::new(backend.clone(), Duration::from_secs(1)).unwrap();
        assert_eq!(backend.live_fence_count(), 1);

        drop(fence);
        assert_eq!(backend.live_fence_count(), 0);
    }
}

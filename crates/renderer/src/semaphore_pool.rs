//! Recycled pool of image-acquire semaphores.
//!
//! A semaphore signaled by `vkAcquireNextImageKHR` cannot be reused until the
//! submission that waits on it has been scheduled and superseded. Instead of
//! tracking per-semaphore GPU completion, the pool holds one semaphore more
//! than the swapchain has images: even with every image in flight, one entry
//! is always free for the next acquire. Each per-frame slot returns its
//! previous acquire semaphore only after passing its fence gate, so a
//! recycled entry is never handed out while a wait on it is still pending.
//!
//! Entries live in a preallocated arena indexed by a Vec-based free list; no
//! allocation happens per frame.

use ash::vk;
use tracing::debug;

use carousel_rhi::RhiResult;
use carousel_rhi::device::Device;

/// A semaphore borrowed from the [`SemaphorePool`].
///
/// The token is the only way to reference a borrowed entry and must be given
/// back via [`SemaphorePool::release`]; dropping it without releasing leaks
/// the entry until shutdown (the pool still owns and destroys the handle).
#[derive(Debug)]
pub struct PooledSemaphore {
    index: usize,
    handle: vk::Semaphore,
}

impl PooledSemaphore {
    /// Returns the Vulkan semaphore handle.
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.handle
    }
}

/// Fixed-capacity pool of interchangeable acquire semaphores.
///
/// Sized `image_count + 1` for a chain of `image_count` images. At every
/// quiescent point between frames:
///
/// `free entries + entries borrowed by per-frame slots == image_count + 1`
///
/// The pool owns the raw handles; the render context destroys them at
/// shutdown after a device-idle wait.
pub struct SemaphorePool {
    /// Arena of owned semaphore handles; never reordered.
    entries: Vec<vk::Semaphore>,
    /// Indices into `entries` that are currently free. LIFO.
    free: Vec<usize>,
}

impl SemaphorePool {
    /// Creates a pool of `image_count + 1` semaphores.
    ///
    /// # Errors
    ///
    /// Returns an error if semaphore creation fails.
    pub fn new(device: &Device, image_count: u32) -> RhiResult<Self> {
        let capacity = image_count as usize + 1;
        let create_info = vk::SemaphoreCreateInfo::default();

        let mut entries = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };
            entries.push(semaphore);
        }

        debug!("Semaphore pool created with {} entries", capacity);

        Ok(Self::from_handles(entries))
    }

    /// Builds the pool bookkeeping over pre-created handles.
    fn from_handles(entries: Vec<vk::Semaphore>) -> Self {
        let free = (0..entries.len()).collect();
        Self { entries, free }
    }

    /// Takes a free semaphore out of the pool.
    ///
    /// # Panics
    ///
    /// Panics if the free list is empty. With `image_count + 1` entries and
    /// at most `image_count` borrowed by per-frame slots this cannot happen;
    /// an empty list means the sizing or release bookkeeping is broken.
    pub fn acquire(&mut self) -> PooledSemaphore {
        let index = self
            .free
            .pop()
            .expect("semaphore pool exhausted: free-list bookkeeping is broken");

        PooledSemaphore {
            index,
            handle: self.entries[index],
        }
    }

    /// Returns a borrowed semaphore to the pool.
    ///
    /// Most-recently released entries are handed out first; no ordering
    /// beyond "not currently borrowed" matters.
    pub fn release(&mut self, semaphore: PooledSemaphore) {
        debug_assert!(
            !self.free.contains(&semaphore.index),
            "semaphore released twice"
        );
        self.free.push(semaphore.index);
    }

    /// Number of entries currently in the free list.
    #[inline]
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Total number of entries the pool owns.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Destroys all owned semaphore handles.
    ///
    /// Called once at shutdown, after the device has gone idle; outstanding
    /// [`PooledSemaphore`] tokens must not be used afterwards.
    pub fn destroy(&mut self, device: &Device) {
        for &semaphore in &self.entries {
            unsafe {
                device.handle().destroy_semaphore(semaphore, None);
            }
        }
        self.entries.clear();
        self.free.clear();
        debug!("Semaphore pool destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn test_pool(image_count: usize) -> SemaphorePool {
        // Raw handle values stand in for device-created semaphores; the
        // bookkeeping never dereferences them.
        let entries = (0..image_count as u64 + 1)
            .map(|i| vk::Semaphore::from_raw(i + 1))
            .collect();
        SemaphorePool::from_handles(entries)
    }

    #[test]
    fn pool_is_sized_one_above_image_count() {
        let pool = test_pool(3);
        assert_eq!(pool.capacity(), 4);
        assert_eq!(pool.free_count(), 4);
    }

    #[test]
    fn acquire_and_release_preserve_capacity() {
        let mut pool = test_pool(3);

        let a = pool.acquire();
        let b = pool.acquire();
        assert_eq!(pool.free_count(), 2);

        pool.release(a);
        pool.release(b);
        assert_eq!(pool.free_count(), 4);
    }

    #[test]
    fn release_is_lifo() {
        let mut pool = test_pool(1);

        let first = pool.acquire();
        let second = pool.acquire();
        let first_handle = first.handle();

        pool.release(first);
        pool.release(second);

        // `second` went back last, so it comes out first
        let next = pool.acquire();
        assert_ne!(next.handle(), first_handle);
    }

    #[test]
    #[should_panic(expected = "semaphore pool exhausted")]
    fn acquire_from_empty_pool_panics() {
        let mut pool = test_pool(0);
        let _held = pool.acquire();
        let _overflow = pool.acquire();
    }

    /// Five ticks over a 3-image chain: each tick borrows one semaphore for
    /// the acquire and gives back the slot's previous one, the way the frame
    /// loop does. The free list never runs dry and the borrow invariant
    /// holds at every quiescent point.
    #[test]
    fn rotation_never_exhausts_pool() {
        const IMAGES: usize = 3;
        let mut pool = test_pool(IMAGES);
        let mut slots: [Option<PooledSemaphore>; IMAGES] = [None, None, None];

        for tick in 0..5 {
            let acquired = pool.acquire();
            let image_index = tick % IMAGES;

            if let Some(previous) = slots[image_index].replace(acquired) {
                pool.release(previous);
            }

            let borrowed = slots.iter().filter(|s| s.is_some()).count();
            assert_eq!(pool.free_count() + borrowed, IMAGES + 1);
            assert!(pool.free_count() >= 1);
        }
    }
}

//! softgpu-recovery - Sacrificial memory for paging-failure recovery
//!
//! Reserves a locked block of pages at process start so that a recovery
//! path running under memory pressure has something to give back: calling
//! [`recover`] releases the block and the working-set headroom reserved
//! with it.
//!
//! The shim is process-global and deliberately quiet. If the OS refuses
//! any step of the reservation, [`init`] leaves the shim uninitialised and
//! only a `warn!` records why; [`recover`] is then a no-op. Nothing here
//! ever panics or returns an error to the caller.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

use std::sync::Mutex;

use once_cell::sync::Lazy;

/// Pages in the sacrificial block
pub const SACRIFICIAL_BLOCK_PAGES: usize = 1024;
/// Page size the reservation is counted in
pub const PAGE_SIZE: usize = 4096;

/// Minimum working-set floor applied before reserving, in pages
const MIN_WORKING_SET_PAGES: usize = 96;
/// Maximum working-set floor applied before reserving, in pages
const MAX_WORKING_SET_PAGES: usize = 4096;

const BLOCK_BYTES: usize = SACRIFICIAL_BLOCK_PAGES * PAGE_SIZE;

static BLOCK: Lazy<Mutex<Option<sys::Block>>> = Lazy::new(|| Mutex::new(None));

#[derive(Debug, thiserror::Error)]
enum ShimError {
    #[error("querying the working-set limits failed: {0}")]
    QueryLimit(#[source] std::io::Error),
    #[error("raising the working-set limits failed: {0}")]
    RaiseLimit(#[source] std::io::Error),
    #[error("reserving the sacrificial block failed: {0}")]
    Map(#[source] std::io::Error),
    #[error("locking the sacrificial block failed: {0}")]
    Lock(#[source] std::io::Error),
    #[error("no sacrificial-memory support on this target")]
    Unsupported,
}

/// Reserve the sacrificial block. Idempotent; failures are silent.
pub fn init() {
    let Ok(mut guard) = BLOCK.lock() else {
        return;
    };
    if guard.is_some() {
        return;
    }
    match sys::try_reserve() {
        Ok(block) => {
            log::debug!(
                "sacrificial memory reserved: {} pages of {} bytes",
                SACRIFICIAL_BLOCK_PAGES,
                PAGE_SIZE
            );
            *guard = Some(block);
        }
        Err(error) => log::warn!("sacrificial memory unavailable: {error}"),
    }
}

/// Release the sacrificial block. A no-op when [`init`] never succeeded.
pub fn recover() {
    let Ok(mut guard) = BLOCK.lock() else {
        return;
    };
    if let Some(block) = guard.take() {
        sys::release(block);
        log::debug!("sacrificial memory released");
    }
}

/// Whether the block is currently reserved.
pub fn is_initialized() -> bool {
    BLOCK.lock().map(|guard| guard.is_some()).unwrap_or(false)
}

#[cfg(unix)]
mod sys {
    //! Unix reservation: the memlock soft limit stands in for the minimum
    //! working-set threshold (enforced), the hard limit for the maximum
    //! (advisory; never raised past what the process is allowed).

    use std::io;
    use std::ptr;

    use super::{ShimError, BLOCK_BYTES, MAX_WORKING_SET_PAGES, MIN_WORKING_SET_PAGES, PAGE_SIZE};

    pub(crate) struct Block {
        ptr: *mut libc::c_void,
    }

    // The pointer is only touched by release(), under the global mutex.
    unsafe impl Send for Block {}

    pub(crate) fn try_reserve() -> Result<Block, ShimError> {
        let mut limit = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        // SAFETY: plain out-parameter syscall.
        if unsafe { libc::getrlimit(libc::RLIMIT_MEMLOCK, &mut limit) } != 0 {
            return Err(ShimError::QueryLimit(io::Error::last_os_error()));
        }

        let min_floor = (MIN_WORKING_SET_PAGES * PAGE_SIZE) as libc::rlim_t;
        let max_floor = (MAX_WORKING_SET_PAGES * PAGE_SIZE) as libc::rlim_t;
        let block = BLOCK_BYTES as libc::rlim_t;

        let original_max = limit.rlim_max;
        let mut wanted = limit;
        if wanted.rlim_cur < min_floor {
            wanted.rlim_cur = min_floor;
        }
        if wanted.rlim_max < max_floor {
            wanted.rlim_max = max_floor;
        }
        wanted.rlim_cur = wanted.rlim_cur.saturating_add(block);
        wanted.rlim_max = wanted.rlim_max.saturating_add(block);
        if wanted.rlim_cur > wanted.rlim_max {
            wanted.rlim_cur = wanted.rlim_max;
        }

        // SAFETY: setrlimit reads the struct and touches no memory of ours.
        if unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &wanted) } != 0 {
            // Raising the hard limit needs privilege; it is advisory here,
            // so retry inside the original one.
            wanted.rlim_max = original_max;
            if wanted.rlim_cur > wanted.rlim_max {
                wanted.rlim_cur = wanted.rlim_max;
            }
            if unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &wanted) } != 0 {
                return Err(ShimError::RaiseLimit(io::Error::last_os_error()));
            }
        }

        // SAFETY: fresh anonymous mapping; unmapped only by release().
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                BLOCK_BYTES,
                libc::PROT_READ,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(ShimError::Map(io::Error::last_os_error()));
        }

        // SAFETY: ptr covers exactly BLOCK_BYTES of our own mapping.
        if unsafe { libc::mlock(ptr, BLOCK_BYTES) } != 0 {
            let error = io::Error::last_os_error();
            // SAFETY: same mapping as above, not yet published.
            unsafe {
                libc::munmap(ptr, BLOCK_BYTES);
            }
            return Err(ShimError::Lock(error));
        }

        Ok(Block { ptr })
    }

    pub(crate) fn release(block: Block) {
        // SAFETY: the pointer came from try_reserve's mmap of BLOCK_BYTES
        // and ownership of the Block guarantees it is still mapped.
        unsafe {
            libc::munlock(block.ptr, BLOCK_BYTES);
            libc::munmap(block.ptr, BLOCK_BYTES);
        }
    }
}

#[cfg(not(unix))]
mod sys {
    use super::ShimError;

    pub(crate) struct Block {}

    pub(crate) fn try_reserve() -> Result<Block, ShimError> {
        Err(ShimError::Unsupported)
    }

    pub(crate) fn release(_block: Block) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    // The OS may legitimately refuse the reservation (memlock quotas in
    // CI), so these tests only pin down the silent-failure contract.

    #[test]
    fn test_shim_lifecycle_never_panics() {
        // Recover before init is a no-op
        recover();
        assert!(!is_initialized());

        init();
        init();
        recover();
        assert!(!is_initialized());
        recover();
    }
}

//! Allocation policies.
//!
//! A policy decides how the memory block of a [`BufferObject`] is obtained,
//! resized and released.
//! Policies are shared between buffers as `Arc<dyn AllocationPolicy>`.
//!
//! [`BufferObject`]: crate::BufferObject
use crate::error::{AllocationFailureSnafu, Result};
use std::fmt;
use std::sync::Arc;

/// Strategy for obtaining and releasing buffer memory.
pub trait AllocationPolicy: fmt::Debug + Send + Sync {
    /// A short name for the policy, used in diagnostics.
    fn name(&self) -> &'static str;

    /// Obtain a new zero-filled block of exactly `size` bytes.
    fn allocate(&self, size: usize) -> Result<Vec<u8>>;

    /// Resize a block previously obtained from this policy,
    /// preserving the first `min(old, new)` bytes.
    ///
    /// On failure the block is left untouched.
    fn reallocate(&self, block: &mut Vec<u8>, size: usize) -> Result<()>;

    /// Release a block obtained from this policy.
    fn destroy(&self, block: Vec<u8>) {
        drop(block);
    }
}

/// Heap allocation which reports failure instead of aborting the process.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct MallocPolicy;

impl MallocPolicy {
    /// Shared instance of this policy.
    pub fn shared() -> Arc<dyn AllocationPolicy> {
        Arc::new(MallocPolicy)
    }
}

impl AllocationPolicy for MallocPolicy {
    fn name(&self) -> &'static str {
        "malloc"
    }

    fn allocate(&self, size: usize) -> Result<Vec<u8>> {
        let mut block = Vec::new();
        if block.try_reserve_exact(size).is_err() {
            return AllocationFailureSnafu {
                size,
                policy: self.name(),
            }
            .fail();
        }
        block.resize(size, 0);
        Ok(block)
    }

    fn reallocate(&self, block: &mut Vec<u8>, size: usize) -> Result<()> {
        if size > block.len() {
            let additional = size - block.len();
            if block.try_reserve_exact(additional).is_err() {
                return AllocationFailureSnafu {
                    size,
                    policy: self.name(),
                }
                .fail();
            }
            block.resize(size, 0);
        } else {
            block.truncate(size);
            block.shrink_to_fit();
        }
        Ok(())
    }
}

/// Policy which never allocates.
///
/// This is the policy of empty buffers
/// and of buffers holding memory owned by a third party.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct NoAllocPolicy;

impl NoAllocPolicy {
    /// Shared instance of this policy.
    pub fn shared() -> Arc<dyn AllocationPolicy> {
        Arc::new(NoAllocPolicy)
    }
}

impl AllocationPolicy for NoAllocPolicy {
    fn name(&self) -> &'static str {
        "no-alloc"
    }

    fn allocate(&self, size: usize) -> Result<Vec<u8>> {
        if size == 0 {
            return Ok(Vec::new());
        }
        AllocationFailureSnafu {
            size,
            policy: self.name(),
        }
        .fail()
    }

    fn reallocate(&self, block: &mut Vec<u8>, size: usize) -> Result<()> {
        if size == block.len() {
            return Ok(());
        }
        AllocationFailureSnafu {
            size,
            policy: self.name(),
        }
        .fail()
    }
}

//! Scoped access to buffer content.
//!
//! A lock keeps the buffer resident for as long as it lives.
//! Shared locks may coexist; an exclusive lock excludes every other lock.
use crate::object::BufferState;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{RwLockReadGuard, RwLockWriteGuard};

/// Exclusive (write) access to the content of a buffer.
pub struct BufferLock<'a> {
    guard: RwLockWriteGuard<'a, BufferState>,
    locks: &'a AtomicUsize,
}

impl<'a> BufferLock<'a> {
    pub(crate) fn new(guard: RwLockWriteGuard<'a, BufferState>, locks: &'a AtomicUsize) -> Self {
        locks.fetch_add(1, Ordering::SeqCst);
        BufferLock { guard, locks }
    }

    /// Pointer to the first byte of the content.
    ///
    /// Only valid while this lock is held.
    pub fn as_ptr(&self) -> *const u8 {
        self.guard.storage.bytes().as_ptr()
    }
}

impl Deref for BufferLock<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.guard.storage.bytes()
    }
}

impl DerefMut for BufferLock<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.guard.storage.bytes_mut()
    }
}

impl Drop for BufferLock<'_> {
    fn drop(&mut self) {
        self.locks.fetch_sub(1, Ordering::SeqCst);
    }
}

impl fmt::Debug for BufferLock<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferLock")
            .field("len", &self.len())
            .finish()
    }
}

/// Shared (read) access to the content of a buffer.
pub struct ConstBufferLock<'a> {
    guard: RwLockReadGuard<'a, BufferState>,
    locks: &'a AtomicUsize,
}

impl<'a> ConstBufferLock<'a> {
    pub(crate) fn new(guard: RwLockReadGuard<'a, BufferState>, locks: &'a AtomicUsize) -> Self {
        locks.fetch_add(1, Ordering::SeqCst);
        ConstBufferLock { guard, locks }
    }

    /// Pointer to the first byte of the content.
    ///
    /// Only valid while this lock is held.
    pub fn as_ptr(&self) -> *const u8 {
        self.guard.storage.bytes().as_ptr()
    }
}

impl Deref for ConstBufferLock<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.guard.storage.bytes()
    }
}

impl Drop for ConstBufferLock<'_> {
    fn drop(&mut self) {
        self.locks.fetch_sub(1, Ordering::SeqCst);
    }
}

impl fmt::Debug for ConstBufferLock<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstBufferLock")
            .field("len", &self.len())
            .finish()
    }
}

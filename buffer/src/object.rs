//! Buffer objects.
use crate::error::{
    NoContentSourceSnafu, NotReallocatableSnafu, OpenStreamSnafu, ReadStreamSnafu, Result,
};
use crate::lock::{BufferLock, ConstBufferLock};
use crate::manager::{BufferId, BufferManager};
use crate::policy::{AllocationPolicy, MallocPolicy, NoAllocPolicy};
use crate::stream::{FileFormat, StreamFactory, StreamInfo};
use snafu::{OptionExt, ResultExt};
use std::fmt;
use std::io::Read;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};

/// Memory owned by a third party which a buffer may adopt.
///
/// See [`BufferObject::set_buffer`].
pub trait ExternalMemory: Send + Sync {
    /// View the memory as bytes.
    fn as_bytes(&self) -> &[u8];

    /// View the memory as mutable bytes.
    fn as_bytes_mut(&mut self) -> &mut [u8];
}

impl ExternalMemory for Vec<u8> {
    fn as_bytes(&self) -> &[u8] {
        self
    }

    fn as_bytes_mut(&mut self) -> &mut [u8] {
        self
    }
}

impl ExternalMemory for Box<[u8]> {
    fn as_bytes(&self) -> &[u8] {
        self
    }

    fn as_bytes_mut(&mut self) -> &mut [u8] {
        self
    }
}

pub(crate) enum Storage {
    /// nothing resident
    Empty,
    /// a block obtained from the buffer's policy
    Owned(Vec<u8>),
    /// memory handed over by the caller
    Adopted {
        memory: Box<dyn ExternalMemory>,
        auto_delete: bool,
    },
}

impl Storage {
    pub(crate) fn bytes(&self) -> &[u8] {
        match self {
            Storage::Empty => &[],
            Storage::Owned(block) => block,
            Storage::Adopted { memory, .. } => memory.as_bytes(),
        }
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        match self {
            Storage::Empty => &mut [],
            Storage::Owned(block) => block,
            Storage::Adopted { memory, .. } => memory.as_bytes_mut(),
        }
    }
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Storage::Empty => f.write_str("Empty"),
            Storage::Owned(block) => write!(f, "Owned({} bytes)", block.len()),
            Storage::Adopted {
                memory,
                auto_delete,
            } => f
                .debug_struct("Adopted")
                .field("len", &memory.as_bytes().len())
                .field("auto_delete", auto_delete)
                .finish(),
        }
    }
}

#[derive(Debug)]
pub(crate) struct BufferState {
    pub(crate) storage: Storage,
    pub(crate) size: usize,
    pub(crate) policy: Arc<dyn AllocationPolicy>,
    /// where the content originally comes from, if streamed in lazily
    pub(crate) stream: Option<StreamInfo>,
    /// where the content was moved to by the manager
    pub(crate) spill: Option<StreamInfo>,
    /// whether the resident content may differ from its stream
    pub(crate) dirty: bool,
}

impl BufferState {
    fn new() -> Self {
        BufferState {
            storage: Storage::Empty,
            size: 0,
            policy: MallocPolicy::shared(),
            stream: None,
            spill: None,
            dirty: false,
        }
    }

    pub(crate) fn is_resident(&self) -> bool {
        self.size == 0 || !matches!(self.storage, Storage::Empty)
    }

    fn resident_size(&self) -> usize {
        self.storage.bytes().len()
    }

    /// Let go of the current content.
    ///
    /// Adopted memory which must not be deleted is handed back.
    fn release(&mut self) -> Option<Box<dyn ExternalMemory>> {
        let external = match std::mem::replace(&mut self.storage, Storage::Empty) {
            Storage::Empty => None,
            Storage::Owned(block) => {
                self.policy.destroy(block);
                None
            }
            Storage::Adopted {
                memory,
                auto_delete: true,
            } => {
                drop(memory);
                None
            }
            Storage::Adopted {
                memory,
                auto_delete: false,
            } => Some(memory),
        };
        if let Some(spill) = self.spill.take() {
            remove_spill_file(&spill);
        }
        external
    }
}

fn remove_spill_file(spill: &StreamInfo) {
    if let Some(path) = &spill.source_file {
        if let Err(e) = std::fs::remove_file(path) {
            warn!("Could not remove spill file {}: {}", path.display(), e);
        }
    }
}

/// The shared part of a buffer, also reachable from the manager.
#[derive(Debug)]
pub(crate) struct BufferSlot {
    pub(crate) state: RwLock<BufferState>,
    pub(crate) locks: AtomicUsize,
}

/// A managed block of memory.
///
/// The buffer is registered with a [`BufferManager`] for its whole lifetime.
/// Its content is only reachable through locks:
/// [`lock`](Self::lock) for exclusive (write) access
/// and [`lock_const`](Self::lock_const) for shared (read) access.
/// While a lock exists, the content is resident and will not be spilled.
///
/// Buffers are typically shared behind an `Arc`,
/// in which case every holder sees the same content.
///
/// # Usage errors
///
/// Changing the buffer's storage
/// ([`allocate`](Self::allocate), [`reallocate`](Self::reallocate),
/// [`set_buffer`](Self::set_buffer), [`destroy`](Self::destroy),
/// [`set_istream_factory`](Self::set_istream_factory))
/// while a lock is outstanding is a programming error and panics.
/// Raw pointers obtained from a lock must not be kept across these calls.
pub struct BufferObject {
    id: BufferId,
    manager: Arc<BufferManager>,
    slot: Arc<BufferSlot>,
}

impl BufferObject {
    /// Create an empty buffer registered with the given manager.
    pub fn new(manager: &Arc<BufferManager>) -> Result<Self> {
        let slot = Arc::new(BufferSlot {
            state: RwLock::new(BufferState::new()),
            locks: AtomicUsize::new(0),
        });
        let id = manager.next_id();
        manager.register(id, Arc::downgrade(&slot)).wait()?;
        Ok(BufferObject {
            id,
            manager: Arc::clone(manager),
            slot,
        })
    }

    /// Create a buffer holding the given bytes, without copying them.
    pub fn from_vec(manager: &Arc<BufferManager>, bytes: Vec<u8>) -> Result<Self> {
        let buffer = Self::new(manager)?;
        {
            let mut state = buffer.write_state();
            buffer.manager.reserve(buffer.id, bytes.len()).wait()?;
            state.size = bytes.len();
            state.storage = Storage::Owned(bytes);
            state.dirty = true;
        }
        Ok(buffer)
    }

    /// The identifier of this buffer within its manager.
    pub fn id(&self) -> BufferId {
        self.id
    }

    /// The manager this buffer is registered with.
    pub fn manager(&self) -> &Arc<BufferManager> {
        &self.manager
    }

    /// The size of the buffer content in bytes,
    /// whether it is resident or not.
    pub fn size(&self) -> usize {
        self.read_state().size
    }

    /// Whether the buffer has no content.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Whether the content is currently in memory.
    pub fn is_resident(&self) -> bool {
        self.read_state().is_resident()
    }

    /// The number of locks currently held on this buffer.
    pub fn lock_count(&self) -> usize {
        self.slot.locks.load(Ordering::SeqCst)
    }

    /// The name of the buffer's allocation policy.
    pub fn policy_name(&self) -> &'static str {
        self.read_state().policy.name()
    }

    /// Allocate `size` zeroed bytes using `policy`,
    /// discarding the previous content.
    ///
    /// Fails with [`AllocationFailure`](crate::Error::AllocationFailure)
    /// if the policy cannot provide the memory,
    /// or [`CapExceeded`](crate::Error::CapExceeded)
    /// if the manager cannot make room for it.
    /// On failure the previous content is kept.
    pub fn allocate(&self, size: usize, policy: Arc<dyn AllocationPolicy>) -> Result<()> {
        self.assert_unlocked("allocate");
        let mut state = self.write_state();
        let previous = state.resident_size();
        self.manager.reserve(self.id, size).wait()?;
        let block = match policy.allocate(size) {
            Ok(block) => block,
            Err(e) => {
                self.restore_reservation(previous);
                return Err(e);
            }
        };
        if state.release().is_some() {
            debug!("Buffer {} let go of adopted memory", self.id);
        }
        state.storage = Storage::Owned(block);
        state.size = size;
        state.policy = policy;
        state.stream = None;
        state.dirty = true;
        Ok(())
    }

    /// Change the size of the buffer,
    /// preserving the first `min(old, new)` bytes.
    ///
    /// A buffer which is not resident is loaded first.
    /// Adopted memory can only be reallocated
    /// if the buffer was allowed to delete it.
    pub fn reallocate(&self, size: usize) -> Result<()> {
        self.assert_unlocked("reallocate");
        let mut guard = self.write_state();
        if !guard.is_resident() {
            self.load(&mut guard)?;
        }
        let state = &mut *guard;
        let previous = state.resident_size();
        self.manager.reserve(self.id, size).wait()?;

        let (storage, outcome) = match std::mem::replace(&mut state.storage, Storage::Empty) {
            Storage::Empty => match state.policy.allocate(size) {
                Ok(block) => (Storage::Owned(block), Ok(())),
                Err(e) => (Storage::Empty, Err(e)),
            },
            Storage::Owned(mut block) => {
                let outcome = state.policy.reallocate(&mut block, size);
                (Storage::Owned(block), outcome)
            }
            Storage::Adopted {
                memory,
                auto_delete: true,
            } => match state.policy.allocate(size) {
                Ok(mut block) => {
                    let old = memory.as_bytes();
                    let n = size.min(old.len());
                    block[..n].copy_from_slice(&old[..n]);
                    (Storage::Owned(block), Ok(()))
                }
                Err(e) => (
                    Storage::Adopted {
                        memory,
                        auto_delete: true,
                    },
                    Err(e),
                ),
            },
            adopted @ Storage::Adopted {
                auto_delete: false,
                ..
            } => (adopted, NotReallocatableSnafu.fail()),
        };
        state.storage = storage;

        match outcome {
            Ok(()) => {
                state.size = size;
                state.stream = None;
                state.dirty = true;
                Ok(())
            }
            Err(e) => {
                self.restore_reservation(previous);
                Err(e)
            }
        }
    }

    /// Adopt memory provided by the caller.
    ///
    /// If `auto_delete` is false, the memory is handed back
    /// by [`destroy`](Self::destroy) instead of being dropped,
    /// and the buffer refuses to reallocate it.
    pub fn set_buffer(
        &self,
        memory: Box<dyn ExternalMemory>,
        policy: Arc<dyn AllocationPolicy>,
        auto_delete: bool,
    ) -> Result<()> {
        self.assert_unlocked("set_buffer");
        let mut state = self.write_state();
        let size = memory.as_bytes().len();
        self.manager.reserve(self.id, size).wait()?;
        if state.release().is_some() {
            debug!("Buffer {} let go of adopted memory", self.id);
        }
        state.storage = Storage::Adopted {
            memory,
            auto_delete,
        };
        state.size = size;
        state.policy = policy;
        state.stream = None;
        state.dirty = true;
        Ok(())
    }

    /// Release the content immediately.
    ///
    /// The buffer is left empty with a no-op allocation policy.
    /// Adopted memory which the buffer may not delete is returned.
    ///
    /// # Panics
    ///
    /// Panics if a lock on this buffer is outstanding.
    pub fn destroy(&self) -> Option<Box<dyn ExternalMemory>> {
        self.assert_unlocked("destroy");
        let mut state = self.write_state();
        let external = state.release();
        state.size = 0;
        state.policy = NoAllocPolicy::shared();
        state.stream = None;
        state.dirty = false;
        if let Err(e) = self.manager.reserve(self.id, 0).wait() {
            warn!("Could not release reservation of buffer {}: {}", self.id, e);
        }
        external
    }

    /// Exchange storage, size, policy and manager with another buffer.
    ///
    /// No content is copied.
    pub fn swap(&mut self, other: &mut BufferObject) {
        std::mem::swap(self, other);
    }

    /// Populate the buffer lazily from a stream.
    ///
    /// The previous content is discarded.
    /// Nothing is read until the buffer is first locked,
    /// at which point `size` bytes are read from a stream produced by `factory`
    /// and decoded according to `format`.
    pub fn set_istream_factory(
        &self,
        factory: Arc<dyn StreamFactory>,
        size: usize,
        source_file: Option<PathBuf>,
        format: FileFormat,
        policy: Arc<dyn AllocationPolicy>,
    ) -> Result<()> {
        self.assert_unlocked("set_istream_factory");
        let mut state = self.write_state();
        self.manager.reserve(self.id, 0).wait()?;
        if state.release().is_some() {
            debug!("Buffer {} let go of adopted memory", self.id);
        }
        state.size = size;
        state.policy = policy;
        state.stream = Some(StreamInfo {
            factory: Some(factory),
            size,
            source_file,
            format,
        });
        state.dirty = false;
        Ok(())
    }

    /// Information about where the content is streamed from.
    ///
    /// A buffer without a stream reports no factory and its current size.
    pub fn stream_info(&self) -> StreamInfo {
        let state = self.read_state();
        state.stream.clone().unwrap_or_else(|| StreamInfo {
            size: state.size,
            ..StreamInfo::default()
        })
    }

    /// Obtain exclusive access to the content,
    /// loading it first if it is not resident.
    ///
    /// Blocks while any other lock is held.
    pub fn lock(&self) -> Result<BufferLock<'_>> {
        let mut state = self.write_state();
        if !state.is_resident() {
            self.load(&mut state)?;
        }
        state.dirty = true;
        self.manager.touch(self.id);
        Ok(BufferLock::new(state, &self.slot.locks))
    }

    /// Obtain shared access to the content,
    /// loading it first if it is not resident.
    ///
    /// Blocks while an exclusive lock is held.
    pub fn lock_const(&self) -> Result<ConstBufferLock<'_>> {
        loop {
            {
                let state = self.read_state();
                if state.is_resident() {
                    self.manager.touch(self.id);
                    return Ok(ConstBufferLock::new(state, &self.slot.locks));
                }
            }
            let mut state = self.write_state();
            if !state.is_resident() {
                self.load(&mut state)?;
            }
        }
    }

    /// Bring the content into memory from its spill file or stream.
    fn load(&self, state: &mut BufferState) -> Result<()> {
        let size = state.size;
        let from_spill = state.spill.is_some();
        let source = state
            .spill
            .as_ref()
            .or(state.stream.as_ref())
            .filter(|s| s.has_source())
            .cloned()
            .context(NoContentSourceSnafu { id: self.id })?;

        self.manager.reserve(self.id, size).wait()?;
        let block = match read_content(self.id, &source, state.policy.as_ref(), size) {
            Ok(block) => block,
            Err(e) => {
                self.restore_reservation(0);
                return Err(e);
            }
        };

        if from_spill {
            remove_spill_file(&source);
            state.spill = None;
            debug!("Restored buffer {} from disk", self.id);
        } else {
            state.dirty = false;
            debug!("Streamed in buffer {} ({} bytes)", self.id, size);
        }
        state.storage = Storage::Owned(block);
        Ok(())
    }

    fn restore_reservation(&self, size: usize) {
        if let Err(e) = self.manager.reserve(self.id, size).wait() {
            warn!("Could not restore reservation of buffer {}: {}", self.id, e);
        }
    }

    fn assert_unlocked(&self, operation: &str) {
        let locks = self.lock_count();
        assert!(
            locks == 0,
            "cannot {} buffer {} with {} outstanding lock(s)",
            operation,
            self.id,
            locks
        );
    }

    fn read_state(&self) -> RwLockReadGuard<'_, BufferState> {
        self.slot
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, BufferState> {
        self.slot
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn read_content(
    id: BufferId,
    source: &StreamInfo,
    policy: &dyn AllocationPolicy,
    size: usize,
) -> Result<Vec<u8>> {
    let mut block = policy.allocate(size)?;
    let mut reader = source
        .open_decoded()
        .context(OpenStreamSnafu)?
        .context(NoContentSourceSnafu { id })?;
    reader.read_exact(&mut block).context(ReadStreamSnafu { size })?;
    Ok(block)
}

/// Two buffers are equal if they are the same buffer,
/// or if they have the same size and the same bytes.
///
/// The second case compares the full content,
/// which is `O(size)` and may load both buffers into memory.
/// A buffer which cannot be loaded compares unequal to anything but itself.
impl PartialEq for BufferObject {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.slot, &other.slot) {
            return true;
        }
        if self.size() != other.size() {
            return false;
        }
        match (self.lock_const(), other.lock_const()) {
            (Ok(a), Ok(b)) => a[..] == b[..],
            (Err(e), _) | (_, Err(e)) => {
                warn!("Could not compare buffer contents: {}", e);
                false
            }
        }
    }
}

impl fmt::Debug for BufferObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferObject")
            .field("id", &self.id)
            .field("size", &self.size())
            .field("locks", &self.lock_count())
            .finish()
    }
}

impl Drop for BufferObject {
    fn drop(&mut self) {
        {
            let mut state = self.write_state();
            drop(state.release());
        }
        self.manager.unregister(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::FileStreamFactory;
    use crate::{BufferManagerOptions, Error};
    use std::io::Write;

    fn manager() -> Arc<BufferManager> {
        BufferManager::new().unwrap()
    }

    #[test]
    fn allocate_write_read_back() {
        let manager = manager();
        let buffer = BufferObject::new(&manager).unwrap();
        buffer.allocate(6, MallocPolicy::shared()).unwrap();
        {
            let mut lock = buffer.lock().unwrap();
            lock.copy_from_slice(b"pixels");
        }
        let lock = buffer.lock_const().unwrap();
        assert_eq!(&lock[..], b"pixels");
    }

    #[test]
    fn destroy_resets_to_empty() {
        let manager = manager();
        let buffer = BufferObject::from_vec(&manager, vec![1, 2, 3]).unwrap();
        assert!(buffer.destroy().is_none());
        assert_eq!(buffer.size(), 0);
        assert_eq!(buffer.stream_info().size, 0);
        assert!(buffer.stream_info().factory.is_none());
        assert_eq!(buffer.policy_name(), "no-alloc");
        assert!(buffer.lock_const().unwrap().is_empty());
    }

    #[test]
    fn reallocate_preserves_overlap() {
        let manager = manager();
        let buffer = BufferObject::from_vec(&manager, vec![1, 2, 3, 4]).unwrap();
        buffer.reallocate(6).unwrap();
        assert_eq!(&buffer.lock_const().unwrap()[..], &[1, 2, 3, 4, 0, 0]);
        buffer.reallocate(2).unwrap();
        assert_eq!(&buffer.lock_const().unwrap()[..], &[1, 2]);
    }

    #[test]
    fn adopted_memory_is_handed_back() {
        let manager = manager();
        let buffer = BufferObject::new(&manager).unwrap();
        buffer
            .set_buffer(Box::new(vec![9u8; 8]), NoAllocPolicy::shared(), false)
            .unwrap();
        assert_eq!(buffer.size(), 8);
        assert!(matches!(
            buffer.reallocate(16),
            Err(Error::NotReallocatable { .. })
        ));

        let memory = buffer.destroy().expect("memory should be handed back");
        assert_eq!(memory.as_bytes(), &[9u8; 8]);
    }

    #[test]
    fn swap_exchanges_storage_without_copy() {
        let manager = manager();
        let mut a = BufferObject::from_vec(&manager, b"first".to_vec()).unwrap();
        let mut b = BufferObject::from_vec(&manager, b"second!".to_vec()).unwrap();
        let ptr_a = a.lock_const().unwrap().as_ptr();
        let ptr_b = b.lock_const().unwrap().as_ptr();

        a.swap(&mut b);

        let lock_a = a.lock_const().unwrap();
        let lock_b = b.lock_const().unwrap();
        assert_eq!(&lock_a[..], b"second!");
        assert_eq!(&lock_b[..], b"first");
        assert_eq!(lock_a.as_ptr(), ptr_b);
        assert_eq!(lock_b.as_ptr(), ptr_a);
    }

    #[test]
    fn lazy_stream_loads_on_first_lock() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"xxxxCONTENT").unwrap();

        let manager = manager();
        let buffer = BufferObject::new(&manager).unwrap();
        buffer
            .set_istream_factory(
                Arc::new(FileStreamFactory::with_offset(file.path(), 4)),
                7,
                Some(file.path().to_owned()),
                FileFormat::Raw,
                MallocPolicy::shared(),
            )
            .unwrap();
        assert!(!buffer.is_resident());
        assert_eq!(buffer.size(), 7);
        assert_eq!(
            buffer.stream_info().source_file.as_deref(),
            Some(file.path())
        );

        assert_eq!(&buffer.lock_const().unwrap()[..], b"CONTENT");
        assert!(buffer.is_resident());
    }

    #[test]
    fn equality_by_identity_or_content() {
        let manager = manager();
        let a = BufferObject::from_vec(&manager, vec![1, 2, 3]).unwrap();
        let b = BufferObject::from_vec(&manager, vec![1, 2, 3]).unwrap();
        let c = BufferObject::from_vec(&manager, vec![1, 2, 4]).unwrap();
        let d = BufferObject::from_vec(&manager, vec![1, 2]).unwrap();
        assert_eq!(a, a);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    #[should_panic(expected = "outstanding lock")]
    fn destroy_with_outstanding_lock_panics() {
        let manager = manager();
        let buffer = Arc::new(BufferObject::from_vec(&manager, vec![0; 4]).unwrap());
        let _lock = buffer.lock_const().unwrap();
        buffer.destroy();
    }

    #[test]
    fn cap_exceeded_is_reported() {
        let manager =
            BufferManager::with_options(BufferManagerOptions::new().memory_cap(16)).unwrap();
        let buffer = BufferObject::new(&manager).unwrap();
        assert!(matches!(
            buffer.allocate(32, MallocPolicy::shared()),
            Err(Error::CapExceeded {
                requested: 32,
                cap: 16,
                ..
            })
        ));
        assert_eq!(buffer.size(), 0);
    }
}

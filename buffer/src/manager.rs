//! The central buffer manager.
//!
//! Every [`BufferObject`](crate::BufferObject) is registered with one manager,
//! which keeps track of how much buffer memory is resident
//! and spills idle buffers to disk when a memory cap is set.
//!
//! Lifecycle requests are processed one at a time by a dedicated worker
//! thread. Each request returns a [`Pending`] handle,
//! on which the caller waits for the outcome.
//! The worker never blocks on a buffer's lock:
//! a buffer that is locked at the time is simply not a candidate for
//! spilling.
use crate::error::{
    CapExceededSnafu, CreateSpillDirSnafu, ManagerGoneSnafu, Result, SpawnWorkerSnafu, SpillSnafu,
};
use crate::object::{BufferSlot, Storage};
use crate::stream::{FileFormat, FileStreamFactory, StreamInfo};
use crossbeam_channel::{Receiver, Sender};
use snafu::ResultExt;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::thread::JoinHandle;
use tempfile::TempDir;
use tracing::{debug, trace, warn};

/// Unique identifier of a buffer within its manager.
pub type BufferId = u64;

/// Configuration of a buffer manager.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferManagerOptions {
    /// Maximum number of resident buffer bytes.
    /// `None` means no limit.
    pub memory_cap: Option<usize>,
    /// Directory in which spill files are created.
    /// A system temporary directory is used if not set.
    pub spill_dir: Option<PathBuf>,
}

impl BufferManagerOptions {
    /// Create the default options: no cap, system temporary directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of resident buffer bytes.
    pub fn memory_cap(mut self, cap: usize) -> Self {
        self.memory_cap = Some(cap);
        self
    }

    /// Set the directory for spill files.
    pub fn spill_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.spill_dir = Some(dir.into());
        self
    }
}

/// A snapshot of the manager's bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManagerStats {
    /// Number of registered buffers
    pub buffers: usize,
    /// Total bytes of resident buffer content
    pub resident_bytes: usize,
    /// Number of buffers currently spilled to disk
    pub spilled: usize,
    /// The configured memory cap
    pub memory_cap: Option<usize>,
}

/// An outstanding request to the buffer manager.
///
/// Dropping it does not cancel the request.
#[must_use = "the request outcome is only known after waiting on it"]
#[derive(Debug)]
pub struct Pending<T> {
    reply: Receiver<Result<T>>,
}

impl<T> Pending<T> {
    /// Block until the manager has processed the request.
    pub fn wait(self) -> Result<T> {
        match self.reply.recv() {
            Ok(outcome) => outcome,
            Err(_) => ManagerGoneSnafu.fail(),
        }
    }
}

enum Request {
    Register {
        id: BufferId,
        slot: Weak<BufferSlot>,
        reply: Sender<Result<()>>,
    },
    Reserve {
        id: BufferId,
        size: usize,
        reply: Sender<Result<()>>,
    },
    Unregister {
        id: BufferId,
    },
    Touch {
        id: BufferId,
    },
    Trim {
        target: usize,
        reply: Sender<Result<usize>>,
    },
    Stats {
        reply: Sender<Result<ManagerStats>>,
    },
    Shutdown,
}

/// The central registry of buffers.
///
/// Managers are shared behind an `Arc`.
/// The worker thread stops once the last reference is dropped,
/// which cannot happen before every buffer registered with it is gone.
#[derive(Debug)]
pub struct BufferManager {
    requests: Sender<Request>,
    next_id: AtomicU64,
    memory_cap: Option<usize>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl BufferManager {
    /// Start a manager with no memory cap.
    pub fn new() -> Result<Arc<Self>> {
        Self::with_options(BufferManagerOptions::default())
    }

    /// Start a manager with the given options.
    pub fn with_options(options: BufferManagerOptions) -> Result<Arc<Self>> {
        let (requests, inbox) = crossbeam_channel::unbounded();
        let memory_cap = options.memory_cap;
        let worker = Worker::new(options);
        let handle = std::thread::Builder::new()
            .name("buffer-manager".into())
            .spawn(move || worker.run(inbox))
            .context(SpawnWorkerSnafu)?;

        Ok(Arc::new(BufferManager {
            requests,
            next_id: AtomicU64::new(1),
            memory_cap,
            worker: Mutex::new(Some(handle)),
        }))
    }

    /// The configured memory cap.
    pub fn memory_cap(&self) -> Option<usize> {
        self.memory_cap
    }

    /// Request a snapshot of the manager's bookkeeping.
    pub fn stats(&self) -> Pending<ManagerStats> {
        self.request(|reply| Request::Stats { reply })
    }

    /// Spill idle buffers until at most `target` bytes remain resident.
    ///
    /// Resolves to the number of bytes released.
    pub fn trim(&self, target: usize) -> Pending<usize> {
        self.request(|reply| Request::Trim { target, reply })
    }

    pub(crate) fn next_id(&self) -> BufferId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn register(&self, id: BufferId, slot: Weak<BufferSlot>) -> Pending<()> {
        self.request(|reply| Request::Register { id, slot, reply })
    }

    /// Declare that buffer `id` is about to hold `size` resident bytes.
    pub(crate) fn reserve(&self, id: BufferId, size: usize) -> Pending<()> {
        self.request(|reply| Request::Reserve { id, size, reply })
    }

    pub(crate) fn unregister(&self, id: BufferId) {
        let _ = self.requests.send(Request::Unregister { id });
    }

    pub(crate) fn touch(&self, id: BufferId) {
        let _ = self.requests.send(Request::Touch { id });
    }

    fn request<T>(&self, make: impl FnOnce(Sender<Result<T>>) -> Request) -> Pending<T> {
        let (reply, outcome) = crossbeam_channel::bounded(1);
        // a send failure drops `reply`, which then reports ManagerGone
        let _ = self.requests.send(make(reply));
        Pending { reply: outcome }
    }
}

impl Drop for BufferManager {
    fn drop(&mut self) {
        let _ = self.requests.send(Request::Shutdown);
        let handle = self
            .worker
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("buffer manager worker panicked");
            }
        }
    }
}

#[derive(Debug)]
struct Record {
    slot: Weak<BufferSlot>,
    resident: usize,
    last_use: u64,
    spilled: bool,
}

struct Worker {
    options: BufferManagerOptions,
    records: HashMap<BufferId, Record>,
    resident_bytes: usize,
    tick: u64,
    spill_dir: Option<TempDir>,
}

impl Worker {
    fn new(options: BufferManagerOptions) -> Self {
        Worker {
            options,
            records: HashMap::new(),
            resident_bytes: 0,
            tick: 0,
            spill_dir: None,
        }
    }

    fn run(mut self, inbox: Receiver<Request>) {
        for request in inbox {
            match request {
                Request::Register { id, slot, reply } => {
                    self.tick += 1;
                    self.records.insert(
                        id,
                        Record {
                            slot,
                            resident: 0,
                            last_use: self.tick,
                            spilled: false,
                        },
                    );
                    let _ = reply.send(Ok(()));
                }
                Request::Reserve { id, size, reply } => {
                    let _ = reply.send(self.reserve(id, size));
                }
                Request::Unregister { id } => {
                    if let Some(record) = self.records.remove(&id) {
                        self.resident_bytes -= record.resident;
                    }
                }
                Request::Touch { id } => {
                    self.tick += 1;
                    if let Some(record) = self.records.get_mut(&id) {
                        record.last_use = self.tick;
                    }
                }
                Request::Trim { target, reply } => {
                    let before = self.resident_bytes;
                    let outcome = self
                        .evict_until(target, None)
                        .map(|_| before - self.resident_bytes);
                    let _ = reply.send(outcome);
                }
                Request::Stats { reply } => {
                    let _ = reply.send(Ok(ManagerStats {
                        buffers: self.records.len(),
                        resident_bytes: self.resident_bytes,
                        spilled: self.records.values().filter(|r| r.spilled).count(),
                        memory_cap: self.options.memory_cap,
                    }));
                }
                Request::Shutdown => break,
            }
        }
        debug!("Buffer manager worker stopped");
    }

    fn reserve(&mut self, id: BufferId, size: usize) -> Result<()> {
        let current = match self.records.get(&id) {
            Some(record) => record.resident,
            None => {
                warn!("Reservation for unregistered buffer {}", id);
                return Ok(());
            }
        };

        if let Some(cap) = self.options.memory_cap {
            if size > cap {
                return CapExceededSnafu {
                    requested: size,
                    cap,
                }
                .fail();
            }
            let others = self.resident_bytes - current;
            if others + size > cap {
                self.evict_until(cap - size, Some(id))?;
                // the requester's own bytes are still accounted for
                if self.resident_bytes - current + size > cap {
                    return CapExceededSnafu {
                        requested: size,
                        cap,
                    }
                    .fail();
                }
            }
        }

        self.tick += 1;
        if let Some(record) = self.records.get_mut(&id) {
            self.resident_bytes = self.resident_bytes - record.resident + size;
            record.resident = size;
            record.last_use = self.tick;
            record.spilled = false;
        }
        trace!(
            "Reserved {} bytes for buffer {}, {} resident",
            size,
            id,
            self.resident_bytes
        );
        Ok(())
    }

    /// Spill least recently used buffers,
    /// other than `keep`,
    /// until the resident bytes of everyone else fit in `target`.
    fn evict_until(&mut self, target: usize, keep: Option<BufferId>) -> Result<()> {
        let kept = keep
            .and_then(|id| self.records.get(&id))
            .map(|r| r.resident)
            .unwrap_or(0);
        let mut candidates: Vec<(u64, BufferId)> = self
            .records
            .iter()
            .filter(|(id, r)| Some(**id) != keep && r.resident > 0)
            .map(|(id, r)| (r.last_use, *id))
            .collect();
        candidates.sort_unstable();

        for (_, id) in candidates {
            if self.resident_bytes - kept <= target {
                break;
            }
            let released = self.spill(id)?;
            if released > 0 {
                if let Some(record) = self.records.get_mut(&id) {
                    record.resident -= released;
                    record.spilled = true;
                }
                self.resident_bytes -= released;
            }
        }
        Ok(())
    }

    /// Try to move the content of buffer `id` out of memory.
    /// Returns the number of bytes released.
    fn spill(&mut self, id: BufferId) -> Result<usize> {
        let Some(slot) = self.records.get(&id).and_then(|r| r.slot.upgrade()) else {
            return Ok(0);
        };
        // a held lock pins the buffer
        let Ok(mut state) = slot.state.try_write() else {
            return Ok(0);
        };
        let block = match std::mem::replace(&mut state.storage, Storage::Empty) {
            Storage::Owned(block) => block,
            other => {
                // adopted memory stays where its owner put it
                state.storage = other;
                return Ok(0);
            }
        };
        let size = block.len();

        if !state.dirty && state.stream.as_ref().map_or(false, StreamInfo::has_source) {
            // content can be streamed in again from its origin
            state.policy.destroy(block);
            debug!("Dropped clean buffer {} ({} bytes)", id, size);
            return Ok(size);
        }

        let path = match self.spill_path(id) {
            Ok(path) => path,
            Err(e) => {
                state.storage = Storage::Owned(block);
                return Err(e);
            }
        };
        if let Err(e) = std::fs::write(&path, &block) {
            state.storage = Storage::Owned(block);
            return Err(e).context(SpillSnafu { id });
        }
        state.policy.destroy(block);
        state.spill = Some(StreamInfo {
            factory: Some(Arc::new(FileStreamFactory::new(&path))),
            size,
            source_file: Some(path),
            format: FileFormat::Raw,
        });
        debug!("Spilled buffer {} ({} bytes) to disk", id, size);
        Ok(size)
    }

    fn spill_path(&mut self, id: BufferId) -> Result<PathBuf> {
        let dir = match self.spill_dir.take() {
            Some(dir) => dir,
            None => match &self.options.spill_dir {
                Some(parent) => TempDir::new_in(parent),
                None => TempDir::new(),
            }
            .context(CreateSpillDirSnafu)?,
        };
        let path = dir.path().join(format!("{:016x}.spill", id));
        self.spill_dir = Some(dir);
        Ok(path)
    }
}

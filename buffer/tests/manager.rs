use dcmanon_buffer::{
    BufferManager, BufferManagerOptions, BufferObject, Error, FileFormat, FileStreamFactory,
    MallocPolicy,
};
use std::io::Write;
use std::sync::Arc;

fn capped(cap: usize) -> Arc<BufferManager> {
    let dir = std::env::temp_dir();
    BufferManager::with_options(BufferManagerOptions::new().memory_cap(cap).spill_dir(dir))
        .unwrap()
}

#[test]
fn memory_pressure_spills_least_recently_used() {
    let manager = capped(100);
    let a = BufferObject::from_vec(&manager, vec![0xAA; 60]).unwrap();
    let b = BufferObject::from_vec(&manager, vec![0xBB; 60]).unwrap();

    assert!(!a.is_resident());
    assert!(b.is_resident());
    let stats = manager.stats().wait().unwrap();
    assert_eq!(stats.buffers, 2);
    assert_eq!(stats.resident_bytes, 60);
    assert_eq!(stats.spilled, 1);

    // locking brings `a` back and pushes `b` out
    assert_eq!(&a.lock_const().unwrap()[..], &[0xAA; 60][..]);
    assert!(!b.is_resident());
    assert_eq!(&b.lock_const().unwrap()[..], &[0xBB; 60][..]);
}

#[test]
fn locked_buffers_are_pinned() {
    let manager = capped(100);
    let a = BufferObject::from_vec(&manager, vec![1; 60]).unwrap();
    let lock = a.lock_const().unwrap();

    let b = BufferObject::new(&manager).unwrap();
    let outcome = b.allocate(60, MallocPolicy::shared());
    assert!(matches!(outcome, Err(Error::CapExceeded { .. })));
    assert!(a.is_resident());
    drop(lock);

    b.allocate(60, MallocPolicy::shared()).unwrap();
    assert!(!a.is_resident());
}

#[test]
fn trim_releases_everything_unlocked() {
    let manager = BufferManager::new().unwrap();
    let buffers: Vec<_> = (0..4u8)
        .map(|i| BufferObject::from_vec(&manager, vec![i; 32]).unwrap())
        .collect();

    let released = manager.trim(0).wait().unwrap();
    assert_eq!(released, 128);
    assert_eq!(manager.stats().wait().unwrap().resident_bytes, 0);

    for (i, buffer) in buffers.iter().enumerate() {
        assert_eq!(&buffer.lock_const().unwrap()[..], &[i as u8; 32][..]);
    }
    assert_eq!(manager.stats().wait().unwrap().resident_bytes, 128);
}

#[test]
fn clean_streamed_buffers_are_dropped_not_spilled() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&[5u8; 40]).unwrap();

    let manager = BufferManager::new().unwrap();
    let buffer = BufferObject::new(&manager).unwrap();
    buffer
        .set_istream_factory(
            Arc::new(FileStreamFactory::new(file.path())),
            40,
            Some(file.path().to_owned()),
            FileFormat::Raw,
            MallocPolicy::shared(),
        )
        .unwrap();
    assert_eq!(buffer.lock_const().unwrap().len(), 40);

    manager.trim(0).wait().unwrap();
    assert!(!buffer.is_resident());
    assert!(buffer.stream_info().has_source());
    assert_eq!(&buffer.lock_const().unwrap()[..], &[5u8; 40][..]);
}

#[test]
fn concurrent_shared_locks() {
    let manager = BufferManager::new().unwrap();
    let buffer = Arc::new(BufferObject::from_vec(&manager, (0..=255u8).collect()).unwrap());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let buffer = Arc::clone(&buffer);
            std::thread::spawn(move || {
                let lock = buffer.lock_const().unwrap();
                lock.iter().map(|b| u64::from(*b)).sum::<u64>()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), 255 * 256 / 2);
    }
    assert_eq!(buffer.lock_count(), 0);
}

#[test]
fn writes_through_shared_handles_are_visible() {
    let manager = BufferManager::new().unwrap();
    let buffer = Arc::new(BufferObject::from_vec(&manager, vec![0; 4]).unwrap());
    let other = Arc::clone(&buffer);

    let writer = std::thread::spawn(move || {
        other.lock().unwrap().copy_from_slice(&[4, 3, 2, 1]);
    });
    writer.join().unwrap();

    assert_eq!(&buffer.lock_const().unwrap()[..], &[4, 3, 2, 1]);
}

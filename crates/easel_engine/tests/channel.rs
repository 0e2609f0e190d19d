use std::fs;
use std::sync::Arc;

use easel_core::JobId;
use easel_engine::{CancellationChannel, ChannelError, FileSlotStore, SlotStore};
use tempfile::TempDir;

#[test]
fn missing_slot_file_reads_as_empty() {
    let temp = TempDir::new().unwrap();
    let store = FileSlotStore::new(temp.path().join("slot.ron"));
    assert_eq!(store.load().unwrap(), None);
}

#[test]
fn file_slot_survives_a_new_store_instance() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("state").join("slot.ron");

    let writer = FileSlotStore::new(&path);
    writer.store(Some(&JobId::from("abc"))).unwrap();
    assert!(path.is_file());

    // A second process sees the same slot.
    let reader = FileSlotStore::new(&path);
    assert_eq!(reader.load().unwrap(), Some(JobId::from("abc")));

    writer.store(Some(&JobId::from("def"))).unwrap();
    assert_eq!(reader.load().unwrap(), Some(JobId::from("def")));

    writer.store(None).unwrap();
    assert_eq!(reader.load().unwrap(), None);
}

#[test]
fn corrupt_slot_file_is_reported() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("slot.ron");
    fs::write(&path, "{{ not ron").unwrap();

    let store = FileSlotStore::new(&path);
    assert!(matches!(store.load(), Err(ChannelError::Corrupt(_))));
}

#[test]
fn channel_is_last_write_wins() {
    let channel = CancellationChannel::in_memory();
    channel.record_job(&JobId::from("first")).unwrap();
    channel.record_job(&JobId::from("second")).unwrap();

    assert!(channel.is_current_job(&JobId::from("second")));
    assert!(!channel.is_current_job(&JobId::from("first")));

    // A finishing superseded job must not clear the newer one.
    assert!(!channel.clear_if(&JobId::from("first")));
    assert_eq!(channel.current_job(), Some(JobId::from("second")));

    assert!(channel.clear_if(&JobId::from("second")));
    assert_eq!(channel.current_job(), None);
}

#[test]
fn channels_sharing_a_file_see_each_others_writes() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("slot.ron");
    let poller_side = CancellationChannel::new(Arc::new(FileSlotStore::new(&path)));
    let cancel_side = CancellationChannel::new(Arc::new(FileSlotStore::new(&path)));

    poller_side.record_job(&JobId::from("abc")).unwrap();
    assert_eq!(cancel_side.current_job(), Some(JobId::from("abc")));

    cancel_side.clear();
    assert!(!poller_side.is_current_job(&JobId::from("abc")));
}

#[test]
fn unwritable_store_degrades_to_memory() {
    let temp = TempDir::new().unwrap();
    // The slot's parent is a regular file, so every write fails.
    let blocker = temp.path().join("not_a_dir");
    fs::write(&blocker, "x").unwrap();
    let channel = CancellationChannel::new(Arc::new(FileSlotStore::new(blocker.join("slot.ron"))));

    assert!(channel.record_job(&JobId::from("abc")).is_err());
    assert!(channel.is_degraded());
    assert_eq!(channel.current_job(), Some(JobId::from("abc")));

    channel.clear();
    assert_eq!(channel.current_job(), None);
}

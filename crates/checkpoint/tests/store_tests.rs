use tempfile::tempdir;
use verdict_vm::program::{ImageBuilder, Opcode};
use verdict_vm::{Machine, Status, Value};
use verdict_checkpoint::{CheckpointStore, StorageError};

fn message_bytes(sender: u64, block: u64, payload: Value) -> Vec<u8> {
    Value::tuple(vec![
        Value::from_u64(sender),
        Value::from_u64(block),
        payload,
    ])
    .unwrap()
    .encode()
}

/// A machine that has actually done something: pushed values, moved one to
/// the auxiliary area, consumed a delivered message, and left one pending.
fn exercised_machine() -> Machine {
    let image = ImageBuilder::new()
        .op_imm(Opcode::Push, Value::from_u64(11))
        .op_imm(Opcode::Push, Value::from_u64(22))
        .op(Opcode::ToAux)
        .op(Opcode::Inbox)
        .op(Opcode::Nop)
        .op(Opcode::Halt)
        .build();
    let mut m = Machine::construct(&image).unwrap();
    m.send_onchain_message(&message_bytes(1, 10, Value::from_u64(100)))
        .unwrap();
    m.deliver_onchain_messages();
    m.send_onchain_message(&message_bytes(2, 20, Value::from_u64(200)))
        .unwrap();
    m.run(4, 0, 1_000);
    m
}

fn other_machine() -> Machine {
    let image = ImageBuilder::new().op(Opcode::Nop).op(Opcode::Halt).build();
    Machine::construct(&image).unwrap()
}

#[test]
fn test_checkpoint_and_restore_roundtrip() {
    let dir = tempdir().unwrap();
    let store = CheckpointStore::open(dir.path()).unwrap();

    let original = exercised_machine();
    store.checkpoint(&original, "mid-run").unwrap();

    // Restoring into a machine built from a completely different image
    // must still reproduce the captured machine exactly.
    let mut target = other_machine();
    assert_ne!(target.hash(), original.hash());
    store.restore(&mut target, "mid-run").unwrap();

    assert_eq!(target.hash(), original.hash());
    assert_eq!(target.current_status(), original.current_status());
    assert_eq!(target.step_count(), original.step_count());
    assert_eq!(target.pc(), original.pc());
    assert_eq!(target.pending_message_count(), 1);
}

#[test]
fn test_restored_machine_continues_identically() {
    let dir = tempdir().unwrap();
    let store = CheckpointStore::open(dir.path()).unwrap();

    let mut original = exercised_machine();
    store.checkpoint(&original, "fork-point").unwrap();

    let mut restored = other_machine();
    store.restore(&mut restored, "fork-point").unwrap();

    let a = original.run(100, 0, 1_000);
    let b = restored.run(100, 0, 1_000);
    assert_eq!(a, b);
    assert_eq!(original.hash(), restored.hash());
    assert_eq!(original.current_status(), Status::Halted);
}

#[test]
fn test_restore_missing_name_leaves_machine_unchanged() {
    let dir = tempdir().unwrap();
    let store = CheckpointStore::open(dir.path()).unwrap();

    let mut m = exercised_machine();
    let before = m.hash();
    let result = store.restore(&mut m, "never-written");
    assert!(matches!(result, Err(StorageError::NotFound(_))));
    assert_eq!(m.hash(), before);
}

#[test]
fn test_corrupted_payload_is_rejected_and_machine_unchanged() {
    let dir = tempdir().unwrap();
    let store = CheckpointStore::open(dir.path()).unwrap();

    let original = exercised_machine();
    store.checkpoint(&original, "tamper").unwrap();

    // Flip one payload byte past the 56-byte header.
    let path = dir.path().join("tamper.ckpt");
    let mut bytes = std::fs::read(&path).unwrap();
    let idx = 56 + bytes.len().saturating_sub(56) / 2;
    bytes[idx] ^= 0xFF;
    std::fs::write(&path, &bytes).unwrap();

    let mut target = other_machine();
    let before = target.hash();
    let result = store.restore(&mut target, "tamper");
    assert!(matches!(result, Err(StorageError::ChecksumMismatch { .. })));
    assert_eq!(target.hash(), before);
}

#[test]
fn test_truncated_file_is_rejected() {
    let dir = tempdir().unwrap();
    let store = CheckpointStore::open(dir.path()).unwrap();

    store.checkpoint(&exercised_machine(), "short").unwrap();

    let path = dir.path().join("short.ckpt");
    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..bytes.len() - 5]).unwrap();

    let mut target = other_machine();
    assert!(store.restore(&mut target, "short").is_err());
    assert_eq!(target.current_status(), Status::Extensive);
}

#[test]
fn test_invalid_names_are_rejected_before_touching_disk() {
    let dir = tempdir().unwrap();
    let store = CheckpointStore::open(dir.path()).unwrap();
    let m = exercised_machine();

    for name in ["", "a/b", "../escape", "has space"] {
        let result = store.checkpoint(&m, name);
        assert!(
            matches!(result, Err(StorageError::InvalidName(_))),
            "{name:?} should be invalid"
        );
    }
    assert!(store.names().unwrap().is_empty());
}

#[test]
fn test_failed_index_append_leaves_no_checkpoint_behind() {
    let dir = tempdir().unwrap();
    let store = CheckpointStore::open(dir.path()).unwrap();

    // Occupy the index path with a directory so the metadata append fails.
    std::fs::create_dir(dir.path().join("checkpoints.idx")).unwrap();

    let m = exercised_machine();
    assert!(store.checkpoint(&m, "orphan").is_err());
    assert!(!store.contains("orphan"));
    assert!(!dir.path().join("orphan.ckpt").exists());
    assert!(!dir.path().join("orphan.ckpt.tmp").exists());
}

#[test]
fn test_names_lists_in_write_order_with_overwrites_deduplicated() {
    let dir = tempdir().unwrap();
    let store = CheckpointStore::open(dir.path()).unwrap();

    let mut m = exercised_machine();
    store.checkpoint(&m, "alpha").unwrap();
    store.checkpoint(&m, "beta").unwrap();
    m.run(1, 0, 1_000);
    store.checkpoint(&m, "alpha").unwrap();

    assert_eq!(store.names().unwrap(), vec!["beta", "alpha"]);
    assert!(store.contains("alpha"));
    assert!(store.contains("beta"));
    assert!(!store.contains("gamma"));

    // The overwritten name restores to its latest capture.
    let mut restored = other_machine();
    store.restore(&mut restored, "alpha").unwrap();
    assert_eq!(restored.hash(), m.hash());
}

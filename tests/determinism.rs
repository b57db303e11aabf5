//! End-to-end determinism: two machines fed the same image, the same
//! message traffic and the same run bounds must agree on every observable
//! at every point, and their state hashes must be interchangeable.

use verdict_vm::program::{ImageBuilder, Opcode};
use verdict_vm::{BlockReason, Machine, Status, Value};

fn message_bytes(sender: u64, block: u64, payload: Value) -> Vec<u8> {
    Value::tuple(vec![
        Value::from_u64(sender),
        Value::from_u64(block),
        payload,
    ])
    .unwrap()
    .encode()
}

fn consumer_image() -> Vec<u8> {
    ImageBuilder::new()
        .op(Opcode::Inbox)
        .op(Opcode::Log)
        .op(Opcode::Inbox)
        .op(Opcode::Send)
        .op(Opcode::Halt)
        .build()
}

#[test]
fn test_identical_histories_agree_everywhere() {
    let image = consumer_image();
    let mut a = Machine::construct(&image).unwrap();
    let mut b = Machine::construct(&image).unwrap();

    let traffic = [
        message_bytes(1, 5, Value::from_u64(100)),
        message_bytes(2, 6, Value::from_u64(200)),
    ];

    for bytes in &traffic {
        a.send_onchain_message(bytes).unwrap();
        b.send_onchain_message(bytes).unwrap();
    }
    assert_eq!(a.hash(), b.hash());

    a.deliver_onchain_messages();
    b.deliver_onchain_messages();
    assert_eq!(a.hash(), b.hash());
    assert_eq!(a.inbox_hash(), b.inbox_hash());

    // Interleave runs differently; as long as total bounds match, the end
    // states must match.
    let mut out_a = a.run(2, 0, 1_000);
    let partial = a.run(100, 0, 1_000);
    out_a.out_messages.extend(partial.out_messages);
    out_a.logs.extend(partial.logs);
    out_a.step_count += partial.step_count;

    let out_b = b.run(100, 0, 1_000);

    assert_eq!(a.hash(), b.hash());
    assert_eq!(out_a.step_count, out_b.step_count);
    assert_eq!(out_a.logs, out_b.logs);
    assert_eq!(out_a.out_messages, out_b.out_messages);
    assert_eq!(a.current_status(), Status::Halted);
}

#[test]
fn test_inbox_block_then_delivery_unblocks() {
    let mut m = Machine::construct(&consumer_image()).unwrap();

    let assertion = m.run(100, 0, 1_000);
    assert_eq!(assertion.step_count, 0);
    assert!(matches!(
        m.last_block_reason(),
        BlockReason::InboxBlocked(_)
    ));

    // Delivery with nothing pending changes nothing.
    let blocked_hash = m.hash();
    m.deliver_onchain_messages();
    assert_eq!(m.hash(), blocked_hash);
    let again = m.run(100, 0, 1_000);
    assert_eq!(again.step_count, 0);

    m.send_onchain_message(&message_bytes(9, 1, Value::from_u64(7)))
        .unwrap();
    assert_eq!(m.pending_message_count(), 1);
    // Still blocked until delivery: sending alone is not visible to reads.
    assert_eq!(m.run(100, 0, 1_000).step_count, 0);

    m.deliver_onchain_messages();
    assert_eq!(m.pending_message_count(), 0);
    let progressed = m.run(2, 0, 1_000);
    assert_eq!(progressed.step_count, 2);
    assert_eq!(progressed.logs.len(), 1);
}

#[test]
fn test_malformed_payload_rejected_without_inbox_mutation() {
    let mut m = Machine::construct(&consumer_image()).unwrap();
    m.send_onchain_message(&message_bytes(1, 1, Value::unit()))
        .unwrap();
    let before = m.hash();
    let pending_before = m.pending_message_count();

    // Not a 3-tuple.
    assert!(m
        .send_onchain_message(&Value::from_u64(5).encode())
        .is_err());
    // Not even a canonical value.
    assert!(m.send_onchain_message(&[0xFF, 0x00]).is_err());

    assert_eq!(m.hash(), before);
    assert_eq!(m.pending_message_count(), pending_before);
}

#[test]
fn test_offchain_batch_is_all_or_nothing() {
    let mut m = Machine::construct(&consumer_image()).unwrap();

    let good = message_bytes(1, 1, Value::from_u64(1));
    let bad = Value::from_u64(2).encode();
    assert!(m.send_offchain_messages(&[good.clone(), bad]).is_err());
    // Offchain messages skip the pending queue entirely; a failed batch
    // must not leave a prefix behind.
    let fresh = Machine::construct(&consumer_image()).unwrap();
    assert_eq!(m.hash(), fresh.hash());

    m.send_offchain_messages(&[good]).unwrap();
    assert_eq!(m.pending_message_count(), 0);
    assert_eq!(m.run(2, 0, 1_000).step_count, 2);
}

#[test]
fn test_pending_count_tracks_sends_and_deliveries() {
    let mut m = Machine::construct(&consumer_image()).unwrap();
    assert_eq!(m.pending_message_count(), 0);

    for i in 0..3 {
        m.send_onchain_message(&message_bytes(i, i, Value::unit()))
            .unwrap();
    }
    assert_eq!(m.pending_message_count(), 3);

    m.deliver_onchain_messages();
    assert_eq!(m.pending_message_count(), 0);

    m.send_onchain_message(&message_bytes(4, 4, Value::unit()))
        .unwrap();
    assert_eq!(m.pending_message_count(), 1);
}

#[test]
fn test_divergent_traffic_diverges_hashes() {
    let image = consumer_image();
    let mut a = Machine::construct(&image).unwrap();
    let mut b = Machine::construct(&image).unwrap();

    a.send_onchain_message(&message_bytes(1, 1, Value::from_u64(1)))
        .unwrap();
    b.send_onchain_message(&message_bytes(1, 1, Value::from_u64(2)))
        .unwrap();
    assert_ne!(a.hash(), b.hash());

    a.deliver_onchain_messages();
    b.deliver_onchain_messages();
    assert_ne!(a.inbox_hash(), b.inbox_hash());
}

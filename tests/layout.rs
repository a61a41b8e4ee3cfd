// Layout conformance tests for wire version 1. These assert sizes,
// alignments, and field offsets for the structures shared with client
// processes; any mismatch here is a protocol version bump, not a fix.

use memoffset::offset_of;
use shmbus::layout::{MessageSlot, QueueDesc, SharedHeader, MAX_QUEUES};
use std::mem::{align_of, size_of};

#[test]
fn message_slot_layout() {
    assert_eq!(size_of::<MessageSlot>(), 16);
    assert_eq!(align_of::<MessageSlot>(), 4);

    assert_eq!(offset_of!(MessageSlot, udata), 0);
    assert_eq!(offset_of!(MessageSlot, pending_subs), 4);
    assert_eq!(offset_of!(MessageSlot, size), 8);
    assert_eq!(offset_of!(MessageSlot, offset), 12);
}

#[test]
fn queue_desc_layout() {
    assert_eq!(size_of::<QueueDesc>(), 40);
    assert_eq!(align_of::<QueueDesc>(), 8);

    assert_eq!(offset_of!(QueueDesc, queue_id), 0);
    assert_eq!(offset_of!(QueueDesc, num_messages), 4);
    assert_eq!(offset_of!(QueueDesc, subs), 8);
    assert_eq!(offset_of!(QueueDesc, position), 16);
    assert_eq!(offset_of!(QueueDesc, messages_offset), 24);
    assert_eq!(offset_of!(QueueDesc, lock), 32);
}

#[test]
fn shared_header_layout() {
    assert_eq!(size_of::<SharedHeader>(), 24 + 40 * MAX_QUEUES);
    assert_eq!(align_of::<SharedHeader>(), 8);

    assert_eq!(offset_of!(SharedHeader, magic), 0);
    assert_eq!(offset_of!(SharedHeader, version), 4);
    assert_eq!(offset_of!(SharedHeader, session_id), 8);
    assert_eq!(offset_of!(SharedHeader, heartbeat), 12);
    assert_eq!(offset_of!(SharedHeader, caps), 16);
    assert_eq!(offset_of!(SharedHeader, num_queues), 20);
    assert_eq!(offset_of!(SharedHeader, queues), 24);
}

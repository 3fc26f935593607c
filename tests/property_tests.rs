//! Property-based tests using proptest
//!
//! These validate the buffer-layout invariants across a wide range of
//! randomly generated values, positions and window shapes.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use proptest::prelude::*;
use secure_channel::Mailbox;

// Property: big-endian scalars round-trip at any in-bounds position
proptest! {
    #[test]
    fn prop_i16_roundtrip(value in any::<i16>(), pos in 0usize..62) {
        let mut mailbox = Mailbox::new();
        mailbox.allocate(64);
        mailbox.set_i16(pos, value);
        prop_assert_eq!(mailbox.get_i16(pos), value);
    }
}

proptest! {
    #[test]
    fn prop_i32_roundtrip(value in any::<i32>(), pos in 0usize..60) {
        let mut mailbox = Mailbox::new();
        mailbox.allocate(64);
        mailbox.set_i32(pos, value);
        prop_assert_eq!(mailbox.get_i32(pos), value);
    }
}

proptest! {
    #[test]
    fn prop_i64_roundtrip(value in any::<i64>(), pos in 0usize..56) {
        let mut mailbox = Mailbox::new();
        mailbox.allocate(64);
        mailbox.set_i64(pos, value);
        prop_assert_eq!(mailbox.get_i64(pos), value);
    }
}

// Property: UTF-16BE strings round-trip (basic multilingual plane)
proptest! {
    #[test]
    fn prop_string_roundtrip(text in "[a-zA-Z0-9 àéîöñçß]{1,30}") {
        let chars = text.chars().count();
        let mut mailbox = Mailbox::new();
        mailbox.allocate(chars * 2 + 8);
        mailbox.set_str(4, &text);
        prop_assert_eq!(mailbox.get_str(4, chars), text);
    }
}

// Property: writes through a portion land at offset + position in the parent
proptest! {
    #[test]
    fn prop_portion_addressing(offset in 0usize..32, value in any::<i32>()) {
        let mut mailbox = Mailbox::new();
        mailbox.allocate(64);
        let portion = mailbox.make_portion(offset, 32);
        portion.set_i32(&mut mailbox, 7, value);
        prop_assert_eq!(mailbox.get_i32(offset + 7), value);
        mailbox.release_portion(portion);
    }
}

// Property: scalar writes never touch bytes outside their range
proptest! {
    #[test]
    fn prop_writes_stay_in_range(pos in 0usize..56, value in any::<i64>()) {
        let mut mailbox = Mailbox::new();
        mailbox.allocate(64);
        mailbox.zero();
        mailbox.set_i64(pos, value);
        let view = mailbox.view();
        for (i, &byte) in view.iter().enumerate() {
            if !(pos..pos + 8).contains(&i) {
                prop_assert_eq!(byte, 0);
            }
        }
    }
}

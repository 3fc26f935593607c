//! # CTR Counter
//!
//! Generates the 16-byte counter blocks consumed by the cipher in CTR mode.
//!
//! A counter is formed from three numbers:
//! - a **series** number: 64 bits, random, shared by every message encrypted
//!   under the same symmetric key; 0 is reserved for the not-yet-keyed state
//! - a **message** number within the series, cycling `1, …, MAX, 0`; the
//!   final 0 doubles as the signal that the series is exhausted and the keys
//!   must rotate
//! - a **block** number within the message, `0, …, MAX`
//!
//! Both peers hold one counter per direction and advance them in lock-step,
//! so the counter triple never needs to travel on the wire: it *is* the
//! implicit nonce.
//!
//! Call order is strict. A prepared counter must be consumed with
//! [`emit`](CtrCounter::emit) before the next mutation runs:
//!
//! ```text
//! start:             0    0    0, 1, 2, …
//! change_series:     s1   1    0, 1, 2, …
//! increment_message: s1   2    0, 1, 2, …
//!    …
//! reset_message:     s1   0    0, 1, 2, …
//! change_series:     s2   1    0, 1, 2, …
//! ```

use super::block::BLOCK_BYTES;

/// Size of an emitted counter, in bytes.
pub const COUNTER_BYTES: usize = BLOCK_BYTES;

/// Largest message number before the cycle wraps to 0.
pub const MAX_MESSAGE: i32 = i32::MAX;

/// Largest block number.
pub const MAX_BLOCK: i32 = i32::MAX;

const SERIES_OFFSET: usize = 0;
const MESSAGE_OFFSET: usize = 8;
const BLOCK_OFFSET: usize = 12;

/// Counter state for one direction of a secure channel.
#[derive(Debug)]
pub struct CtrCounter {
    started: bool,
    consumed: bool,
    series: i64,
    message: i32,
    block: i32,
}

impl Default for CtrCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl CtrCounter {
    /// Create an inert counter; [`start`](CtrCounter::start) must run before
    /// anything else.
    pub fn new() -> Self {
        Self {
            started: false,
            consumed: false,
            series: 0,
            message: 0,
            block: 0,
        }
    }

    /// Enter the unkeyed state `(0, 0, 0)`. May only run once.
    pub fn start(&mut self) {
        debug_assert!(!self.started, "counter already started");

        self.series = 0;
        self.message = 0;
        self.block = 0;
        self.started = true;
        self.consumed = false;
    }

    /// Begin a new series. The first message of a series is number 1.
    ///
    /// Only legal while the message number is 0 (freshly started, reset, or
    /// wrapped); the new series must be nonzero and differ from the current
    /// one.
    pub fn change_series(&mut self, series: i64) {
        debug_assert!(self.started, "counter not started");
        if self.series != 0 || self.message != 0 || self.block != 0 {
            debug_assert!(self.consumed, "counter not consumed");
        }
        debug_assert!(self.message == 0, "message number not 0");
        debug_assert!(series != 0, "series 0 is reserved");
        debug_assert!(series != self.series, "series unchanged");

        self.series = series;
        self.message = 1;
        self.block = 0;
        self.consumed = false;
    }

    /// Force the message number to 0 ahead of a series change.
    pub fn reset_message(&mut self) {
        debug_assert!(self.started, "counter not started");
        debug_assert!(self.series != 0, "no series established");
        debug_assert!(self.message > 0, "message number already 0");

        self.message = 0;
        self.block = 0;
        self.consumed = false;
    }

    /// Advance to the next message: `1, …, MAX, 0`. Resets the block number.
    pub fn increment_message(&mut self) {
        debug_assert!(self.started, "counter not started");
        debug_assert!(self.consumed, "counter not consumed");
        debug_assert!(self.series != 0, "no series established");
        debug_assert!(self.message > 0, "message number is 0");

        self.message = if self.message < MAX_MESSAGE {
            self.message + 1
        } else {
            0
        };
        self.block = 0;
        self.consumed = false;
    }

    /// Advance to the next block within the current message.
    pub fn increment_block(&mut self) {
        debug_assert!(self.started, "counter not started");
        debug_assert!(self.consumed, "counter not consumed");
        debug_assert!(self.block < MAX_BLOCK, "block number exhausted");

        self.block += 1;
        self.consumed = false;
    }

    /// Current series number.
    pub fn series(&self) -> i64 {
        self.series
    }

    /// Current message number.
    pub fn message(&self) -> i32 {
        self.message
    }

    /// Current block number.
    pub fn block(&self) -> i32 {
        self.block
    }

    /// Write `series ∥ message ∥ block` big-endian into `target` and mark the
    /// counter consumed. Each prepared counter may be emitted exactly once.
    pub fn emit(&mut self, target: &mut [u8; COUNTER_BYTES]) {
        debug_assert!(self.started, "counter not started");
        debug_assert!(!self.consumed, "counter already consumed");

        target[SERIES_OFFSET..SERIES_OFFSET + 8].copy_from_slice(&self.series.to_be_bytes());
        target[MESSAGE_OFFSET..MESSAGE_OFFSET + 4].copy_from_slice(&self.message.to_be_bytes());
        target[BLOCK_OFFSET..BLOCK_OFFSET + 4].copy_from_slice(&self.block.to_be_bytes());

        self.consumed = true;
    }
}

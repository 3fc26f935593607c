//! Random material from the operating system RNG.

use rand::rngs::OsRng;
use rand::RngCore;

/// Fill `buffer` with random bytes.
pub fn fill(buffer: &mut [u8]) {
    OsRng.fill_bytes(buffer);
}

/// Draw a fresh series value: never 0 (reserved for the unkeyed state) and
/// never equal to `previous`.
pub fn fresh_series(previous: i64) -> i64 {
    let mut raw = [0u8; 8];
    loop {
        OsRng.fill_bytes(&mut raw);
        let series = i64::from_be_bytes(raw);
        if series != 0 && series != previous {
            return series;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_changes_buffer() {
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        fill(&mut a);
        fill(&mut b);
        // 2^-256 odds of a false failure
        assert_ne!(a, b);
    }

    #[test]
    fn series_avoids_zero_and_previous() {
        for _ in 0..64 {
            let first = fresh_series(0);
            assert_ne!(first, 0);
            let second = fresh_series(first);
            assert_ne!(second, 0);
            assert_ne!(second, first);
        }
    }
}

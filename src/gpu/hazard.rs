//! Hazard telemetry decoding for the lookback stress kernel.
//!
//! The instrumented stress kernel records, per tile and per instrumented
//! thread, a `{error code, observed value}` word pair. This module owns the
//! bit layout shared with the WGSL side and turns those raw words into a
//! classified verdict. Decoding is pure host logic and never touches the
//! device.

use std::fmt;

/// Bit layout and sizing constants shared with the WGSL kernels.
///
/// These mirror the constants at the top of `stress.wgsl`; the two sides
/// form a wire format and must change together.
pub mod protocol {
    /// Status cell content before the owning tile has published anything.
    pub const FLAG_NOT_READY: u32 = 0;
    /// Set once a tile has published its local reduction.
    pub const FLAG_READY: u32 = 1 << 30;
    /// Set once a tile has published its full inclusive prefix.
    pub const FLAG_INCLUSIVE: u32 = 1 << 31;
    /// Low bits of a status cell carrying one 16-bit half of the payload.
    pub const VALUE_MASK: u32 = 0xFFFF;

    /// Instrumented threads per tile: the two lookback lanes, one per
    /// 16-bit payload half. A fixed sampling choice, not a thread count.
    pub const SPLIT_THREADS: u32 = 2;
    /// Telemetry words per instrumented thread: `{code, observed}`.
    pub const WORDS_PER_THREAD: u32 = 2;
    /// Every tile contributes this constant to the scan.
    pub const TILE_CONTRIBUTION: u32 = 1024;

    /// No hazard observed.
    pub const ERROR_NONE: u32 = 0;
    /// A status cell was read in an impossible intermediate state.
    pub const ERROR_MESSAGE: u32 = 1;
    /// The cross-lane `prev_red` exchange did not match its derivation.
    pub const ERROR_SHUFFLE: u32 = 2;

    /// Telemetry words recorded per trial for `size` tiles.
    pub fn telemetry_len(size: u32) -> usize {
        (size * SPLIT_THREADS * WORDS_PER_THREAD) as usize
    }

    /// The only legal READY-state cell content for thread slot `tid`:
    /// its half of the tile contribution, OR'd with the ready flag.
    pub fn ready_value(tid: u32) -> u32 {
        ((TILE_CONTRIBUTION >> (tid * 16)) & VALUE_MASK) | FLAG_READY
    }
}

/// One decoded telemetry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorRecord {
    /// Tile that recorded the entry.
    pub tile: u32,
    /// Instrumented thread slot within the tile (0 or 1).
    pub thread: u32,
    /// Raw error code word.
    pub code: u32,
    /// Raw observed value word.
    pub observed: u32,
}

/// A classified hazard. Carries the offending record for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hazard {
    /// A status cell was observed outside its three legal states.
    MessagePassing(ErrorRecord),
    /// The cross-lane value exchange produced a stale or torn value.
    Shuffle(ErrorRecord),
    /// Unrecognized error code from the kernel.
    Unknown(ErrorRecord),
}

impl Hazard {
    /// The record that triggered the hazard.
    pub fn record(&self) -> &ErrorRecord {
        match self {
            Hazard::MessagePassing(r) | Hazard::Shuffle(r) | Hazard::Unknown(r) => r,
        }
    }
}

impl fmt::Display for Hazard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hazard::MessagePassing(r) => write!(
                f,
                "message-passing hazard at tile {}, thread {}: got {:#010X}; \
                 expected {:#010X} (NOT_READY), {:#010X} (READY: this thread's half of \
                 the tile contribution), or any value with the INCLUSIVE bit {:#010X} set",
                r.tile,
                r.thread,
                r.observed,
                protocol::FLAG_NOT_READY,
                protocol::ready_value(r.thread),
                protocol::FLAG_INCLUSIVE,
            ),
            Hazard::Shuffle(r) => write!(
                f,
                "shuffle hazard at tile {}, thread {}: got {:#010X} for prev_red; \
                 expected (tile - N) * {} for the lookback step that produced it",
                r.tile,
                r.thread,
                r.observed,
                protocol::TILE_CONTRIBUTION,
            ),
            Hazard::Unknown(r) => write!(
                f,
                "unknown error code {} at tile {}, thread {}: got {:#010X}",
                r.code, r.tile, r.thread, r.observed,
            ),
        }
    }
}

/// Classifies one telemetry record. Returns `None` when the record is clean.
///
/// Code 1 entries are re-checked against the three legal status-cell shapes:
/// the kernel may flag a sample that a slow reader took legitimately, so the
/// host gets the final word on whether the observed value was possible.
/// Code 2 entries are always hazards; the kernel records them only when the
/// exchanged value already failed its closed-form check.
pub fn classify(record: ErrorRecord) -> Option<Hazard> {
    match record.code {
        protocol::ERROR_NONE => None,
        protocol::ERROR_MESSAGE => {
            let legal = record.observed == protocol::FLAG_NOT_READY
                || record.observed == protocol::ready_value(record.thread)
                || record.observed & protocol::FLAG_INCLUSIVE != 0;
            if legal {
                None
            } else {
                Some(Hazard::MessagePassing(record))
            }
        }
        protocol::ERROR_SHUFFLE => Some(Hazard::Shuffle(record)),
        _ => Some(Hazard::Unknown(record)),
    }
}

/// Scans a trial's telemetry words for the first hazard.
///
/// `words` is laid out per tile, per thread slot, as `{code, observed}`
/// pairs and must hold at least [`protocol::telemetry_len`] words for
/// `size`. Tiles are checked in increasing order, thread slots in
/// increasing order within a tile, and the scan stops at the first hazard;
/// later entries are never inspected. `size == 0` passes vacuously.
pub fn scan_telemetry(words: &[u32], size: u32) -> Result<(), Hazard> {
    for tile in 0..size {
        let base = (tile * protocol::SPLIT_THREADS * protocol::WORDS_PER_THREAD) as usize;
        for thread in 0..protocol::SPLIT_THREADS {
            let at = base + (thread * protocol::WORDS_PER_THREAD) as usize;
            let record = ErrorRecord {
                tile,
                thread,
                code: words[at],
                observed: words[at + 1],
            };
            if let Some(hazard) = classify(record) {
                return Err(hazard);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::protocol::*;
    use super::*;

    fn record(tile: u32, thread: u32, code: u32, observed: u32) -> ErrorRecord {
        ErrorRecord {
            tile,
            thread,
            code,
            observed,
        }
    }

    #[test]
    fn test_clean_record_passes() {
        assert_eq!(classify(record(0, 0, ERROR_NONE, 0)), None);
        // Observed value is ignored when the code is clean.
        assert_eq!(classify(record(7, 1, ERROR_NONE, 0xDEADBEEF)), None);
    }

    #[test]
    fn test_ready_value_halves() {
        // Thread 0 carries the low half of 1024, thread 1 the high half (0).
        assert_eq!(ready_value(0), 1024 | FLAG_READY);
        assert_eq!(ready_value(1), FLAG_READY);
    }

    #[test]
    fn test_not_ready_is_legal() {
        assert_eq!(classify(record(3, 0, ERROR_MESSAGE, FLAG_NOT_READY)), None);
        assert_eq!(classify(record(3, 1, ERROR_MESSAGE, FLAG_NOT_READY)), None);
    }

    #[test]
    fn test_ready_state_is_legal_per_thread() {
        assert_eq!(
            classify(record(3, 0, ERROR_MESSAGE, 1024 | FLAG_READY)),
            None
        );
        assert_eq!(classify(record(3, 1, ERROR_MESSAGE, FLAG_READY)), None);

        // The other thread's half is a torn read for this slot.
        assert!(matches!(
            classify(record(3, 1, ERROR_MESSAGE, 1024 | FLAG_READY)),
            Some(Hazard::MessagePassing(_))
        ));
        assert!(matches!(
            classify(record(3, 0, ERROR_MESSAGE, FLAG_READY)),
            Some(Hazard::MessagePassing(_))
        ));
    }

    #[test]
    fn test_inclusive_state_is_legal_regardless_of_payload() {
        for observed in [
            FLAG_INCLUSIVE,
            FLAG_INCLUSIVE | 1,
            FLAG_INCLUSIVE | 0xFFFF,
            FLAG_INCLUSIVE | FLAG_READY | 0x1234,
        ] {
            assert_eq!(classify(record(5, 0, ERROR_MESSAGE, observed)), None);
            assert_eq!(classify(record(5, 1, ERROR_MESSAGE, observed)), None);
        }
    }

    #[test]
    fn test_torn_ready_is_a_hazard() {
        // READY flag with a payload that matches neither half.
        let hazard = classify(record(9, 0, ERROR_MESSAGE, 0x40000777));
        match hazard {
            Some(Hazard::MessagePassing(r)) => {
                assert_eq!(r.tile, 9);
                assert_eq!(r.thread, 0);
                assert_eq!(r.observed, 0x40000777);
            }
            other => panic!("expected message-passing hazard, got {:?}", other),
        }

        // Bare payload without any flag bit.
        assert!(matches!(
            classify(record(9, 1, ERROR_MESSAGE, 1024)),
            Some(Hazard::MessagePassing(_))
        ));
    }

    #[test]
    fn test_shuffle_code_always_fails() {
        // The kernel only records code 2 on mismatch; the value cannot be
        // re-derived host-side, so any such record is a hazard.
        for observed in [0, 1024, 2048, 0xFFFF_FFFF] {
            assert!(matches!(
                classify(record(2, 1, ERROR_SHUFFLE, observed)),
                Some(Hazard::Shuffle(_))
            ));
        }
    }

    #[test]
    fn test_unknown_code_fails_with_raw_values() {
        let hazard = classify(record(4, 0, 99, 0xABCD));
        match hazard {
            Some(Hazard::Unknown(r)) => {
                assert_eq!(r.code, 99);
                assert_eq!(r.observed, 0xABCD);
            }
            other => panic!("expected unknown hazard, got {:?}", other),
        }
    }

    #[test]
    fn test_scan_empty_size_is_vacuous() {
        // No tiles to check; telemetry contents are irrelevant.
        assert!(scan_telemetry(&[], 0).is_ok());
        assert!(scan_telemetry(&[ERROR_SHUFFLE, 7, 0, 0], 0).is_ok());
    }

    #[test]
    fn test_scan_all_clean() {
        let words = vec![0u32; telemetry_len(16)];
        assert!(scan_telemetry(&words, 16).is_ok());
    }

    #[test]
    fn test_scan_short_circuits_in_tile_order() {
        let mut words = vec![0u32; telemetry_len(8)];
        // Hazard at tile 3, thread 0.
        words[3 * 4] = ERROR_MESSAGE;
        words[3 * 4 + 1] = 0x1234_5678;
        // Tile 5 holds garbage that must never be reached.
        words[5 * 4] = 0xFFFF_FFFF;
        words[5 * 4 + 1] = 0xFFFF_FFFF;

        let hazard = scan_telemetry(&words, 8).unwrap_err();
        assert_eq!(hazard.record().tile, 3);
        assert_eq!(hazard.record().thread, 0);
    }

    #[test]
    fn test_scan_thread_order_within_tile() {
        let mut words = vec![0u32; telemetry_len(4)];
        // Both threads of tile 2 record hazards; thread 0 must win.
        words[2 * 4] = ERROR_SHUFFLE;
        words[2 * 4 + 1] = 3;
        words[2 * 4 + 2] = ERROR_SHUFFLE;
        words[2 * 4 + 3] = 4;

        let hazard = scan_telemetry(&words, 4).unwrap_err();
        assert_eq!(hazard.record().thread, 0);
        assert_eq!(hazard.record().observed, 3);
    }

    #[test]
    fn test_scan_is_idempotent() {
        let mut words = vec![0u32; telemetry_len(8)];
        words[6 * 4 + 2] = ERROR_MESSAGE;
        words[6 * 4 + 3] = 0xBAD;

        let first = scan_telemetry(&words, 8);
        let second = scan_telemetry(&words, 8);
        assert_eq!(first, second);
    }

    #[test]
    fn test_hazard_display_cites_location() {
        let hazard = classify(record(12, 1, ERROR_MESSAGE, 0x7777)).unwrap();
        let text = hazard.to_string();
        assert!(text.contains("tile 12"));
        assert!(text.contains("thread 1"));
        assert!(text.contains("0x00007777"));

        let hazard = classify(record(2, 0, ERROR_SHUFFLE, 2048)).unwrap();
        assert!(hazard.to_string().contains("prev_red"));
    }

    #[test]
    fn test_telemetry_len() {
        assert_eq!(telemetry_len(0), 0);
        assert_eq!(telemetry_len(1), 4);
        assert_eq!(telemetry_len(1024), 4096);
    }
}

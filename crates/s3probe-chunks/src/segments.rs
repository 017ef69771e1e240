//! Fixed-size segment splitting
//!
//! Plaintext is encrypted in windows of a fixed size; a buffer handed to the
//! cipher rarely ends on a window boundary, so the tail is returned for the
//! caller to carry into the next round.

/// Split `data` into full `segment_size` windows plus the trailing remainder
/// (0..segment_size-1 bytes).
///
/// # Panics
/// Panics if `segment_size` is zero.
pub fn split_segments(data: &[u8], segment_size: usize) -> (Vec<&[u8]>, &[u8]) {
    assert!(segment_size > 0, "segment size must be positive");
    let windows = data.chunks_exact(segment_size);
    let remainder = windows.remainder();
    (windows.collect(), remainder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn short_input_is_all_remainder() {
        let (segments, rest) = split_segments(b"abc", 4);
        assert!(segments.is_empty());
        assert_eq!(rest, b"abc");
    }

    #[test]
    fn exact_multiple_leaves_no_remainder() {
        let (segments, rest) = split_segments(b"abcdefgh", 4);
        assert_eq!(segments, vec![&b"abcd"[..], &b"efgh"[..]]);
        assert!(rest.is_empty());
    }

    #[test]
    fn uneven_input_keeps_tail() {
        let (segments, rest) = split_segments(b"abcdefghij", 4);
        assert_eq!(segments.len(), 2);
        assert_eq!(rest, b"ij");
    }

    #[test]
    fn empty_input() {
        let (segments, rest) = split_segments(b"", 65536);
        assert!(segments.is_empty());
        assert!(rest.is_empty());
    }

    #[test]
    #[should_panic(expected = "segment size must be positive")]
    fn zero_segment_size_panics() {
        let _ = split_segments(b"abc", 0);
    }

    proptest! {
        /// Segments followed by the remainder reproduce the input exactly
        #[test]
        fn concatenation_restores_input(
            data in proptest::collection::vec(any::<u8>(), 0..=4096),
            size in 1usize..=512,
        ) {
            let (segments, rest) = split_segments(&data, size);
            prop_assert!(segments.iter().all(|s| s.len() == size));
            prop_assert!(rest.len() < size);
            prop_assert_eq!(segments.len(), data.len() / size);

            let mut joined: Vec<u8> = segments.concat();
            joined.extend_from_slice(rest);
            prop_assert_eq!(joined, data);
        }
    }
}

//! Fixed-length token sequences with start/end sentinels.

/// Sequence length of the reference CLIP text encoder.
pub const DEFAULT_SEQUENCE_LENGTH: usize = 77;

/// Exactly `max_len` token ids: SOT, the encoded text, then EOT padding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenSequence(Vec<i32>);

impl TokenSequence {
    /// Take the first `max_len` elements of `[sot, ids.., eot, eot, ...]`.
    ///
    /// When the text plus sentinels does not fit, the tail is cut off and the
    /// closing EOT may be dropped along with it.
    pub fn build(token_ids: &[i32], sot: i32, eot: i32, max_len: usize) -> Self {
        let ids = std::iter::once(sot)
            .chain(token_ids.iter().copied())
            .chain(std::iter::repeat(eot))
            .take(max_len)
            .collect();
        Self(ids)
    }

    /// Number of ids (always the `max_len` it was built with).
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the sequence is empty (only when built with `max_len == 0`).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Token ids.
    pub fn as_slice(&self) -> &[i32] {
        &self.0
    }

    /// Consume into the id vector.
    pub fn into_vec(self) -> Vec<i32> {
        self.0
    }
}

impl AsRef<[i32]> for TokenSequence {
    fn as_ref(&self) -> &[i32] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOT: i32 = 49_406;
    const EOT: i32 = 49_407;

    #[test]
    fn short_text_is_padded_with_eot() {
        let ids = [10, 11, 12, 13, 14];
        let seq = TokenSequence::build(&ids, SOT, EOT, 77);
        let s = seq.as_slice();
        assert_eq!(s.len(), 77);
        assert_eq!(s[0], SOT);
        assert_eq!(&s[1..6], &ids);
        assert_eq!(s[6], EOT);
        assert!(s[7..].iter().all(|t| *t == EOT));
    }

    #[test]
    fn long_text_is_truncated() {
        let ids: Vec<i32> = (0..100).collect();
        let seq = TokenSequence::build(&ids, SOT, EOT, 77);
        assert_eq!(seq.len(), 77);
        assert_eq!(seq.as_slice()[0], SOT);
        assert_eq!(&seq.as_slice()[1..], &ids[..76]);
        assert!(!seq.as_slice().contains(&EOT));
    }

    #[test]
    fn exact_fit_keeps_eot() {
        let ids: Vec<i32> = (0..75).collect();
        let seq = TokenSequence::build(&ids, SOT, EOT, 77);
        assert_eq!(seq.as_slice()[76], EOT);
    }

    #[test]
    fn one_over_drops_eot() {
        let ids: Vec<i32> = (0..76).collect();
        let seq = TokenSequence::build(&ids, SOT, EOT, 77);
        assert_eq!(seq.as_slice()[76], 75);
    }

    #[test]
    fn empty_text_is_sot_then_eot() {
        let seq = TokenSequence::build(&[], SOT, EOT, 4);
        assert_eq!(seq.into_vec(), vec![SOT, EOT, EOT, EOT]);
    }

    #[test]
    fn zero_length() {
        let seq = TokenSequence::build(&[1, 2], SOT, EOT, 0);
        assert!(seq.is_empty());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn length_is_always_max_len(
                ids in proptest::collection::vec(0i32..49_000, 0..200),
                max_len in 1usize..128,
            ) {
                let seq = TokenSequence::build(&ids, SOT, EOT, max_len);
                prop_assert_eq!(seq.len(), max_len);
                prop_assert_eq!(seq.as_slice()[0], SOT);
            }

            #[test]
            fn prefix_is_preserved(
                ids in proptest::collection::vec(0i32..49_000, 0..200),
                max_len in 2usize..128,
            ) {
                let seq = TokenSequence::build(&ids, SOT, EOT, max_len);
                let kept = ids.len().min(max_len - 1);
                prop_assert_eq!(&seq.as_slice()[1..=kept], &ids[..kept]);
                prop_assert!(seq.as_slice()[kept + 1..].iter().all(|t| *t == EOT));
            }
        }
    }
}

//! CTC greedy decoding.

use ndarray::ArrayView3;

/// Greedy-decode per-frame logits into a token id sequence.
///
/// For each frame the argmax id is taken; blank frames emit nothing and
/// reset the collapse cursor, consecutive duplicates collapse to one
/// instance. A blank between two identical ids therefore lets the second
/// one through — the standard CTC collapse rule. Ids in `suppress`
/// (start/end sentinels for families that emit them) participate in the
/// collapse but are never emitted.
///
/// `logits` is `[batch, frames, vocab]`; only batch item 0 is decoded.
pub fn ctc_greedy_decode(
    logits: &ArrayView3<f32>,
    num_frames: usize,
    blank_id: i64,
    suppress: &[i64],
) -> Vec<i64> {
    let frames = num_frames.min(logits.shape()[1]);
    let vocab_size = logits.shape()[2];

    let mut ids = Vec::new();
    let mut previous = blank_id;

    for t in 0..frames {
        let mut best_id: i64 = 0;
        let mut best_val = f32::NEG_INFINITY;
        for v in 0..vocab_size {
            let val = logits[[0, t, v]];
            if val > best_val {
                best_val = val;
                best_id = v as i64;
            }
        }

        if best_id == blank_id {
            previous = blank_id;
            continue;
        }
        if best_id == previous {
            continue;
        }
        previous = best_id;

        if suppress.contains(&best_id) {
            continue;
        }
        ids.push(best_id);
    }

    ids
}

/// Filter a pre-decoded id sequence from a model that runs its own decoding
/// in-graph: drop blanks and suppressed sentinels, keep everything else.
pub fn filter_token_ids(
    ids: impl IntoIterator<Item = i64>,
    blank_id: i64,
    suppress: &[i64],
) -> Vec<i64> {
    ids.into_iter()
        .filter(|id| *id != blank_id && !suppress.contains(id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    /// Build [1, T, V] logits whose per-frame argmax follows `path`.
    fn logits_for(path: &[i64], vocab_size: usize) -> Array3<f32> {
        let mut logits = Array3::zeros((1, path.len(), vocab_size));
        for (t, &id) in path.iter().enumerate() {
            logits[[0, t, id as usize]] = 10.0;
        }
        logits
    }

    #[test]
    fn blank_resets_the_collapse() {
        let logits = logits_for(&[0, 5, 5, 0, 5], 8);
        let ids = ctc_greedy_decode(&logits.view(), 5, 0, &[]);
        assert_eq!(ids, vec![5, 5]);
    }

    #[test]
    fn pure_blanks_decode_to_nothing() {
        let logits = logits_for(&[0, 0, 0, 0], 8);
        let ids = ctc_greedy_decode(&logits.view(), 4, 0, &[]);
        assert!(ids.is_empty());
    }

    #[test]
    fn consecutive_duplicates_collapse() {
        let logits = logits_for(&[5, 5, 5, 6, 6], 8);
        let ids = ctc_greedy_decode(&logits.view(), 5, 0, &[]);
        assert_eq!(ids, vec![5, 6]);
    }

    #[test]
    fn suppressed_ids_are_dropped_but_still_collapse() {
        // 1 is a start sentinel: never emitted, but the repeat after it
        // still collapses
        let logits = logits_for(&[1, 1, 5, 0, 2], 8);
        let ids = ctc_greedy_decode(&logits.view(), 5, 0, &[1, 2]);
        assert_eq!(ids, vec![5]);
    }

    #[test]
    fn frame_limit_clamps_to_logits() {
        let logits = logits_for(&[5, 0, 6], 8);
        let ids = ctc_greedy_decode(&logits.view(), 100, 0, &[]);
        assert_eq!(ids, vec![5, 6]);
        let ids = ctc_greedy_decode(&logits.view(), 1, 0, &[]);
        assert_eq!(ids, vec![5]);
    }

    #[test]
    fn pre_decoded_ids_are_filtered() {
        let ids = filter_token_ids(vec![0, 3, 1, 4, 0, 2], 0, &[1, 2]);
        assert_eq!(ids, vec![3, 4]);
    }
}

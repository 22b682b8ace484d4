use crate::data::record::PatientRecord;
use crate::error::Result;

/// Applies the observation cutoff, then fits one channel to `max_len`.
///
/// Sequences longer than `max_len` keep their most recent `max_len` elements;
/// shorter ones are right-padded with `pad`.
pub fn fit_channel<T: Clone>(channel: &[T], cutoff: Option<usize>, max_len: usize, pad: T) -> Vec<T> {
    let end = cutoff.map_or(channel.len(), |c| c.min(channel.len()));
    let visible = &channel[..end];
    let start = visible.len().saturating_sub(max_len);

    let mut fitted = visible[start..].to_vec();
    fitted.resize(max_len, pad);
    fitted
}

/// Truncates and pads every channel of `record` in lockstep.
///
/// The event channel pads with `pad_token`, numeric channels with 0. Fails only
/// when the record's channels disagree on length.
pub fn truncate_and_pad(
    record: &PatientRecord,
    cutoff: Option<usize>,
    max_len: usize,
    pad_token: &str,
) -> Result<PatientRecord> {
    record.check_channels(0)?;

    let fit = |values: &[i64]| fit_channel(values, cutoff, max_len, 0);
    Ok(PatientRecord {
        event_tokens: fit_channel(&record.event_tokens, cutoff, max_len, pad_token.to_string()),
        type_tokens: fit(&record.type_tokens),
        age_tokens: fit(&record.age_tokens),
        time_tokens: fit(&record.time_tokens),
        visit_tokens: fit(&record.visit_tokens),
        position_tokens: fit(&record.position_tokens),
        ..record.clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const PAD: &str = "[PAD]";

    fn numbered(n: usize) -> PatientRecord {
        let mut record = PatientRecord::from_events((0..n).map(|i| format!("E{i}")));
        record.age_tokens = (0..n as i64).map(|i| 100 + i).collect();
        record.position_tokens = (0..n as i64).collect();
        record
    }

    #[test]
    fn test_pads_short_sequence() {
        let out = truncate_and_pad(&numbered(2), None, 4, PAD).unwrap();
        assert_eq!(out.event_tokens, vec!["E0", "E1", PAD, PAD]);
        assert_eq!(out.age_tokens, vec![100, 101, 0, 0]);
    }

    #[test]
    fn test_keeps_tail_of_long_sequence() {
        let out = truncate_and_pad(&numbered(6), None, 3, PAD).unwrap();
        assert_eq!(out.event_tokens, vec!["E3", "E4", "E5"]);
        assert_eq!(out.position_tokens, vec![3, 4, 5]);
    }

    #[test]
    fn test_cutoff_applies_before_length_policy() {
        // cutoff 4 keeps E0..E3, then the tail of length 2 survives
        let out = truncate_and_pad(&numbered(6), Some(4), 2, PAD).unwrap();
        assert_eq!(out.event_tokens, vec!["E2", "E3"]);

        let out = truncate_and_pad(&numbered(3), Some(10), 4, PAD).unwrap();
        assert_eq!(out.event_tokens, vec!["E0", "E1", "E2", PAD]);
    }

    #[test]
    fn test_zero_max_len_and_empty_input() {
        let out = truncate_and_pad(&numbered(5), None, 0, PAD).unwrap();
        assert!(out.event_tokens.is_empty());
        assert!(out.age_tokens.is_empty());

        let out = truncate_and_pad(&numbered(0), None, 3, PAD).unwrap();
        assert_eq!(out.event_tokens, vec![PAD; 3]);
        assert_eq!(out.time_tokens, vec![0; 3]);
    }

    #[test]
    fn test_keeps_supervision_fields() {
        let record = numbered(2).with_label(1).with_task_label("c0", 0);
        let out = truncate_and_pad(&record, None, 4, PAD).unwrap();
        assert_eq!(out.label, Some(1));
        assert_eq!(out.task_labels.get("c0"), Some(&0));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_every_channel_has_max_len(n in 0usize..40, max_len in 0usize..40, cutoff in proptest::option::of(0usize..50)) {
            let out = truncate_and_pad(&numbered(n), cutoff, max_len, PAD).unwrap();
            prop_assert_eq!(out.check_channels(0).unwrap(), max_len);
        }

        #[test]
        fn prop_channels_stay_aligned(n in 0usize..40, max_len in 1usize..40, cutoff in proptest::option::of(0usize..50)) {
            let out = truncate_and_pad(&numbered(n), cutoff, max_len, PAD).unwrap();
            for (i, event) in out.event_tokens.iter().enumerate() {
                if event == PAD {
                    prop_assert_eq!(out.age_tokens[i], 0);
                } else {
                    let original: i64 = event[1..].parse().unwrap();
                    prop_assert_eq!(out.position_tokens[i], original);
                    prop_assert_eq!(out.age_tokens[i], 100 + original);
                }
            }
        }

        #[test]
        fn prop_long_input_is_tail(n in 1usize..60, max_len in 1usize..30) {
            let record = numbered(n);
            let out = truncate_and_pad(&record, None, max_len, PAD).unwrap();
            if n > max_len {
                prop_assert_eq!(&out.event_tokens[..], &record.event_tokens[n - max_len..]);
            } else {
                prop_assert_eq!(&out.event_tokens[..n], &record.event_tokens[..]);
                prop_assert!(out.event_tokens[n..].iter().all(|t| t == PAD));
            }
        }

        #[test]
        fn prop_idempotent(n in 0usize..40, max_len in 0usize..40) {
            let once = truncate_and_pad(&numbered(n), None, max_len, PAD).unwrap();
            let twice = truncate_and_pad(&once, None, max_len, PAD).unwrap();
            prop_assert_eq!(once, twice);
        }
    }
}

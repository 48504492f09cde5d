//! Pairing of peaks and valleys into twitches

use crate::peaks::{too_few_peaks_or_valleys, PeakValleyIndices};
use myo_core::{MyoError, MyoResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One analysable contraction, identified by its peak sample index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Twitch {
    pub peak: usize,
    /// Absent only for the very first peak of the trace
    pub prior_peak: Option<usize>,
    pub prior_valley: usize,
    pub subsequent_peak: usize,
    pub subsequent_valley: usize,
}

/// Twitches keyed by peak index, in trace order
pub type TwitchMap = BTreeMap<usize, Twitch>;

/// Build the twitch map after checking that peaks and valleys alternate.
///
/// A peak becomes a twitch only when a valley precedes it and both a peak
/// and a valley follow it.
pub fn find_twitch_indices(indices: &PeakValleyIndices) -> MyoResult<TwitchMap> {
    too_few_peaks_or_valleys(&indices.peaks, &indices.valleys)?;
    let peaks = &indices.peaks;
    let valleys = &indices.valleys;

    let starts_with_peak = peaks[0] < valleys[0];
    check_alternation(peaks, valleys, starts_with_peak)?;

    let mut twitches = TwitchMap::new();
    for (i, &peak) in peaks.iter().enumerate().take(peaks.len() - 1) {
        if i == 0 && starts_with_peak {
            continue;
        }
        let (prior_valley, subsequent_valley) = if starts_with_peak {
            (valleys[i - 1], valleys[i])
        } else {
            (valleys[i], valleys[i + 1])
        };
        twitches.insert(
            peak,
            Twitch {
                peak,
                prior_peak: i.checked_sub(1).map(|p| peaks[p]),
                prior_valley,
                subsequent_peak: peaks[i + 1],
                subsequent_valley,
            },
        );
    }
    Ok(twitches)
}

/// Walk both lists in index order, failing on the first repeated kind
fn check_alternation(peaks: &[usize], valleys: &[usize], starts_with_peak: bool) -> MyoResult<()> {
    let (mut pi, mut vi) = if starts_with_peak { (1, 0) } else { (0, 1) };
    let mut prev_is_peak = starts_with_peak;

    while pi < peaks.len() && vi < valleys.len() {
        if prev_is_peak {
            if valleys[vi] > peaks[pi] {
                return Err(MyoError::TwoPeaksInARow {
                    first: peaks[pi - 1],
                    second: peaks[pi],
                });
            }
            vi += 1;
        } else {
            if valleys[vi] < peaks[pi] {
                return Err(MyoError::TwoValleysInARow {
                    first: valleys[vi - 1],
                    second: valleys[vi],
                });
            }
            pi += 1;
        }
        prev_is_peak = !prev_is_peak;
    }

    // at most one unmatched extremum may trail
    if pi + 1 < peaks.len() {
        return Err(MyoError::TwoPeaksInARow {
            first: peaks[pi],
            second: peaks[pi + 1],
        });
    }
    if vi + 1 < valleys.len() {
        return Err(MyoError::TwoValleysInARow {
            first: valleys[vi],
            second: valleys[vi + 1],
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use myo_core::ExtremumKind;

    fn pv(peaks: &[usize], valleys: &[usize]) -> PeakValleyIndices {
        PeakValleyIndices::new(peaks.to_vec(), valleys.to_vec())
    }

    #[test]
    fn test_starts_with_valley() {
        let twitches = find_twitch_indices(&pv(&[10, 30, 50, 70], &[0, 20, 40, 60, 80])).unwrap();
        assert_eq!(twitches.keys().copied().collect::<Vec<_>>(), vec![10, 30, 50]);
        assert_eq!(
            twitches[&10],
            Twitch {
                peak: 10,
                prior_peak: None,
                prior_valley: 0,
                subsequent_peak: 30,
                subsequent_valley: 20,
            }
        );
        assert_eq!(twitches[&50].prior_peak, Some(30));
        assert_eq!(twitches[&50].subsequent_valley, 60);
    }

    #[test]
    fn test_starts_with_peak_skips_first() {
        let twitches = find_twitch_indices(&pv(&[5, 25, 45, 65], &[15, 35, 55])).unwrap();
        assert_eq!(twitches.keys().copied().collect::<Vec<_>>(), vec![25, 45]);
        let t = twitches[&25];
        assert_eq!(t.prior_peak, Some(5));
        assert_eq!(t.prior_valley, 15);
        assert_eq!(t.subsequent_peak, 45);
        assert_eq!(t.subsequent_valley, 35);
    }

    #[test]
    fn test_two_peaks_in_a_row_at_start() {
        let err = find_twitch_indices(&pv(&[0, 1, 4, 8, 12], &[2, 6, 10])).unwrap_err();
        assert_eq!(err, MyoError::TwoPeaksInARow { first: 0, second: 1 });
    }

    #[test]
    fn test_two_valleys_in_a_row() {
        let err = find_twitch_indices(&pv(&[10, 40, 60], &[0, 20, 25, 50])).unwrap_err();
        assert_eq!(err, MyoError::TwoValleysInARow { first: 20, second: 25 });
    }

    #[test]
    fn test_trailing_peaks_detected() {
        let err = find_twitch_indices(&pv(&[10, 30, 50, 55], &[0, 20, 40])).unwrap_err();
        assert_eq!(err, MyoError::TwoPeaksInARow { first: 50, second: 55 });
    }

    #[test]
    fn test_trailing_valleys_detected() {
        let err = find_twitch_indices(&pv(&[10, 30, 50], &[0, 20, 40, 60, 65])).unwrap_err();
        assert_eq!(err, MyoError::TwoValleysInARow { first: 60, second: 65 });
    }

    #[test]
    fn test_too_few_reported_before_alternation() {
        let err = find_twitch_indices(&pv(&[1, 2], &[0, 5, 9])).unwrap_err();
        assert_eq!(err, MyoError::too_few(ExtremumKind::Peak, 2, 3));
    }
}

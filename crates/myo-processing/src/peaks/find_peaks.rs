//! Local-maximum search with height, distance, prominence and width filters
//!
//! Filters run in the order height → distance → prominence → width, each
//! one only seeing the peaks that survived the previous one. Widths are
//! measured at half prominence with linearly interpolated intersection
//! points.

/// Relative height at which peak widths are measured
pub const WIDTH_REL_HEIGHT: f64 = 0.5;

/// Selection criteria; `None` disables a filter
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PeakCriteria {
    /// Minimum peak value
    pub height: Option<f64>,
    /// Minimum horizontal distance in samples between neighbouring peaks
    pub distance: Option<f64>,
    pub prominence: Option<f64>,
    /// Inclusive (min, max) width in samples
    pub width: Option<(f64, f64)>,
}

/// Accepted peaks and the properties the filters computed for them
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FoundPeaks {
    pub indices: Vec<usize>,
    pub prominences: Vec<f64>,
    pub left_bases: Vec<usize>,
    pub right_bases: Vec<usize>,
    pub widths: Vec<f64>,
    pub width_heights: Vec<f64>,
    pub left_ips: Vec<f64>,
    pub right_ips: Vec<f64>,
}

impl FoundPeaks {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Drop the entry at `i` from every populated property
    pub fn remove(&mut self, i: usize) {
        self.indices.remove(i);
        for v in [
            &mut self.prominences,
            &mut self.widths,
            &mut self.width_heights,
            &mut self.left_ips,
            &mut self.right_ips,
        ] {
            if i < v.len() {
                v.remove(i);
            }
        }
        for v in [&mut self.left_bases, &mut self.right_bases] {
            if i < v.len() {
                v.remove(i);
            }
        }
    }

    fn retain(&mut self, keep: &[bool]) {
        fn filter<T: Copy>(v: &mut Vec<T>, keep: &[bool]) {
            if v.len() == keep.len() {
                let mut k = keep.iter();
                v.retain(|_| *k.next().unwrap_or(&false));
            }
        }
        filter(&mut self.prominences, keep);
        filter(&mut self.left_bases, keep);
        filter(&mut self.right_bases, keep);
        filter(&mut self.widths, keep);
        filter(&mut self.width_heights, keep);
        filter(&mut self.left_ips, keep);
        filter(&mut self.right_ips, keep);
        filter(&mut self.indices, keep);
    }
}

/// Find peaks in `x` matching `criteria`
pub fn find_peaks(x: &[f64], criteria: &PeakCriteria) -> FoundPeaks {
    let mut found = FoundPeaks {
        indices: local_maxima(x),
        ..FoundPeaks::default()
    };

    if let Some(hmin) = criteria.height {
        let keep: Vec<bool> = found.indices.iter().map(|&p| x[p] >= hmin).collect();
        found.retain(&keep);
    }

    if let Some(distance) = criteria.distance {
        let keep = select_by_distance(x, &found.indices, distance);
        found.retain(&keep);
    }

    if criteria.prominence.is_some() || criteria.width.is_some() {
        let (prominences, left_bases, right_bases) = peak_prominences(x, &found.indices);
        found.prominences = prominences;
        found.left_bases = left_bases;
        found.right_bases = right_bases;
    }

    if let Some(pmin) = criteria.prominence {
        let keep: Vec<bool> = found.prominences.iter().map(|&p| p >= pmin).collect();
        found.retain(&keep);
    }

    if let Some((wmin, wmax)) = criteria.width {
        let widths = peak_widths(x, &found, WIDTH_REL_HEIGHT);
        found.widths = widths.widths;
        found.width_heights = widths.heights;
        found.left_ips = widths.left_ips;
        found.right_ips = widths.right_ips;
        let keep: Vec<bool> = found.widths.iter().map(|&w| wmin <= w && w <= wmax).collect();
        found.retain(&keep);
    }

    found
}

/// Indices of local maxima; flat tops report their (floored) midpoint.
pub fn local_maxima(x: &[f64]) -> Vec<usize> {
    let n = x.len();
    let mut midpoints = Vec::new();
    if n < 3 {
        return midpoints;
    }
    let i_max = n - 1;
    let mut i = 1;
    while i < i_max {
        if x[i - 1] < x[i] {
            let mut i_ahead = i + 1;
            while i_ahead < i_max && x[i_ahead] == x[i] {
                i_ahead += 1;
            }
            if x[i_ahead] < x[i] {
                midpoints.push((i + i_ahead - 1) / 2);
                i = i_ahead;
            }
        }
        i += 1;
    }
    midpoints
}

/// Greedy suppression of lower peaks closer than `distance` to a higher one
fn select_by_distance(x: &[f64], peaks: &[usize], distance: f64) -> Vec<bool> {
    let n = peaks.len();
    let distance = distance.ceil().max(1.0) as usize;
    let mut keep = vec![true; n];

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| x[peaks[a]].total_cmp(&x[peaks[b]]));

    for &j in order.iter().rev() {
        if !keep[j] {
            continue;
        }
        let mut k = j;
        while k > 0 && peaks[j] - peaks[k - 1] < distance {
            keep[k - 1] = false;
            k -= 1;
        }
        let mut k = j + 1;
        while k < n && peaks[k] - peaks[j] < distance {
            keep[k] = false;
            k += 1;
        }
    }
    keep
}

/// Topographic prominence of each peak with its left and right bases
pub fn peak_prominences(x: &[f64], peaks: &[usize]) -> (Vec<f64>, Vec<usize>, Vec<usize>) {
    let n = x.len();
    let mut prominences = Vec::with_capacity(peaks.len());
    let mut left_bases = Vec::with_capacity(peaks.len());
    let mut right_bases = Vec::with_capacity(peaks.len());

    for &peak in peaks {
        let height = x[peak];

        let mut left_base = peak;
        let mut left_min = height;
        let mut i = peak as isize;
        while i >= 0 && x[i as usize] <= height {
            if x[i as usize] < left_min {
                left_min = x[i as usize];
                left_base = i as usize;
            }
            i -= 1;
        }

        let mut right_base = peak;
        let mut right_min = height;
        let mut i = peak;
        while i < n && x[i] <= height {
            if x[i] < right_min {
                right_min = x[i];
                right_base = i;
            }
            i += 1;
        }

        prominences.push(height - left_min.max(right_min));
        left_bases.push(left_base);
        right_bases.push(right_base);
    }

    (prominences, left_bases, right_bases)
}

/// Widths and interpolated intersection points of each peak
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PeakWidths {
    pub widths: Vec<f64>,
    pub heights: Vec<f64>,
    pub left_ips: Vec<f64>,
    pub right_ips: Vec<f64>,
}

/// Measure peak widths at `rel_height` of each peak's prominence.
///
/// `found` must carry prominences and bases for its peaks.
pub fn peak_widths(x: &[f64], found: &FoundPeaks, rel_height: f64) -> PeakWidths {
    let mut out = PeakWidths::default();
    for (k, &peak) in found.indices.iter().enumerate() {
        let i_min = found.left_bases[k];
        let i_max = found.right_bases[k];
        let height = x[peak] - found.prominences[k] * rel_height;

        let mut i = peak;
        while i_min < i && height < x[i] {
            i -= 1;
        }
        let mut left_ip = i as f64;
        if x[i] < height {
            left_ip += (height - x[i]) / (x[i + 1] - x[i]);
        }

        let mut i = peak;
        while i < i_max && height < x[i] {
            i += 1;
        }
        let mut right_ip = i as f64;
        if x[i] < height {
            right_ip -= (height - x[i]) / (x[i - 1] - x[i]);
        }

        out.widths.push(right_ip - left_ip);
        out.heights.push(height);
        out.left_ips.push(left_ip);
        out.right_ips.push(right_ip);
    }
    out
}

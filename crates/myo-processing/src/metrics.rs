//! Twitch metric catalogue and per-well statistics
//!
//! Every metric is computed per twitch from the force waveform and the
//! twitch map, then summarised across the well. Times are reported in
//! seconds; amplitudes in the waveform's unit. Undefined values are `None`,
//! never zero.

use crate::twitch::{Twitch, TwitchMap};
use myo_core::{config_error, MyoError, MyoResult, Waveform};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Percent levels used for both twitch velocities
const VELOCITY_PERCENTS: (u32, u32) = (10, 90);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    TwitchPeriod,
    FractionOfMaxAmplitude,
    Amplitude,
    AreaUnderCurve,
    TwitchFrequency,
    ContractionVelocity,
    RelaxationVelocity,
    IrregularityInterval,
    BaselineToPeak,
    PeakToBaseline,
    Width,
    RelaxationTime,
    ContractionTime,
}

impl MetricKind {
    /// Report order
    pub const ALL: [MetricKind; 13] = [
        MetricKind::TwitchPeriod,
        MetricKind::FractionOfMaxAmplitude,
        MetricKind::Amplitude,
        MetricKind::AreaUnderCurve,
        MetricKind::TwitchFrequency,
        MetricKind::ContractionVelocity,
        MetricKind::RelaxationVelocity,
        MetricKind::IrregularityInterval,
        MetricKind::BaselineToPeak,
        MetricKind::PeakToBaseline,
        MetricKind::Width,
        MetricKind::RelaxationTime,
        MetricKind::ContractionTime,
    ];

    pub fn all() -> &'static [MetricKind] {
        &Self::ALL
    }

    /// Report label; by-width metrics carry a `{}` placeholder for the percent
    pub fn display_name(self) -> &'static str {
        match self {
            MetricKind::TwitchPeriod => "Twitch Period (seconds)",
            MetricKind::FractionOfMaxAmplitude => "Fraction of Maximum Active Twitch Force (μN)",
            MetricKind::Amplitude => "Active Twitch Force (μN)",
            MetricKind::AreaUnderCurve => "Energy (μJ)",
            MetricKind::TwitchFrequency => "Twitch Frequency (Hz)",
            MetricKind::ContractionVelocity => "Twitch Contraction Velocity (μN/second)",
            MetricKind::RelaxationVelocity => "Twitch Relaxation Velocity (μN/second)",
            MetricKind::IrregularityInterval => "Twitch Interval Irregularity (seconds)",
            MetricKind::BaselineToPeak => "Time From Baseline to Peak (seconds)",
            MetricKind::PeakToBaseline => "Time From Peak to Baseline (seconds)",
            MetricKind::Width => "Twitch Width {} (seconds)",
            MetricKind::RelaxationTime => "Time From Peak to Relaxation {} (seconds)",
            MetricKind::ContractionTime => "Time From Contraction {} to Peak (seconds)",
        }
    }

    /// Display name with the percent filled in for by-width metrics
    pub fn label(self, percent: Option<u32>) -> String {
        match percent {
            Some(p) => self.display_name().replace("{}", &p.to_string()),
            None => self.display_name().replace(" {}", ""),
        }
    }

    pub fn is_by_width(self) -> bool {
        matches!(self, MetricKind::Width | MetricKind::RelaxationTime | MetricKind::ContractionTime)
    }

    /// Stable identifier used by report consumers
    pub fn uuid(self) -> Uuid {
        Uuid::from_u128(match self {
            MetricKind::TwitchPeriod => 0x6e0cd81c_7861_4c49_ba14_87b2739d65fb,
            MetricKind::FractionOfMaxAmplitude => 0x8fe142e2_2504_4c9e_b3dc_817b24c7447e,
            MetricKind::Amplitude => 0x89cf1105_a015_434f_b527_4169b9400e26,
            MetricKind::AreaUnderCurve => 0xe7b9a6e4_c43d_4e8b_af7e_51742e252030,
            MetricKind::TwitchFrequency => 0x472d0707_ff87_4198_9374_c28900bb216c,
            MetricKind::ContractionVelocity => 0x73961e7c_17ec_42b0_b503_a23195ec249c,
            MetricKind::RelaxationVelocity => 0x0fcc0dc3_f9aa_4f1b_91b3_e5b5924279a9,
            MetricKind::IrregularityInterval => 0x61046076_66b9_4b8b_bfec_1e00603743c0,
            MetricKind::BaselineToPeak => 0x03ce2d30_3580_4129_9913_2fc2e35eddb7,
            MetricKind::PeakToBaseline => 0x1ac2589d_4713_41c0_8dd0_1e6c98600e37,
            MetricKind::Width => 0xc4c60d55_017a_4783_9600_f19606de26f3,
            MetricKind::RelaxationTime => 0x0ad56cd1_7bcc_4b57_8076_14366d7f3c6a,
            MetricKind::ContractionTime => 0x33b5b0a8_f197_46ef_a451_a254e530757b,
        })
    }

    pub fn from_uuid(id: Uuid) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.uuid() == id)
    }
}

/// A (time in seconds, amplitude) point on the waveform
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub time: f64,
    pub amplitude: f64,
}

/// By-width value with the interval endpoints it was measured between
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WidthValue {
    pub value: f64,
    pub rising: Coordinates,
    pub falling: Coordinates,
}

/// Which metrics to compute and at which percent levels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSettings {
    pub metrics: BTreeSet<MetricKind>,
    pub twitch_width_percents: Vec<u32>,
    /// (baseline-to-peak, peak-to-baseline) percent levels
    pub baseline_widths: (u32, u32),
    /// Round reported values to the nearest integer
    pub rounded: bool,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        MetricsSettings {
            metrics: MetricKind::ALL.iter().copied().collect(),
            twitch_width_percents: default_twitch_width_percents(),
            baseline_widths: (10, 90),
            rounded: false,
        }
    }
}

/// 10, 15, ..., 90
pub fn default_twitch_width_percents() -> Vec<u32> {
    (10..=90).step_by(5).collect()
}

impl MetricsSettings {
    pub fn validate(&self) -> MyoResult<()> {
        if self.twitch_width_percents.is_empty() {
            return Err(config_error!("At least one twitch width percent is required"));
        }
        let percents = self
            .twitch_width_percents
            .iter()
            .chain([&self.baseline_widths.0, &self.baseline_widths.1]);
        for &p in percents {
            if p == 0 || p >= 100 {
                return Err(config_error!("Twitch width percents must lie in (0, 100), got {}", p));
            }
        }
        Ok(())
    }

    fn sorted_percents(&self) -> Vec<u32> {
        let unique: BTreeSet<u32> = self.twitch_width_percents.iter().copied().collect();
        unique.into_iter().collect()
    }

    fn round(&self, value: f64) -> f64 {
        if self.rounded {
            value.round()
        } else {
            value
        }
    }
}

/// All metrics of one twitch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwitchMetrics {
    pub peak_index: usize,
    /// Peak time in seconds
    pub peak_time: f64,
    pub scalars: BTreeMap<MetricKind, Option<f64>>,
    pub by_width: BTreeMap<MetricKind, BTreeMap<u32, WidthValue>>,
}

impl TwitchMetrics {
    pub fn scalar(&self, kind: MetricKind) -> Option<f64> {
        self.scalars.get(&kind).copied().flatten()
    }

    pub fn width_value(&self, kind: MetricKind, percent: u32) -> Option<f64> {
        self.by_width.get(&kind)?.get(&percent).map(|w| w.value)
    }
}

/// Summary statistics of one metric across a well's twitches.
///
/// Every field except `n` is `None` when no twitch has a defined value.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AggregateStats {
    pub n: usize,
    pub mean: Option<f64>,
    /// Sample standard deviation
    pub stdev: Option<f64>,
    /// Coefficient of variation, stdev / mean
    pub cov: Option<f64>,
    /// Standard error of the mean
    pub sem: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl AggregateStats {
    /// Statistics over the finite entries of `values`
    pub fn from_values<I>(values: I) -> Self
    where
        I: IntoIterator<Item = Option<f64>>,
    {
        let defined: Vec<f64> = values.into_iter().flatten().filter(|v| v.is_finite()).collect();
        let n = defined.len();
        if n == 0 {
            return AggregateStats::default();
        }

        let mean = defined.iter().sum::<f64>() / n as f64;
        let min = defined.iter().copied().fold(f64::INFINITY, f64::min);
        let max = defined.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let stdev = (n > 1).then(|| {
            let ss: f64 = defined.iter().map(|v| (v - mean).powi(2)).sum();
            (ss / (n - 1) as f64).sqrt()
        });
        let cov = stdev.and_then(|s| (mean != 0.0).then(|| s / mean));
        let sem = stdev.map(|s| s / (n as f64).sqrt());

        AggregateStats {
            n,
            mean: Some(mean),
            stdev,
            cov,
            sem,
            min: Some(min),
            max: Some(max),
        }
    }

    fn rounded(self) -> Self {
        let r = |v: Option<f64>| v.map(f64::round);
        AggregateStats {
            mean: r(self.mean),
            stdev: r(self.stdev),
            sem: r(self.sem),
            min: r(self.min),
            max: r(self.max),
            ..self
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AggregateTable {
    pub scalars: BTreeMap<MetricKind, AggregateStats>,
    pub by_width: BTreeMap<MetricKind, BTreeMap<u32, AggregateStats>>,
}

/// Per-twitch records and their well-level summary
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricsTable {
    pub per_twitch: Vec<TwitchMetrics>,
    pub aggregate: AggregateTable,
}

impl MetricsTable {
    pub fn twitch_count(&self) -> usize {
        self.per_twitch.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Flank {
    Rising,
    Falling,
}

/// Geometry of one twitch on the waveform
struct TwitchShape<'a> {
    waveform: &'a Waveform,
    twitch: &'a Twitch,
}

impl<'a> TwitchShape<'a> {
    fn point(&self, index: usize) -> Coordinates {
        Coordinates {
            time: self.waveform.time_seconds(index),
            amplitude: self.waveform.values()[index],
        }
    }

    fn peak(&self) -> Coordinates {
        self.point(self.twitch.peak)
    }

    /// Straight line between the flanking valleys, evaluated at `time`
    fn baseline_at(&self, time: f64) -> f64 {
        let a = self.point(self.twitch.prior_valley);
        let b = self.point(self.twitch.subsequent_valley);
        a.amplitude + (time - a.time) / (b.time - a.time) * (b.amplitude - a.amplitude)
    }

    fn amplitude(&self) -> f64 {
        let peak = self.peak();
        peak.amplitude - self.baseline_at(peak.time)
    }

    /// Trapezoidal area above the valley-to-valley baseline
    fn area_under_curve(&self) -> f64 {
        let (start, end) = (self.twitch.prior_valley, self.twitch.subsequent_valley);
        (start..end)
            .map(|i| {
                let (a, b) = (self.point(i), self.point(i + 1));
                let ya = a.amplitude - self.baseline_at(a.time);
                let yb = b.amplitude - self.baseline_at(b.time);
                0.5 * (ya + yb) * (b.time - a.time)
            })
            .sum()
    }

    /// Point where the flank crosses `percent` of the way down from the peak
    /// towards that flank's valley, linearly interpolated between samples.
    fn crossing(&self, flank: Flank, percent: u32) -> Coordinates {
        let values = self.waveform.values();
        let peak = self.twitch.peak;
        let valley = match flank {
            Flank::Rising => self.twitch.prior_valley,
            Flank::Falling => self.twitch.subsequent_valley,
        };
        let threshold = values[peak] - percent as f64 / 100.0 * (values[peak] - values[valley]);

        let bracket = match flank {
            Flank::Rising => (valley..peak).rev().find(|&j| values[j] <= threshold).map(|j| (j, j + 1)),
            Flank::Falling => (peak + 1..=valley).find(|&j| values[j] <= threshold).map(|j| (j - 1, j)),
        };
        match bracket {
            Some((lo, hi)) => {
                let (a, b) = (self.point(lo), self.point(hi));
                let time = if b.amplitude == a.amplitude {
                    a.time
                } else {
                    a.time + (threshold - a.amplitude) / (b.amplitude - a.amplitude) * (b.time - a.time)
                };
                Coordinates { time, amplitude: threshold }
            }
            None => self.point(valley),
        }
    }
}

/// Crossings of one twitch, computed once per (flank, percent)
struct CrossingCache<'a> {
    shape: TwitchShape<'a>,
    cache: BTreeMap<(Flank, u32), Coordinates>,
}

impl<'a> CrossingCache<'a> {
    fn new(shape: TwitchShape<'a>) -> Self {
        CrossingCache {
            shape,
            cache: BTreeMap::new(),
        }
    }

    fn get(&mut self, flank: Flank, percent: u32) -> Coordinates {
        let shape = &self.shape;
        *self
            .cache
            .entry((flank, percent))
            .or_insert_with(|| shape.crossing(flank, percent))
    }

    fn width(&mut self, percent: u32) -> WidthValue {
        let rising = self.get(Flank::Rising, percent);
        let falling = self.get(Flank::Falling, percent);
        WidthValue {
            value: falling.time - rising.time,
            rising,
            falling,
        }
    }

    fn contraction_time(&mut self, percent: u32) -> WidthValue {
        let rising = self.get(Flank::Rising, 100 - percent);
        let peak = self.shape.peak();
        WidthValue {
            value: peak.time - rising.time,
            rising,
            falling: peak,
        }
    }

    fn relaxation_time(&mut self, percent: u32) -> WidthValue {
        let falling = self.get(Flank::Falling, percent);
        let peak = self.shape.peak();
        WidthValue {
            value: falling.time - peak.time,
            rising: peak,
            falling,
        }
    }

    fn velocity(&mut self, flank: Flank) -> Option<f64> {
        let a = self.get(flank, VELOCITY_PERCENTS.0);
        let b = self.get(flank, VELOCITY_PERCENTS.1);
        let dt = b.time - a.time;
        (dt != 0.0).then(|| ((b.amplitude - a.amplitude) / dt).abs())
    }
}

/// Compute the requested metrics for every twitch and their statistics
pub fn compute_metrics(waveform: &Waveform, twitches: &TwitchMap, settings: &MetricsSettings) -> MyoResult<MetricsTable> {
    settings.validate()?;
    check_indices(waveform, twitches)?;

    let wants = |kind: MetricKind| settings.metrics.contains(&kind);
    let percents = settings.sorted_percents();
    let ordered: Vec<&Twitch> = twitches.values().collect();

    let amplitudes: Vec<f64> = ordered
        .iter()
        .map(|t| TwitchShape { waveform, twitch: t }.amplitude())
        .collect();
    let max_amplitude = amplitudes.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let mut per_twitch = Vec::with_capacity(ordered.len());
    for (k, twitch) in ordered.iter().enumerate() {
        let shape = TwitchShape { waveform, twitch };
        let peak = shape.peak();
        let period = waveform.time_seconds(twitch.subsequent_peak) - peak.time;
        let mut scalars: BTreeMap<MetricKind, Option<f64>> = BTreeMap::new();

        if wants(MetricKind::TwitchPeriod) {
            scalars.insert(MetricKind::TwitchPeriod, Some(settings.round(period)));
        }
        if wants(MetricKind::TwitchFrequency) {
            scalars.insert(MetricKind::TwitchFrequency, Some(settings.round(1.0 / period)));
        }
        if wants(MetricKind::Amplitude) {
            scalars.insert(MetricKind::Amplitude, Some(settings.round(amplitudes[k])));
        }
        if wants(MetricKind::FractionOfMaxAmplitude) {
            let fraction = (max_amplitude > 0.0).then(|| amplitudes[k] / max_amplitude);
            scalars.insert(MetricKind::FractionOfMaxAmplitude, fraction);
        }
        if wants(MetricKind::AreaUnderCurve) {
            scalars.insert(MetricKind::AreaUnderCurve, Some(settings.round(shape.area_under_curve())));
        }
        if wants(MetricKind::IrregularityInterval) {
            let interior = k > 0 && k + 1 < ordered.len();
            let value = twitch.prior_peak.filter(|_| interior).map(|prior| {
                let previous = peak.time - waveform.time_seconds(prior);
                settings.round((period - previous).abs())
            });
            scalars.insert(MetricKind::IrregularityInterval, value);
        }

        let mut crossings = CrossingCache::new(shape);
        if wants(MetricKind::ContractionVelocity) {
            let v = crossings.velocity(Flank::Rising).map(|v| settings.round(v));
            scalars.insert(MetricKind::ContractionVelocity, v);
        }
        if wants(MetricKind::RelaxationVelocity) {
            let v = crossings.velocity(Flank::Falling).map(|v| settings.round(v));
            scalars.insert(MetricKind::RelaxationVelocity, v);
        }
        if wants(MetricKind::BaselineToPeak) {
            let v = crossings.contraction_time(settings.baseline_widths.0).value;
            scalars.insert(MetricKind::BaselineToPeak, Some(settings.round(v)));
        }
        if wants(MetricKind::PeakToBaseline) {
            let v = crossings.relaxation_time(settings.baseline_widths.1).value;
            scalars.insert(MetricKind::PeakToBaseline, Some(settings.round(v)));
        }

        let mut by_width: BTreeMap<MetricKind, BTreeMap<u32, WidthValue>> = BTreeMap::new();
        for kind in [MetricKind::Width, MetricKind::RelaxationTime, MetricKind::ContractionTime] {
            if !wants(kind) {
                continue;
            }
            let entries = percents
                .iter()
                .map(|&p| {
                    let mut w = match kind {
                        MetricKind::Width => crossings.width(p),
                        MetricKind::RelaxationTime => crossings.relaxation_time(p),
                        _ => crossings.contraction_time(p),
                    };
                    w.value = settings.round(w.value);
                    (p, w)
                })
                .collect();
            by_width.insert(kind, entries);
        }

        per_twitch.push(TwitchMetrics {
            peak_index: twitch.peak,
            peak_time: peak.time,
            scalars,
            by_width,
        });
    }

    let aggregate = aggregate_metrics(&per_twitch, settings, &percents);
    Ok(MetricsTable { per_twitch, aggregate })
}

fn aggregate_metrics(per_twitch: &[TwitchMetrics], settings: &MetricsSettings, percents: &[u32]) -> AggregateTable {
    let finish = |stats: AggregateStats| if settings.rounded { stats.rounded() } else { stats };
    let mut table = AggregateTable::default();
    for &kind in settings.metrics.iter() {
        if kind.is_by_width() {
            let levels = percents
                .iter()
                .map(|&p| {
                    let stats = AggregateStats::from_values(per_twitch.iter().map(|t| t.width_value(kind, p)));
                    (p, finish(stats))
                })
                .collect();
            table.by_width.insert(kind, levels);
        } else {
            let stats = AggregateStats::from_values(per_twitch.iter().map(|t| t.scalar(kind)));
            // fractions are never rounded
            let stats = if kind == MetricKind::FractionOfMaxAmplitude { stats } else { finish(stats) };
            table.scalars.insert(kind, stats);
        }
    }
    table
}

fn check_indices(waveform: &Waveform, twitches: &TwitchMap) -> MyoResult<()> {
    let len = waveform.len();
    for t in twitches.values() {
        let indices = [Some(t.peak), t.prior_peak, Some(t.prior_valley), Some(t.subsequent_peak), Some(t.subsequent_valley)];
        if let Some(bad) = indices.into_iter().flatten().find(|&i| i >= len) {
            return Err(MyoError::InvalidWaveform {
                reason: format!("twitch at {} refers to sample {} beyond {} samples", t.peak, bad, len),
            });
        }
        if !(t.prior_valley < t.peak && t.peak < t.subsequent_valley && t.peak < t.subsequent_peak) {
            return Err(MyoError::InvalidWaveform {
                reason: format!("twitch at {} is not bracketed by its valleys", t.peak),
            });
        }
    }
    Ok(())
}

//! Digital noise filters for magnetic recordings
//!
//! Bessel and Butterworth designs realised as cascades of second-order
//! sections via the bilinear transform, applied zero-phase (forward then
//! backward) so twitch timing is not shifted.

use myo_core::{format_error, MyoError, MyoResult, Waveform};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Analog prototype poles (upper half plane) for a 4th-order Bessel filter,
/// normalised so the phase response matches at the cutoff.
const BESSEL4_POLES: [(f64, f64); 2] = [
    (-0.995_208_764_35, 1.257_105_739_45),
    (-1.370_067_830_55, 0.410_249_717_63),
];

const FILTER_ORDER: usize = 4;

/// Filter family of a noise filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterFamily {
    Bessel,
    Butterworth,
}

/// Frequency response of a noise filter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FilterResponse {
    Lowpass { cutoff_hz: f64 },
    Highpass { cutoff_hz: f64 },
    Bandpass { low_hz: f64, high_hz: f64 },
}

/// The fixed noise filters known to the instrument, keyed by UUID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NoiseFilter {
    BesselBandpass,
    BesselLowpass10,
    BesselLowpass30,
    ButterworthLowpass30,
}

impl NoiseFilter {
    pub const ALL: [NoiseFilter; 4] = [
        NoiseFilter::BesselBandpass,
        NoiseFilter::BesselLowpass10,
        NoiseFilter::BesselLowpass30,
        NoiseFilter::ButterworthLowpass30,
    ];

    pub fn uuid(self) -> Uuid {
        let bytes = match self {
            NoiseFilter::BesselBandpass => 0x0ecf0e52_0a29_453f_a6ff_46f5ec3ae783_u128,
            NoiseFilter::BesselLowpass10 => 0x7d64cac3_b841_4912_b734_c0cf20a81e7a_u128,
            NoiseFilter::BesselLowpass30 => 0xeee66c75_4dc4_4eb4_8d48_6c608bf28d91_u128,
            NoiseFilter::ButterworthLowpass30 => 0xde8d8cef_65bf_4119_ada7_bdecbbaa897a_u128,
        };
        Uuid::from_u128(bytes)
    }

    pub fn from_uuid(id: Uuid) -> MyoResult<Self> {
        NoiseFilter::ALL
            .into_iter()
            .find(|f| f.uuid() == id)
            .ok_or_else(|| format_error!("unknown noise filter UUID {}", id))
    }

    pub fn family(self) -> FilterFamily {
        match self {
            NoiseFilter::ButterworthLowpass30 => FilterFamily::Butterworth,
            _ => FilterFamily::Bessel,
        }
    }

    pub fn response(self) -> FilterResponse {
        match self {
            NoiseFilter::BesselBandpass => FilterResponse::Bandpass { low_hz: 0.1, high_hz: 10.0 },
            NoiseFilter::BesselLowpass10 => FilterResponse::Lowpass { cutoff_hz: 10.0 },
            NoiseFilter::BesselLowpass30 | NoiseFilter::ButterworthLowpass30 => {
                FilterResponse::Lowpass { cutoff_hz: 30.0 }
            }
        }
    }

    /// Design the filter for a sampling period in microseconds
    pub fn design(self, sampling_period_us: f64) -> MyoResult<SosFilter> {
        SosFilter::design(self.family(), self.response(), 1e6 / sampling_period_us)
    }
}

/// Default noise filter for a Beta 1 tissue sampling period
pub fn default_filter_for_sampling_period(sampling_period_us: u64) -> MyoResult<NoiseFilter> {
    match sampling_period_us {
        9600 => Ok(NoiseFilter::BesselLowpass10),
        1600 => Ok(NoiseFilter::ButterworthLowpass30),
        other => Err(format_error!(
            "no default noise filter for tissue sampling period {} µs",
            other
        )),
    }
}

/// Single biquad section (2nd order), transposed direct form II
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadSection {
    // y[n] = b0*x[n] + b1*x[n-1] + b2*x[n-2] - a1*y[n-1] - a2*y[n-2]
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl BiquadSection {
    /// Gain at DC, H(z = 1)
    pub fn dc_gain(&self) -> f64 {
        (self.b0 + self.b1 + self.b2) / (1.0 + self.a1 + self.a2)
    }

    /// State that makes a constant input `x` produce a constant output
    fn steady_state(&self, x: f64) -> [f64; 2] {
        let y = x * self.dc_gain();
        let z2 = self.b2 * x - self.a2 * y;
        let z1 = self.b1 * x - self.a1 * y + z2;
        [z1, z2]
    }

    fn process(&self, input: &mut [f64], mut state: [f64; 2]) {
        for sample in input.iter_mut() {
            let x = *sample;
            let y = self.b0 * x + state[0];
            state[0] = self.b1 * x - self.a1 * y + state[1];
            state[1] = self.b2 * x - self.a2 * y;
            *sample = y;
        }
    }

    fn bilinear(num: [f64; 3], a1s: f64, a0s: f64, k: f64) -> Self {
        let k2 = k * k;
        let d = k2 + a1s * k + a0s;
        BiquadSection {
            b0: num[0] / d,
            b1: num[1] / d,
            b2: num[2] / d,
            a1: (2.0 * a0s - 2.0 * k2) / d,
            a2: (k2 - a1s * k + a0s) / d,
        }
    }
}

/// Cascade of second-order sections
#[derive(Debug, Clone, PartialEq)]
pub struct SosFilter {
    sections: Vec<BiquadSection>,
}

impl SosFilter {
    pub fn new(sections: Vec<BiquadSection>) -> Self {
        SosFilter { sections }
    }

    pub fn sections(&self) -> &[BiquadSection] {
        &self.sections
    }

    /// Design a 4th-order filter of the given family and response
    pub fn design(family: FilterFamily, response: FilterResponse, fs: f64) -> MyoResult<Self> {
        let poles = prototype_poles(family);
        let sections = match response {
            FilterResponse::Lowpass { cutoff_hz } => lowpass_sections(&poles, cutoff_hz, fs)?,
            FilterResponse::Highpass { cutoff_hz } => highpass_sections(&poles, cutoff_hz, fs)?,
            FilterResponse::Bandpass { low_hz, high_hz } => {
                if low_hz >= high_hz {
                    return Err(MyoError::InvalidConfiguration {
                        message: format!("band-pass low edge {} Hz not below high edge {} Hz", low_hz, high_hz),
                    });
                }
                let mut sections = highpass_sections(&poles, low_hz, fs)?;
                sections.extend(lowpass_sections(&poles, high_hz, fs)?);
                sections
            }
        };
        Ok(SosFilter { sections })
    }

    /// Single forward pass from rest
    pub fn filter(&self, input: &[f64]) -> Vec<f64> {
        let mut out = input.to_vec();
        for section in &self.sections {
            section.process(&mut out, [0.0, 0.0]);
        }
        out
    }

    /// Forward pass starting from the steady state for a constant `x0` input
    fn filter_from_steady_state(&self, data: &mut [f64]) {
        let Some(&x0) = data.first() else {
            return;
        };
        let mut level = x0;
        for section in &self.sections {
            let state = section.steady_state(level);
            section.process(data, state);
            level *= section.dc_gain();
        }
    }

    /// Samples of odd extension added on each side before zero-phase filtering
    pub fn pad_length(&self) -> usize {
        let trailing_zero_b = self.sections.iter().filter(|s| s.b2 == 0.0).count();
        let trailing_zero_a = self.sections.iter().filter(|s| s.a2 == 0.0).count();
        let ntaps = 2 * self.sections.len() + 1 - trailing_zero_b.min(trailing_zero_a);
        3 * ntaps
    }

    /// Zero-phase filtering: forward and backward passes over an
    /// odd-extended copy of the input.
    pub fn filtfilt(&self, input: &[f64]) -> Vec<f64> {
        let n = input.len();
        if n < 2 || self.sections.is_empty() {
            return input.to_vec();
        }
        let pad = self.pad_length().min(n - 1);

        let mut ext = Vec::with_capacity(n + 2 * pad);
        let (first, last) = (input[0], input[n - 1]);
        ext.extend((1..=pad).rev().map(|i| 2.0 * first - input[i]));
        ext.extend_from_slice(input);
        ext.extend((1..=pad).map(|i| 2.0 * last - input[n - 1 - i]));

        self.filter_from_steady_state(&mut ext);
        ext.reverse();
        self.filter_from_steady_state(&mut ext);
        ext.reverse();

        ext[pad..pad + n].to_vec()
    }

    /// Zero-phase filter a waveform, keeping its time axis
    pub fn apply(&self, waveform: &Waveform) -> MyoResult<Waveform> {
        waveform.with_values(self.filtfilt(waveform.values()))
    }
}

fn prototype_poles(family: FilterFamily) -> Vec<(f64, f64)> {
    match family {
        FilterFamily::Bessel => BESSEL4_POLES.to_vec(),
        FilterFamily::Butterworth => (1..=FILTER_ORDER / 2)
            .map(|k| {
                let theta = std::f64::consts::PI * (2 * k - 1) as f64 / (2 * FILTER_ORDER) as f64;
                (-theta.sin(), theta.cos())
            })
            .collect(),
    }
}

fn prewarp(cutoff_hz: f64, fs: f64) -> MyoResult<(f64, f64)> {
    if !(cutoff_hz > 0.0) || cutoff_hz >= fs / 2.0 {
        return Err(MyoError::InvalidConfiguration {
            message: format!(
                "cutoff {} Hz must lie between 0 and the Nyquist frequency {} Hz",
                cutoff_hz,
                fs / 2.0
            ),
        });
    }
    let k = 2.0 * fs;
    let wc = k * (std::f64::consts::PI * cutoff_hz / fs).tan();
    Ok((k, wc))
}

fn lowpass_sections(poles: &[(f64, f64)], cutoff_hz: f64, fs: f64) -> MyoResult<Vec<BiquadSection>> {
    let (k, wc) = prewarp(cutoff_hz, fs)?;
    Ok(poles
        .iter()
        .map(|&(re, im)| {
            let mag2 = re * re + im * im;
            let a1s = -2.0 * re * wc;
            let a0s = mag2 * wc * wc;
            BiquadSection::bilinear([a0s, 2.0 * a0s, a0s], a1s, a0s, k)
        })
        .collect())
}

fn highpass_sections(poles: &[(f64, f64)], cutoff_hz: f64, fs: f64) -> MyoResult<Vec<BiquadSection>> {
    let (k, wc) = prewarp(cutoff_hz, fs)?;
    let k2 = k * k;
    Ok(poles
        .iter()
        .map(|&(re, im)| {
            let mag2 = re * re + im * im;
            let a1s = -2.0 * re * wc / mag2;
            let a0s = wc * wc / mag2;
            BiquadSection::bilinear([k2, -2.0 * k2, k2], a1s, a0s, k)
        })
        .collect())
}

//! Second-order IIR section (RBJ cookbook high-pass / low-pass)

use std::f64::consts::PI;

/// Butterworth Q for a single section
pub const DEFAULT_Q: f32 = 0.707;

/// Response of one biquad section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    HighPass,
    LowPass,
}

/// Normalized biquad coefficients (a0 divided out)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoefficients {
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    pub a1: f32,
    pub a2: f32,
}

impl BiquadCoefficients {
    /// Pass-through section
    pub const IDENTITY: Self = Self {
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
    };

    /// Compute coefficients for `kind` at `cutoff_hz`
    ///
    /// Computed in f64 and stored as f32. Cutoff and Q are not validated;
    /// callers clamp them into a usable range first.
    pub fn new(kind: FilterKind, cutoff_hz: f32, sample_rate: u32, q: f32) -> Self {
        let w0 = 2.0 * PI * cutoff_hz as f64 / sample_rate.max(1) as f64;
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / (2.0 * q as f64);

        let (b0, b1, b2) = match kind {
            FilterKind::HighPass => {
                let b = (1.0 + cos_w0) / 2.0;
                (b, -(1.0 + cos_w0), b)
            }
            FilterKind::LowPass => {
                let b = (1.0 - cos_w0) / 2.0;
                (b, 1.0 - cos_w0, b)
            }
        };
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha;

        Self {
            b0: (b0 / a0) as f32,
            b1: (b1 / a0) as f32,
            b2: (b2 / a0) as f32,
            a1: (a1 / a0) as f32,
            a2: (a2 / a0) as f32,
        }
    }
}

impl Default for BiquadCoefficients {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// One biquad section processed in transposed direct form II
///
/// State persists across calls: a section filters a continuous stream, not
/// isolated buffers.
#[derive(Debug, Clone, Copy, Default)]
pub struct BiquadFilter {
    coeffs: BiquadCoefficients,
    z1: f32,
    z2: f32,
}

impl BiquadFilter {
    /// Create a pass-through section
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configured section with zeroed state
    pub fn with_response(kind: FilterKind, cutoff_hz: f32, sample_rate: u32, q: f32) -> Self {
        Self {
            coeffs: BiquadCoefficients::new(kind, cutoff_hz, sample_rate, q),
            z1: 0.0,
            z2: 0.0,
        }
    }

    /// Recompute coefficients
    ///
    /// State is left untouched; call [`reset`](Self::reset) afterwards to
    /// avoid a transient from the old response.
    pub fn configure(&mut self, kind: FilterKind, cutoff_hz: f32, sample_rate: u32, q: f32) {
        self.coeffs = BiquadCoefficients::new(kind, cutoff_hz, sample_rate, q);
    }

    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }

    #[inline]
    pub fn process_sample(&mut self, x: f32) -> f32 {
        let c = &self.coeffs;
        let y = c.b0 * x + self.z1;
        self.z1 = c.b1 * x - c.a1 * y + self.z2;
        self.z2 = c.b2 * x - c.a2 * y;
        y
    }

    /// Filter a block in place
    pub fn process(&mut self, samples: &mut [f32]) {
        for sample in samples.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }

    pub fn coefficients(&self) -> BiquadCoefficients {
        self.coeffs
    }

    /// Internal state (z1, z2)
    pub fn state(&self) -> (f32, f32) {
        (self.z1, self.z2)
    }
}

//! Sea-Bird sensor equations and raw-count scaling.

use crate::calibration::{
    ConductivityCoefficients, OxygenCoefficients, PressureCoefficients, TemperatureCoefficients,
};

const KELVIN_OFFSET: f64 = 273.15;
const PSI_TO_DBAR: f64 = 0.689_475_9;
const ATMOSPHERE_PSI: f64 = 14.7;
const SIEMENS_PER_METER_TO_MS_PER_CM: f64 = 10.0;

const FREQUENCY_COUNTS_PER_HZ: f64 = 256.0;
const VOLTAGE_FULL_SCALE: f64 = 5.0;
const VOLTAGE_COUNTS: f64 = 4095.0;

/// 24-bit frequency word to Hz.
pub fn raw_to_frequency(raw: u64) -> f64 {
    raw as f64 / FREQUENCY_COUNTS_PER_HZ
}

/// 12-bit voltage word to volts. The A/D counts down from full scale.
pub fn raw_to_volts(raw: u64) -> f64 {
    VOLTAGE_FULL_SCALE * (1.0 - raw as f64 / VOLTAGE_COUNTS)
}

/// Rounds half-to-even at `scale` decimal places.
pub fn round_to(value: f64, scale: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let factor = 10f64.powi(scale as i32);
    (value * factor).round_ties_even() / factor
}

impl TemperatureCoefficients {
    /// ITS-90 temperature (°C) from sensor frequency (Hz).
    pub fn temperature(&self, frequency_hz: f64) -> f64 {
        let x = (self.f0 / frequency_hz).ln();
        1.0 / (self.g + self.h * x + self.i * x.powi(2) + self.j * x.powi(3)) - KELVIN_OFFSET
    }
}

impl ConductivityCoefficients {
    /// Conductivity in mS/cm from frequency (Hz), temperature (°C) and pressure (dbar).
    pub fn conductivity(&self, frequency_hz: f64, temperature: f64, pressure: f64) -> f64 {
        let f = frequency_hz / 1000.0;
        let siemens_per_meter = (self.g + self.h * f.powi(2) + self.i * f.powi(3) + self.j * f.powi(4))
            / (10.0 * (1.0 + self.ct_cor * temperature + self.cp_cor * pressure));
        siemens_per_meter * SIEMENS_PER_METER_TO_MS_PER_CM
    }
}

impl PressureCoefficients {
    /// Compensation temperature (°C) from the raw AD590 word.
    pub fn compensation_temperature(&self, raw_p_temp: u64) -> f64 {
        self.ad590m * raw_p_temp as f64 + self.ad590b
    }

    /// Pressure in dbar from frequency (Hz) and the raw AD590 word.
    pub fn pressure(&self, frequency_hz: f64, raw_p_temp: u64) -> f64 {
        let f = frequency_hz / 1e6;
        let t = self.compensation_temperature(raw_p_temp);

        let c = self.c1 + self.c2 * t + self.c3 * t.powi(2);
        let d = self.d1 + self.d2 * t;
        let t0 = self.t1 + self.t2 * t + self.t3 * t.powi(2) + self.t4 * t.powi(3);
        let w = 1.0 - t0 * t0 * f * f;

        PSI_TO_DBAR * (c * w * (1.0 - d * w) - ATMOSPHERE_PSI)
    }
}

impl OxygenCoefficients {
    /// SBE 43 hysteresis correction over a whole cast.
    ///
    /// `volts` and `pressure` are per-scan and must be the same length; `sample_rate_hz`
    /// is the scan rate the recursion steps at.
    pub fn hysteresis_corrected(&self, volts: &[f64], pressure: &[f64], sample_rate_hz: f64) -> Vec<f64> {
        let len = volts.len().min(pressure.len());
        let mut corrected = Vec::with_capacity(len);
        if len == 0 {
            return corrected;
        }

        let dt = 1.0 / sample_rate_hz;
        let c = (-dt / self.h3).exp();
        let shifted: Vec<f64> = volts[..len].iter().map(|v| v + self.offset).collect();

        let mut previous = shifted[0];
        corrected.push(previous - self.offset);
        for idx in 1..len {
            let d = 1.0 + self.h1 * ((pressure[idx] / self.h2).exp() - 1.0);
            let current = ((shifted[idx] + previous * c * d) - shifted[idx - 1] * c) / d;
            corrected.push(current - self.offset);
            previous = current;
        }
        corrected
    }
}

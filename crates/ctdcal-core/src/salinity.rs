//! Practical Salinity Scale 1978.
//!
//! Temperatures are ITS-90 and converted to IPTS-68 internally. Values below 2 are
//! returned from the base polynomial without the Hill low-salinity extension.

/// Conductivity of standard seawater (S = 35, t68 = 15 °C, p = 0) in mS/cm.
pub const C3515_MS_PER_CM: f64 = 42.914;

const T68_PER_T90: f64 = 1.00024;
const K: f64 = 0.0162;

const A: [f64; 6] = [0.0080, -0.1692, 25.3851, 14.0941, -7.0261, 2.7081];
const B: [f64; 6] = [0.0005, -0.0056, -0.0066, -0.0375, 0.0636, -0.0144];
const C: [f64; 5] = [0.676_609_7, 2.005_64e-2, 1.104_259e-4, -6.969_8e-7, 1.003_1e-9];
const D: [f64; 4] = [3.426e-2, 4.464e-4, 4.215e-1, -3.107e-3];
const E: [f64; 3] = [2.070e-5, -6.370e-10, 3.989e-15];

fn poly(coeffs: &[f64], x: f64) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

fn salinity_from_rt(rt: f64, t68: f64) -> f64 {
    if rt.is_nan() || rt < 0.0 {
        return f64::NAN;
    }
    let root = rt.sqrt();
    let ft = (t68 - 15.0) / (1.0 + K * (t68 - 15.0));
    poly(&A, root) + ft * poly(&B, root)
}

/// Practical salinity from in-situ conductivity (mS/cm), temperature (°C) and pressure (dbar).
pub fn sp_from_c(conductivity: f64, temperature: f64, pressure: f64) -> f64 {
    let t68 = temperature * T68_PER_T90;
    let r = conductivity / C3515_MS_PER_CM;

    let rt_lc = poly(&C, t68);
    let rp = 1.0
        + pressure * (E[0] + E[1] * pressure + E[2] * pressure * pressure)
            / (1.0 + D[0] * t68 + D[1] * t68 * t68 + (D[2] + D[3] * t68) * r);
    let rt = r / (rp * rt_lc);

    salinity_from_rt(rt, t68)
}

/// Practical salinity from a salinometer conductivity ratio measured at bath temperature `temperature` (°C).
pub fn sp_salinometer(rt: f64, temperature: f64) -> f64 {
    salinity_from_rt(rt, temperature * T68_PER_T90)
}

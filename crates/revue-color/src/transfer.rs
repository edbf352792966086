//! Transfer functions used by the builtin backend.
//!
//! Colour parameters name a transfer function as text (`"srgb"`,
//! `"rec709"`, `"pq"`, `"hlg"`, `"linear"`, `"gamma2.4"`). The builtin
//! backend bakes the chosen curve into 1D LUTs once per cache key.
#![allow(clippy::excessive_precision)]

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::data::ColourLut;
use crate::error::ColourError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TransferFunction {
    Linear,
    Srgb,
    Rec709,
    Pq,
    Hlg,
    Gamma(f32),
}

/// Which way a baked curve maps values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Encoded values to scene linear.
    ToLinear,
    /// Scene linear to encoded display values.
    FromLinear,
}

impl TransferFunction {
    pub fn to_linear(self, v: f32) -> f32 {
        match self {
            Self::Linear => v,
            Self::Srgb => {
                if v <= 0.04045 {
                    v / 12.92
                } else {
                    ((v + 0.055) / 1.055).powf(2.4)
                }
            }
            Self::Rec709 => {
                if v < 0.081 {
                    v / 4.5
                } else {
                    ((v + 0.099) / 1.099).powf(1.0 / 0.45)
                }
            }
            Self::Pq => pq_decode(v),
            Self::Hlg => hlg_decode(v),
            Self::Gamma(g) => v.max(0.0).powf(g),
        }
    }

    pub fn from_linear(self, v: f32) -> f32 {
        match self {
            Self::Linear => v,
            Self::Srgb => {
                if v <= 0.0031308 {
                    v * 12.92
                } else {
                    1.055 * v.powf(1.0 / 2.4) - 0.055
                }
            }
            Self::Rec709 => {
                if v < 0.018 {
                    v * 4.5
                } else {
                    1.099 * v.powf(0.45) - 0.099
                }
            }
            Self::Pq => pq_encode(v),
            Self::Hlg => hlg_encode(v),
            Self::Gamma(g) if g > 0.0 => v.max(0.0).powf(1.0 / g),
            Self::Gamma(_) => 0.0,
        }
    }

    /// Sample the curve over `[0, 1]` into a LUT, scaling every output by
    /// `gain`.
    pub fn bake(self, name: impl Into<String>, direction: Direction, size: usize, gain: f32) -> ColourLut {
        let size = size.max(2);
        let data = (0..size)
            .map(|i| {
                let x = i as f32 / (size - 1) as f32;
                let y = match direction {
                    Direction::ToLinear => self.to_linear(x),
                    Direction::FromLinear => self.from_linear(x),
                } * gain;
                [y, y, y]
            })
            .collect();
        ColourLut::new(name, data)
    }
}

impl FromStr for TransferFunction {
    type Err = ColourError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.as_str() {
            "linear" => Ok(Self::Linear),
            "srgb" => Ok(Self::Srgb),
            "rec709" | "bt1886" => Ok(Self::Rec709),
            "pq" | "st2084" => Ok(Self::Pq),
            "hlg" => Ok(Self::Hlg),
            other => other
                .strip_prefix("gamma")
                .and_then(|g| g.parse::<f32>().ok())
                .filter(|g| *g > 0.0)
                .map(Self::Gamma)
                .ok_or_else(|| ColourError::Compute(format!("unknown transfer function '{}'", s))),
        }
    }
}

impl fmt::Display for TransferFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Linear => write!(f, "linear"),
            Self::Srgb => write!(f, "srgb"),
            Self::Rec709 => write!(f, "rec709"),
            Self::Pq => write!(f, "pq"),
            Self::Hlg => write!(f, "hlg"),
            Self::Gamma(g) => write!(f, "gamma{}", g),
        }
    }
}

// ST.2084 constants
const PQ_M1: f32 = 0.1593017578125;
const PQ_M2: f32 = 78.84375;
const PQ_C1: f32 = 0.8359375;
const PQ_C2: f32 = 18.8515625;
const PQ_C3: f32 = 18.6875;

fn pq_encode(linear: f32) -> f32 {
    let ym1 = linear.max(0.0).powf(PQ_M1);
    ((PQ_C1 + PQ_C2 * ym1) / (1.0 + PQ_C3 * ym1)).powf(PQ_M2)
}

fn pq_decode(encoded: f32) -> f32 {
    let p = encoded.max(0.0).powf(1.0 / PQ_M2);
    let den = PQ_C2 - PQ_C3 * p;
    if den.abs() < 1e-10 {
        return 0.0;
    }
    ((p - PQ_C1).max(0.0) / den).powf(1.0 / PQ_M1)
}

// BT.2100 HLG constants
const HLG_A: f32 = 0.17883277;
const HLG_B: f32 = 0.28466892;
const HLG_C: f32 = 0.55991073;

fn hlg_encode(linear: f32) -> f32 {
    let e = linear.max(0.0);
    if e <= 1.0 / 12.0 {
        (3.0 * e).sqrt()
    } else {
        HLG_A * (12.0 * e - HLG_B).ln() + HLG_C
    }
}

fn hlg_decode(encoded: f32) -> f32 {
    let e = encoded.max(0.0);
    if e <= 0.5 {
        e * e / 3.0
    } else {
        ((e - HLG_C) / HLG_A).exp() / 12.0 + HLG_B / 12.0
    }
}

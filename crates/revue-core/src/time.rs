//! Time representation for frame-accurate playback.
//!
//! Uses rational numbers to avoid floating-point accumulation errors.
//! Timeline positions are `RationalTime` values in seconds; they order
//! totally, so they double as the keys of a frame/time map.

use num_rational::Rational64;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Mul, Sub};

use crate::error::{Result, RevueError};

/// A rational time value representing a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RationalTime {
    /// Time value as a rational number (seconds)
    value: Rational64,
}

impl RationalTime {
    /// Create a new RationalTime of `numerator / denominator` seconds.
    #[inline]
    pub fn new(numerator: i64, denominator: i64) -> Self {
        Self {
            value: Rational64::new(numerator, denominator),
        }
    }

    /// Create a RationalTime from a frame number and frame rate.
    #[inline]
    pub fn from_frames(frames: i64, rate: FrameRate) -> Self {
        Self {
            value: Rational64::new(frames * rate.denominator as i64, rate.numerator as i64),
        }
    }

    /// Convert to seconds as f64.
    #[inline]
    pub fn to_seconds_f64(self) -> f64 {
        *self.value.numer() as f64 / *self.value.denom() as f64
    }

    /// Number of whole frame periods of `rate` contained in this time.
    ///
    /// No rounding is applied: the result is floored towards negative
    /// infinity.
    #[inline]
    pub fn to_frames(self, rate: FrameRate) -> i64 {
        let frames = self.value * Rational64::new(rate.numerator as i64, rate.denominator as i64);
        frames.floor().to_integer()
    }

    /// Zero time constant.
    pub const ZERO: Self = Self {
        value: Rational64::new_raw(0, 1),
    };
}

impl Default for RationalTime {
    fn default() -> Self {
        Self::ZERO
    }
}

impl Add for RationalTime {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self {
            value: self.value + rhs.value,
        }
    }
}

impl Sub for RationalTime {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self {
            value: self.value - rhs.value,
        }
    }
}

impl Mul<i64> for RationalTime {
    type Output = Self;
    fn mul(self, rhs: i64) -> Self {
        Self {
            value: self.value * rhs,
        }
    }
}

impl fmt::Display for RationalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.to_seconds_f64())
    }
}

/// Frame rate as a rational number (e.g., 24000/1001 for 23.976 fps).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameRate {
    /// Numerator (e.g., 24000)
    pub numerator: u32,
    /// Denominator (e.g., 1001)
    pub denominator: u32,
}

impl FrameRate {
    /// Create a new frame rate.
    #[inline]
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Convert to frames per second as f64.
    #[inline]
    pub fn to_fps_f64(self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }

    /// Duration of a single frame.
    #[inline]
    pub fn frame_duration(self) -> RationalTime {
        RationalTime::new(self.denominator as i64, self.numerator as i64)
    }

    /// A rate with a zero term cannot describe a frame period.
    #[inline]
    pub fn is_valid(self) -> bool {
        self.numerator != 0 && self.denominator != 0
    }

    /// Nominal integer frame count per second, used for timecode display.
    #[inline]
    pub fn nominal_fps(self) -> i64 {
        (self.to_fps_f64().round() as i64).max(1)
    }

    pub const FPS_23_976: Self = Self::new(24000, 1001);
    pub const FPS_24: Self = Self::new(24, 1);
    pub const FPS_25: Self = Self::new(25, 1);
    pub const FPS_29_97: Self = Self::new(30000, 1001);
    pub const FPS_48: Self = Self::new(48, 1);
}

impl Default for FrameRate {
    fn default() -> Self {
        Self::FPS_24
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fps = self.to_fps_f64();
        if (fps - fps.round()).abs() < 0.001 {
            write!(f, "{} fps", fps.round() as u32)
        } else {
            write!(f, "{:.3} fps", fps)
        }
    }
}

/// A time range with inclusive start and exclusive end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: RationalTime,
    pub duration: RationalTime,
}

impl TimeRange {
    #[inline]
    pub fn new(start: RationalTime, duration: RationalTime) -> Self {
        Self { start, duration }
    }

    /// End time (exclusive).
    #[inline]
    pub fn end(self) -> RationalTime {
        self.start + self.duration
    }

    /// Check if a time is within this range.
    #[inline]
    pub fn contains(self, time: RationalTime) -> bool {
        time >= self.start && time < self.end()
    }
}

/// How timeline time advances across sections with differing native rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeSourceMode {
    /// Every frame of every section is shown for one period of the
    /// playback (override) rate.
    #[default]
    Fixed,
    /// Every section plays at its own native rate.
    Dynamic,
    /// Sections keep their native duration but are sampled at the
    /// playback (override) rate.
    Remapped,
}

/// SMPTE-style non-drop timecode, stored as a frame count at a rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timecode {
    frame: i64,
    rate: FrameRate,
}

impl Timecode {
    pub fn new(frame: i64, rate: FrameRate) -> Self {
        Self { frame, rate }
    }

    pub fn from_hmsf(hours: i64, minutes: i64, seconds: i64, frames: i64, rate: FrameRate) -> Self {
        let fps = rate.nominal_fps();
        Self {
            frame: ((hours * 60 + minutes) * 60 + seconds) * fps + frames,
            rate,
        }
    }

    /// Parse `HH:MM:SS:FF` (`;` is accepted as the frame separator).
    pub fn parse(text: &str, rate: FrameRate) -> Result<Self> {
        let fields: Vec<i64> = text
            .split([':', ';'])
            .map(|part| part.trim().parse::<i64>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| RevueError::InvalidParameter(format!("bad timecode '{}': {}", text, e)))?;

        match fields.as_slice() {
            [h, m, s, f] if *f < rate.nominal_fps() && *s < 60 && *m < 60 => {
                Ok(Self::from_hmsf(*h, *m, *s, *f, rate))
            }
            _ => Err(RevueError::InvalidParameter(format!(
                "bad timecode '{}'",
                text
            ))),
        }
    }

    /// Frames since `00:00:00:00`.
    pub fn frame(self) -> i64 {
        self.frame
    }

    pub fn rate(self) -> FrameRate {
        self.rate
    }
}

impl Default for Timecode {
    fn default() -> Self {
        Self::new(0, FrameRate::default())
    }
}

impl Add<i64> for Timecode {
    type Output = Self;
    fn add(self, frames: i64) -> Self {
        Self {
            frame: self.frame + frames,
            rate: self.rate,
        }
    }
}

impl fmt::Display for Timecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fps = self.rate.nominal_fps();
        let sign = if self.frame < 0 { "-" } else { "" };
        let total = self.frame.abs();
        let frames = total % fps;
        let seconds = (total / fps) % 60;
        let minutes = (total / (fps * 60)) % 60;
        let hours = total / (fps * 3600);
        write!(
            f,
            "{}{:02}:{:02}:{:02}:{:02}",
            sign, hours, minutes, seconds, frames
        )
    }
}

//! NTP time tags
//!
//! OSC time tags are 64-bit NTP timestamps: 32 bits of seconds since
//! 1 January 1900 UTC, 32 bits of binary fraction (1/2^32 s units).
//! The raw value 1 is the "immediately" sentinel and has no wall-clock
//! interpretation.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Seconds between the NTP epoch (1900) and the Unix epoch (1970)
const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

/// An OSC time tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeTag(u64);

impl TimeTag {
    /// The "immediately" sentinel
    pub const IMMEDIATE: TimeTag = TimeTag(1);

    /// Build a time tag from NTP seconds and fraction
    pub const fn new(seconds: u32, fraction: u32) -> Self {
        TimeTag(((seconds as u64) << 32) | fraction as u64)
    }

    /// Build a time tag from its raw 64-bit value
    pub const fn from_raw(raw: u64) -> Self {
        TimeTag(raw)
    }

    /// The raw 64-bit NTP value
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Seconds since the NTP epoch
    pub const fn seconds(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Fractional seconds in 1/2^32 s units
    pub const fn fraction(self) -> u32 {
        self.0 as u32
    }

    /// Whether this is the "immediately" sentinel
    pub const fn is_immediate(self) -> bool {
        self.0 == 1
    }

    /// The current wall-clock time as a time tag
    pub fn now() -> Self {
        SystemTime::now().into()
    }

    /// Convert to wall-clock time
    ///
    /// Returns `None` for the immediate sentinel and for tags before the
    /// Unix epoch, which `SystemTime` cannot represent portably here.
    pub fn to_system_time(self) -> Option<SystemTime> {
        if self.is_immediate() {
            return None;
        }
        let unix_secs = (self.seconds() as u64).checked_sub(NTP_UNIX_OFFSET)?;
        let nanos = fraction_to_nanos(self.fraction());
        Some(UNIX_EPOCH + Duration::new(unix_secs, nanos))
    }
}

impl From<SystemTime> for TimeTag {
    fn from(t: SystemTime) -> Self {
        // Times before 1970 clamp to the Unix epoch; OSC peers do not
        // exchange pre-epoch schedules.
        let since_unix = t.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);
        let seconds = (since_unix.as_secs() + NTP_UNIX_OFFSET) as u32;
        TimeTag::new(seconds, nanos_to_fraction(since_unix.subsec_nanos()))
    }
}

impl Default for TimeTag {
    fn default() -> Self {
        TimeTag::IMMEDIATE
    }
}

fn nanos_to_fraction(nanos: u32) -> u32 {
    (((nanos as u64) << 32) / 1_000_000_000) as u32
}

fn fraction_to_nanos(fraction: u32) -> u32 {
    (((fraction as u64) * 1_000_000_000) >> 32) as u32
}

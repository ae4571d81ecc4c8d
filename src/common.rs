use std::{ops::Deref, time::Duration};

/// Upper bound the admission script applies to the cost of a single call.
///
/// Costs above this are clamped server-side, so one call never admits more
/// than this many units.
pub const MAX_COST_PER_CALL: u64 = 100;

/// Outcome of one admission call.
///
/// Never persisted. On error no `Decision` is produced at all.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Decision {
    /// Whether the requested cost was admitted.
    pub allowed: bool,
    /// Cost units still admissible in the current window.
    pub remaining: u64,
    /// Minimum wait before a call could succeed. Zero when allowed or when no
    /// useful bound exists.
    pub retry_after: Duration,
}

impl Decision {
    /// Decision for an admitted call.
    pub fn allowed(remaining: u64) -> Self {
        Self {
            allowed: true,
            remaining,
            retry_after: Duration::ZERO,
        }
    }

    /// Decision for a rejected call.
    pub fn rejected(remaining: u64, retry_after: Duration) -> Self {
        Self {
            allowed: false,
            remaining,
            retry_after,
        }
    }
}

/// Maximum total cost admitted per window. Always greater than zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WindowLimit(u64);

impl Deref for WindowLimit {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<u64> for WindowLimit {
    type Error = String;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value == 0 {
            Err("Window limit must be greater than 0".to_string())
        } else {
            Ok(Self(value))
        }
    }
}

/// Sliding window length in milliseconds. At least 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WindowSizeMs(u64);

impl Deref for WindowSizeMs {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<u64> for WindowSizeMs {
    type Error = String;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value == 0 {
            Err("Window size must be at least 1ms".to_string())
        } else {
            Ok(Self(value))
        }
    }
}

impl TryFrom<Duration> for WindowSizeMs {
    type Error = String;

    fn try_from(value: Duration) -> Result<Self, Self::Error> {
        Self::try_from(duration_to_ms(value))
    }
}

/// Idle-key expiration in milliseconds, refreshed on every admission. At least 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyTtlMs(u64);

impl Deref for KeyTtlMs {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<u64> for KeyTtlMs {
    type Error = String;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value == 0 {
            Err("Key TTL must be at least 1ms".to_string())
        } else {
            Ok(Self(value))
        }
    }
}

impl TryFrom<Duration> for KeyTtlMs {
    type Error = String;

    fn try_from(value: Duration) -> Result<Self, Self::Error> {
        Self::try_from(duration_to_ms(value))
    }
}

impl From<WindowSizeMs> for KeyTtlMs {
    fn from(value: WindowSizeMs) -> Self {
        Self(*value)
    }
}

fn duration_to_ms(value: Duration) -> u64 {
    u64::try_from(value.as_millis()).unwrap_or(u64::MAX)
}

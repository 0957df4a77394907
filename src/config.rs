use crate::error::{LedgerError, Result};
use chrono::{FixedOffset, Offset, Utc};

/// Hours east of UTC of the time zone due dates are expressed in.
pub const DEFAULT_UTC_OFFSET_HOURS: i32 = 7;

/// Settings the engine needs at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Due dates fall on month starts in this offset.
    pub reference_offset: FixedOffset,
}

impl EngineConfig {
    pub fn with_offset_hours(hours: i32) -> Result<Self> {
        let reference_offset = hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                LedgerError::ValidationError(format!("UTC offset of {hours} hours is out of range"))
            })?;
        Ok(Self { reference_offset })
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        let reference_offset =
            FixedOffset::east_opt(DEFAULT_UTC_OFFSET_HOURS * 3600).unwrap_or_else(|| Utc.fix());
        Self { reference_offset }
    }
}

/// Options for the persistent store.
#[cfg(feature = "storage-rocksdb")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RocksDbConfig {
    /// How long a unit of work waits for a row lock before giving up.
    pub lock_timeout_ms: i64,
}

#[cfg(feature = "storage-rocksdb")]
impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_offset_is_utc_plus_seven() {
        assert_eq!(
            EngineConfig::default().reference_offset.local_minus_utc(),
            7 * 3600
        );
    }

    #[test]
    fn test_offset_range_is_checked() {
        assert!(EngineConfig::with_offset_hours(-5).is_ok());
        assert!(EngineConfig::with_offset_hours(30).is_err());
    }
}

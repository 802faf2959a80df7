use chrono::{DateTime, Utc};
use chrono_tz::Tz;

/// Time zone used to render timestamps in human-facing messages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DisplayZone {
    #[default]
    Utc,
    Named(Tz),
}

const FORMAT: &str = "%Y-%m-%d %H:%M:%S %Z";

impl DisplayZone {
    /// Parse an IANA zone id such as "America/New_York". `None` means UTC.
    pub fn parse(id: Option<&str>) -> Result<Self, String> {
        match id {
            None => Ok(DisplayZone::Utc),
            Some(id) => id
                .parse::<Tz>()
                .map(DisplayZone::Named)
                .map_err(|e| format!("unknown time zone {:?}: {}", id, e)),
        }
    }

    pub fn format(&self, timestamp: DateTime<Utc>) -> String {
        match self {
            DisplayZone::Utc => timestamp.format(FORMAT).to_string(),
            DisplayZone::Named(tz) => timestamp.with_timezone(tz).format(FORMAT).to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_named_zone_shifts_wall_clock() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        let zone = DisplayZone::parse(Some("America/New_York")).unwrap();
        assert_eq!(zone.format(ts), "2024-01-15 07:00:00 EST");
        assert_eq!(DisplayZone::Utc.format(ts), "2024-01-15 12:00:00 UTC");
    }

    #[test]
    fn test_unknown_zone_rejected() {
        assert!(DisplayZone::parse(Some("Mars/Olympus")).is_err());
    }
}

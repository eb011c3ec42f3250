use chrono::{DateTime, Utc};

/// Wall-clock milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    to_ms(Utc::now())
}

/// Milliseconds since the Unix epoch; zero before the epoch.
fn to_ms(dt: DateTime<Utc>) -> u64 {
    u64::try_from(dt.timestamp_millis()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_ms() {
        let t = DateTime::from_timestamp_millis(1_700_000_000_123).expect("valid");
        assert_eq!(to_ms(t), 1_700_000_000_123);
        let before = DateTime::from_timestamp_millis(-1_000).expect("valid");
        assert_eq!(to_ms(before), 0);
    }

    #[test]
    fn test_now_ms_is_recent() {
        // 2023-11-14 or later.
        assert!(now_ms() > 1_700_000_000_000);
    }
}

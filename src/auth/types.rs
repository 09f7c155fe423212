// Authentication types

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::models::api::{AuthResponse, DEFAULT_EXPIRES_IN};

/// Tokens as issued by the backend, lifetime relative to now
#[derive(Debug, Clone, PartialEq)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Lifetime in seconds
    pub expires_in: i64,
}

impl From<AuthResponse> for TokenSet {
    fn from(resp: AuthResponse) -> Self {
        Self {
            access_token: resp.access_token,
            refresh_token: resp.refresh_token,
            expires_in: resp.expires_in.unwrap_or(DEFAULT_EXPIRES_IN),
        }
    }
}

/// Session read back from storage
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSession {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Absolute expiry; `None` when missing or unreadable
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredSession {
    /// Seconds until expiry, recomputed on every call. Negative once expired,
    /// zero when no expiry is stored.
    pub fn expires_in(&self) -> i64 {
        self.expires_in_at(Utc::now())
    }

    pub fn expires_in_at(&self, now: DateTime<Utc>) -> i64 {
        self.remaining_ms_at(now).unwrap_or(0).div_euclid(1000)
    }

    /// Milliseconds until expiry; `None` when no expiry is stored
    pub fn remaining_ms_at(&self, now: DateTime<Utc>) -> Option<i64> {
        self.expires_at
            .map(|exp| exp.timestamp_millis() - now.timestamp_millis())
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.remaining_ms_at(now).map_or(true, |ms| ms <= 0)
    }
}

/// Absolute expiry for a lifetime starting now.
///
/// Lifetimes past chrono's range saturate at the representable bounds.
pub fn expiry_from_now(expires_in: i64) -> DateTime<Utc> {
    Duration::try_seconds(expires_in)
        .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
        .unwrap_or(if expires_in > 0 {
            DateTime::<Utc>::MAX_UTC
        } else {
            DateTime::<Utc>::MIN_UTC
        })
}

/// Encode an expiry the way it is persisted (epoch milliseconds)
pub fn encode_expiry(expires_at: DateTime<Utc>) -> String {
    expires_at.timestamp_millis().to_string()
}

/// Decode a persisted expiry; garbage decodes to `None`
pub fn decode_expiry(raw: &str) -> Option<DateTime<Utc>> {
    let millis: i64 = raw.trim().parse().ok()?;
    Utc.timestamp_millis_opt(millis).single()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(expires_at: Option<DateTime<Utc>>) -> StoredSession {
        StoredSession {
            access_token: "token".to_string(),
            refresh_token: None,
            expires_at,
        }
    }

    #[test]
    fn test_expires_in_counts_down() {
        let now = Utc::now();
        let s = session(Some(now + Duration::seconds(600)));
        assert_eq!(s.expires_in_at(now), 600);
        assert_eq!(s.expires_in_at(now + Duration::seconds(100)), 500);
    }

    #[test]
    fn test_expires_in_goes_negative() {
        let now = Utc::now();
        let s = session(Some(now - Duration::seconds(60)));
        assert_eq!(s.expires_in_at(now), -60);
        assert!(s.is_expired());
    }

    #[test]
    fn test_missing_expiry_is_expired() {
        let s = session(None);
        assert_eq!(s.expires_in(), 0);
        assert!(s.is_expired());
    }

    #[test]
    fn test_sub_second_remainder_is_not_expired() {
        let now = Utc::now();
        let s = session(Some(now + Duration::milliseconds(900)));
        assert_eq!(s.expires_in_at(now), 0);
        assert!(!s.is_expired_at(now));
        assert!(s.is_expired_at(now + Duration::milliseconds(900)));
    }

    #[test]
    fn test_expiry_from_now_saturates() {
        assert_eq!(expiry_from_now(i64::MAX), DateTime::<Utc>::MAX_UTC);
        assert_eq!(expiry_from_now(i64::MIN), DateTime::<Utc>::MIN_UTC);

        let far = expiry_from_now(i64::MAX);
        let stored = decode_expiry(&encode_expiry(far)).unwrap();
        assert_eq!(stored.timestamp_millis(), far.timestamp_millis());
        assert!(!session(Some(far)).is_expired());
        assert!(session(Some(expiry_from_now(i64::MIN))).is_expired());
    }

    #[test]
    fn test_expiry_encoding() {
        let exp = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        assert_eq!(encode_expiry(exp), "1700000000123");
        assert_eq!(decode_expiry("1700000000123"), Some(exp));
        assert_eq!(decode_expiry("not-a-number"), None);
        assert_eq!(decode_expiry(""), None);
    }

    #[test]
    fn test_token_set_default_lifetime() {
        let resp = AuthResponse {
            access_token: "abc".to_string(),
            refresh_token: None,
            expires_in: None,
            user: None,
        };
        let tokens = TokenSet::from(resp);
        assert_eq!(tokens.expires_in, DEFAULT_EXPIRES_IN);
    }
}

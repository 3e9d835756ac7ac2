use crate::{Error, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Months, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time as Unix seconds
pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// How a record's `value` is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    /// `value` is the destination URL
    Redirect,
    /// `value` is the payload itself
    InlineData,
    /// `value` is empty; the payload lives in the blob store
    BlobData,
}

impl RecordKind {
    /// Single-letter tag used in the metadata store
    pub fn as_tag(&self) -> &'static str {
        match self {
            RecordKind::Redirect => "R",
            RecordKind::InlineData => "D",
            RecordKind::BlobData => "S",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "R" => Some(RecordKind::Redirect),
            "D" => Some(RecordKind::InlineData),
            "S" => Some(RecordKind::BlobData),
            _ => None,
        }
    }

    /// True for the kinds that carry a paste rather than a URL
    pub fn is_data(&self) -> bool {
        matches!(self, RecordKind::InlineData | RecordKind::BlobData)
    }
}

/// Capability token proving ownership of a record.
///
/// 128 random bits, URL-safe base64 without padding. Compared by exact
/// string equality. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerToken(String);

impl OwnerToken {
    /// Wraps a token received from a caller (e.g. from a cookie)
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Draws a fresh token from the operating system CSPRNG
    pub fn generate() -> Result<Self> {
        let mut bytes = [0u8; 16];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| Error::RandomSource(e.to_string()))?;
        Ok(Self(URL_SAFE_NO_PAD.encode(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for OwnerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OwnerToken(..)")
    }
}

/// Durable metadata entry for one short code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub code: String,
    pub kind: RecordKind,
    pub value: String,
    /// Unix seconds; `None` leaves expiry to the backing store's default
    pub expires_at: Option<i64>,
    pub created_at: i64,
    pub creator_ip: String,
    pub owner: OwnerToken,
}

impl Record {
    /// Normalizes a raw expiry attribute: zero or negative means unset.
    pub fn normalize_expiry(raw: i64) -> Option<i64> {
        if raw > 0 {
            Some(raw)
        } else {
            None
        }
    }

    /// Whether the record's own expiry has passed at `now`.
    ///
    /// A record without an expiry never reports expired here.
    pub fn is_expired_at(&self, now: i64) -> bool {
        is_past(self.expires_at, now)
    }
}

pub(crate) fn is_past(expires_at: Option<i64>, now: i64) -> bool {
    match expires_at {
        Some(at) if at > 0 => now > at,
        _ => false,
    }
}

/// Lifetime choices offered to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    Day,
    Week,
    Month,
}

impl Lifetime {
    /// Absolute expiry, in Unix seconds, for a record created at `now`
    pub fn expires_at(&self, now: DateTime<Utc>) -> i64 {
        let expiry = match self {
            Lifetime::Day => now + Duration::days(1),
            Lifetime::Week => now + Duration::days(7),
            Lifetime::Month => now
                .checked_add_months(Months::new(1))
                .unwrap_or(now + Duration::days(31)),
        };
        expiry.timestamp()
    }

    /// Preferred first-round code length. Longer lifetimes occupy the
    /// namespace longer, so they start with longer codes.
    pub fn code_length(&self) -> usize {
        match self {
            Lifetime::Day => 4,
            Lifetime::Week => 5,
            Lifetime::Month => 6,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Lifetime::Day => "1d",
            Lifetime::Week => "1w",
            Lifetime::Month => "1m",
        }
    }
}

impl FromStr for Lifetime {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "1d" => Ok(Lifetime::Day),
            "1w" => Ok(Lifetime::Week),
            "1m" => Ok(Lifetime::Month),
            other => Err(Error::InvalidConfig(format!("unknown lifetime: {}", other))),
        }
    }
}

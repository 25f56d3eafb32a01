use crate::error::{CoreError, CoreResult};
use chrono::NaiveDate;
use serde::{Serialize, Serializer};
use std::fmt;
use std::ops::AddAssign;

/// Offering amount in integer cents. Emitted on the wire as `"123.45"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(i64);

/// Largest accepted offering for one session: 1,000,000,000.00.
pub const MAX_OFFERING_CENTS: i64 = 100_000_000_000;

/// Largest accepted visitor count for one session.
pub const MAX_VISITORS: i64 = 100_000;

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    pub fn cents(self) -> i64 {
        self.0
    }

    /// Accepts a JSON number or a decimal string. Negative amounts, more than
    /// two fractional digits and amounts above `MAX_OFFERING_CENTS` are rejected.
    pub fn parse_json(v: &serde_json::Value) -> CoreResult<Money> {
        if let Some(s) = v.as_str() {
            return Money::parse_str(s);
        }
        if let Some(n) = v.as_i64() {
            if n < 0 {
                return Err(CoreError::bad_params("offering must be >= 0"));
            }
            return n
                .checked_mul(100)
                .ok_or_else(too_large)
                .and_then(Money::within_limit);
        }
        let Some(f) = v.as_f64() else {
            return Err(CoreError::bad_params("offering must be a number or decimal string"));
        };
        if !f.is_finite() || f < 0.0 {
            return Err(CoreError::bad_params("offering must be >= 0"));
        }
        let scaled = f * 100.0;
        let cents = scaled.round();
        if (scaled - cents).abs() > 1e-6 {
            return Err(CoreError::bad_params(
                "offering must have at most two decimal places",
            ));
        }
        if cents > MAX_OFFERING_CENTS as f64 {
            return Err(too_large());
        }
        Money::within_limit(cents as i64)
    }

    fn within_limit(cents: i64) -> CoreResult<Money> {
        if cents > MAX_OFFERING_CENTS {
            return Err(too_large());
        }
        Ok(Money(cents))
    }

    pub fn parse_str(raw: &str) -> CoreResult<Money> {
        let t = raw.trim();
        let bad = || CoreError::bad_params(format!("offering is not a decimal amount: {}", raw));
        if t.starts_with('-') {
            return Err(CoreError::bad_params("offering must be >= 0"));
        }
        let (whole, frac) = match t.split_once('.') {
            Some((w, f)) => (w, f),
            None => (t, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(bad());
        }
        if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit())
        {
            return Err(bad());
        }
        if frac.len() > 2 {
            return Err(CoreError::bad_params(
                "offering must have at most two decimal places",
            ));
        }
        let whole_cents = if whole.is_empty() {
            0
        } else {
            whole
                .parse::<i64>()
                .ok()
                .and_then(|w| w.checked_mul(100))
                .ok_or_else(bad)?
        };
        let frac_cents = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().map_err(|_| bad())? * 10,
            _ => frac.parse::<i64>().map_err(|_| bad())?,
        };
        whole_cents
            .checked_add(frac_cents)
            .ok_or_else(too_large)
            .and_then(Money::within_limit)
    }
}

fn too_large() -> CoreError {
    CoreError::bad_params("offering must not exceed 1000000000.00")
        .with_details(serde_json::json!({ "maxOffering": Money(MAX_OFFERING_CENTS) }))
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
}

impl AttendanceStatus {
    /// Also accepts the Portuguese values used by older clients.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "present" | "presente" => Some(Self::Present),
            "absent" | "ausente" => Some(Self::Absent),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Absent => "absent",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub id: i64,
    pub student_id: String,
    pub class_group_id: String,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub brought_bible: bool,
    pub brought_magazine: bool,
}

impl AttendanceRecord {
    pub fn is_present(&self) -> bool {
        self.status == AttendanceStatus::Present
    }
}

/// Data shared by every attendee of one class group meeting on one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMeta {
    pub class_group_id: String,
    pub date: NaiveDate,
    pub offering: Option<Money>,
    pub visitor_count: i64,
}

impl SessionMeta {
    pub fn offering_or_zero(&self) -> Money {
        self.offering.unwrap_or(Money::ZERO)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassGroup {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub class_group_id: String,
    pub name: String,
}

pub fn parse_date(raw: &str, key: &str) -> CoreResult<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| CoreError::bad_params(format!("{} must be YYYY-MM-DD", key)))
}

use crate::error::{CoreError, CoreResult};
use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    Monthly,
    Quarterly,
    Yearly,
}

impl PeriodType {
    /// Accepts the English names and the `mensal`/`trimestral`/`anual` values
    /// stored by older clients.
    pub fn parse(s: &str) -> CoreResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "monthly" | "mensal" => Ok(Self::Monthly),
            "quarterly" | "trimestral" => Ok(Self::Quarterly),
            "yearly" | "anual" => Ok(Self::Yearly),
            _ => Err(CoreError::invalid_period_type(s)),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::Yearly => "yearly",
        }
    }
}

/// Inclusive date interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Period {
    pub label: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Period {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

const MONTH_LABELS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

const QUARTER_LABELS: [&str; 4] = ["Jan - Mar", "Apr - Jun", "Jul - Sep", "Oct - Dec"];

pub fn month_label(month: u32) -> &'static str {
    MONTH_LABELS
        .get(month.saturating_sub(1) as usize)
        .copied()
        .unwrap_or("?")
}

fn check_month(month: u32) -> CoreResult<()> {
    if (1..=12).contains(&month) {
        Ok(())
    } else {
        Err(CoreError::bad_params("month must be between 1 and 12")
            .with_details(serde_json::json!({ "month": month })))
    }
}

fn ymd(year: i32, month: u32, day: u32) -> CoreResult<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
        CoreError::bad_params("year is outside the supported calendar range")
            .with_details(serde_json::json!({ "year": year }))
    })
}

/// Last calendar day of the month, leap years included.
pub fn last_day_of_month(year: i32, month: u32) -> CoreResult<NaiveDate> {
    check_month(month)?;
    let first_of_next = if month == 12 {
        ymd(year + 1, 1, 1)
    } else {
        ymd(year, month + 1, 1)
    };
    match first_of_next.ok().and_then(|d| d.pred_opt()) {
        Some(d) => Ok(d),
        // December of the last representable year.
        None => ymd(year, month, 31),
    }
}

pub fn quarter_of_month(month: u32) -> u32 {
    (month.clamp(1, 12) - 1) / 3 + 1
}

pub fn month_period(year: i32, month: u32) -> CoreResult<Period> {
    check_month(month)?;
    Ok(Period {
        label: format!("{} {}", month_label(month), year),
        start: ymd(year, month, 1)?,
        end: last_day_of_month(year, month)?,
    })
}

pub fn quarter_period(year: i32, quarter: u32) -> CoreResult<Period> {
    if !(1..=4).contains(&quarter) {
        return Err(CoreError::bad_params("quarter must be between 1 and 4"));
    }
    let first_month = (quarter - 1) * 3 + 1;
    Ok(Period {
        label: QUARTER_LABELS[(quarter - 1) as usize].to_string(),
        start: ymd(year, first_month, 1)?,
        end: last_day_of_month(year, first_month + 2)?,
    })
}

pub fn year_period(year: i32) -> CoreResult<Period> {
    Ok(Period {
        label: format!("Year {}", year),
        start: ymd(year, 1, 1)?,
        end: ymd(year, 12, 31)?,
    })
}

/// Splits `year` into contiguous, non-overlapping periods covering Jan 1 to Dec 31.
pub fn partition(year: i32, period_type: PeriodType) -> CoreResult<Vec<Period>> {
    match period_type {
        PeriodType::Yearly => Ok(vec![year_period(year)?]),
        PeriodType::Quarterly => (1..=4).map(|q| quarter_period(year, q)).collect(),
        PeriodType::Monthly => (1..=12).map(|m| month_period(year, m)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn assert_covers_year(periods: &[Period], year: i32) {
        assert_eq!(periods.first().unwrap().start, d(year, 1, 1));
        assert_eq!(periods.last().unwrap().end, d(year, 12, 31));
        for pair in periods.windows(2) {
            assert!(pair[0].start <= pair[0].end);
            assert_eq!(pair[0].end.succ_opt().unwrap(), pair[1].start);
        }
    }

    #[test]
    fn quarterly_uses_real_month_ends() {
        for year in [2023, 2024, 2100] {
            let qs = partition(year, PeriodType::Quarterly).unwrap();
            assert_eq!(qs.len(), 4);
            assert_covers_year(&qs, year);
            let ends: Vec<NaiveDate> = qs.iter().map(|p| p.end).collect();
            assert_eq!(
                ends,
                vec![d(year, 3, 31), d(year, 6, 30), d(year, 9, 30), d(year, 12, 31)]
            );
        }
    }

    #[test]
    fn monthly_tracks_leap_february() {
        let leap = partition(2024, PeriodType::Monthly).unwrap();
        assert_eq!(leap.len(), 12);
        assert_covers_year(&leap, 2024);
        assert_eq!(leap[1].end, d(2024, 2, 29));

        let common = partition(2023, PeriodType::Monthly).unwrap();
        assert_eq!(common[1].end, d(2023, 2, 28));

        // Century rule: 1900 is not a leap year, 2000 is.
        assert_eq!(last_day_of_month(1900, 2).unwrap(), d(1900, 2, 28));
        assert_eq!(last_day_of_month(2000, 2).unwrap(), d(2000, 2, 29));
        assert_eq!(common[10].end, d(2023, 11, 30));
    }

    #[test]
    fn yearly_is_single_full_year() {
        let ys = partition(2025, PeriodType::Yearly).unwrap();
        assert_eq!(ys.len(), 1);
        assert_eq!(ys[0].label, "Year 2025");
        assert_covers_year(&ys, 2025);
    }

    #[test]
    fn parse_rejects_unknown_period_type() {
        assert_eq!(PeriodType::parse("trimestral").unwrap(), PeriodType::Quarterly);
        assert_eq!(PeriodType::parse("Monthly").unwrap(), PeriodType::Monthly);
        let e = PeriodType::parse("weekly").unwrap_err();
        assert_eq!(e.code(), "invalid_period_type");
    }

    #[test]
    fn quarter_lookup_maps_months() {
        assert_eq!(quarter_of_month(1), 1);
        assert_eq!(quarter_of_month(6), 2);
        assert_eq!(quarter_of_month(7), 3);
        assert_eq!(quarter_of_month(10), 4);
        assert_eq!(month_period(2024, 2).unwrap().label, "Feb 2024");
    }

    #[test]
    fn month_out_of_range_is_bad_params() {
        assert_eq!(month_period(2024, 13).unwrap_err().code(), "bad_params");
        assert_eq!(quarter_period(2024, 0).unwrap_err().code(), "bad_params");
    }
}

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rusqlite::types::Value;

const ISO_DAY: &str = "%Y-%m-%d";
const DISPLAY_DAY: &str = "%d-%m-%Y";
const DISPLAY_TIMESTAMP: &str = "%d-%m-%Y %H:%M";

/// Accepts `yyyy-mm-dd` (form inputs) and `dd-mm-yyyy` (display format).
pub fn parse_day(raw: &str) -> Option<NaiveDate> {
    let t = raw.trim();
    if t.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(t, ISO_DAY)
        .or_else(|_| NaiveDate::parse_from_str(t, DISPLAY_DAY))
        .ok()
}

pub fn display_day(d: NaiveDate) -> String {
    d.format(DISPLAY_DAY).to_string()
}

pub fn iso_day(d: NaiveDate) -> String {
    d.format(ISO_DAY).to_string()
}

pub fn display_timestamp(ts: NaiveDateTime) -> String {
    ts.format(DISPLAY_TIMESTAMP).to_string()
}

pub fn parse_year(raw: &str) -> Result<i32, String> {
    let t = raw.trim();
    if t.len() != 4 {
        return Err("year must be YYYY".to_string());
    }
    t.parse::<i32>()
        .map_err(|_| "year must be numeric".to_string())
}

/// Month as `3` or `03`.
pub fn parse_month(raw: &str) -> Result<u32, String> {
    let m = raw
        .trim()
        .parse::<u32>()
        .map_err(|_| "month must be numeric".to_string())?;
    if !(1..=12).contains(&m) {
        return Err("month must be between 01 and 12".to_string());
    }
    Ok(m)
}

/// Half-open date range used to filter attendance rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Period {
    bounds: Option<(NaiveDate, NaiveDate)>,
}

impl Period {
    pub fn all() -> Self {
        Self { bounds: None }
    }

    pub fn year(year: i32) -> Result<Self, String> {
        let start = NaiveDate::from_ymd_opt(year, 1, 1).ok_or("year out of range")?;
        let end = NaiveDate::from_ymd_opt(year + 1, 1, 1).ok_or("year out of range")?;
        Ok(Self {
            bounds: Some((start, end)),
        })
    }

    pub fn month(year: i32, month: u32) -> Result<Self, String> {
        let start = NaiveDate::from_ymd_opt(year, month, 1).ok_or("month out of range")?;
        let (ny, nm) = if month == 12 {
            (year + 1, 1)
        } else {
            (year, month + 1)
        };
        let end = NaiveDate::from_ymd_opt(ny, nm, 1).ok_or("month out of range")?;
        Ok(Self {
            bounds: Some((start, end)),
        })
    }

    pub fn day(d: NaiveDate) -> Self {
        Self {
            bounds: Some((d, d + Duration::days(1))),
        }
    }

    /// Appends `column >= ? AND column < ?` when the period is bounded.
    pub fn push_filter(&self, column: &str, conditions: &mut Vec<String>, params: &mut Vec<Value>) {
        if let Some((start, end)) = self.bounds {
            conditions.push(format!("{column} >= ? AND {column} < ?"));
            params.push(Value::Text(iso_day(start)));
            params.push(Value::Text(iso_day(end)));
        }
    }

    /// Builds a period from optional year/month strings: month needs a year.
    pub fn from_year_month(year: Option<&str>, month: Option<&str>) -> Result<Self, String> {
        match (year.filter(|s| !s.trim().is_empty()), month.filter(|s| !s.trim().is_empty())) {
            (None, None) => Ok(Self::all()),
            (None, Some(_)) => Err("month filter requires year".to_string()),
            (Some(y), None) => Self::year(parse_year(y)?),
            (Some(y), Some(m)) => Self::month(parse_year(y)?, parse_month(m)?),
        }
    }

    pub fn label(&self) -> serde_json::Value {
        match self.bounds {
            None => serde_json::Value::Null,
            Some((start, end)) => serde_json::json!({
                "from": iso_day(start),
                "until": iso_day(end),
            }),
        }
    }
}

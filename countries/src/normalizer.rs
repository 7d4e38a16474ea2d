//! Turns raw upstream documents into [`CountryRecord`]s.
//!
//! Missing fields fall back to defaults. A field that is present with the wrong
//! shape makes the whole record degraded: it keeps whatever names could be read
//! and defaults everything else, so a single bad entry never aborts a batch.

use crate::metrics_defs::{NORMALIZE_DEGRADED, counter};
use crate::types::{CountryRecord, RawCountry, UNKNOWN};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

type Fields = Map<String, Value>;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum MalformedRecord {
    #[error("record is not a JSON object")]
    NotAnObject,
    #[error("field `{field}` is not {expected}")]
    UnexpectedShape {
        field: &'static str,
        expected: &'static str,
    },
}

/// Outcome of normalizing one record. Both variants carry a usable record.
#[derive(Debug, PartialEq)]
pub enum Normalized {
    Complete(CountryRecord),
    Degraded {
        record: CountryRecord,
        reason: MalformedRecord,
    },
}

impl Normalized {
    pub fn record(&self) -> &CountryRecord {
        match self {
            Normalized::Complete(record) => record,
            Normalized::Degraded { record, .. } => record,
        }
    }

    pub fn into_record(self) -> CountryRecord {
        match self {
            Normalized::Complete(record) => record,
            Normalized::Degraded { record, .. } => record,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Normalized::Degraded { .. })
    }
}

pub fn normalize(raw: &RawCountry) -> Normalized {
    normalize_at(raw, Utc::now())
}

/// Same as [`normalize`] with an explicit processing timestamp.
pub fn normalize_at(raw: &RawCountry, now: DateTime<Utc>) -> Normalized {
    match extract(raw, now) {
        Ok(record) => Normalized::Complete(record),
        Err(reason) => {
            let name = raw.get("name");
            let read = |key: &str| {
                name.and_then(|n| n.get(key))
                    .and_then(Value::as_str)
                    .unwrap_or(UNKNOWN)
            };
            Normalized::Degraded {
                record: CountryRecord::with_defaults(read("common"), read("official"), now),
                reason,
            }
        }
    }
}

/// Normalizes every record independently. The output has the same length and
/// order as the input.
pub fn normalize_batch(raws: &[RawCountry]) -> Vec<CountryRecord> {
    raws.iter()
        .map(|raw| {
            let normalized = normalize(raw);
            if let Normalized::Degraded { record, reason } = &normalized {
                counter!(NORMALIZE_DEGRADED).increment(1);
                tracing::error!(
                    name = %record.name,
                    error = %reason,
                    "Error processing country data, falling back to defaults"
                );
            }
            normalized.into_record()
        })
        .collect()
}

fn extract(raw: &RawCountry, now: DateTime<Utc>) -> Result<CountryRecord, MalformedRecord> {
    let fields = raw.as_object().ok_or(MalformedRecord::NotAnObject)?;
    let name = object_field(fields, "name")?;
    let flags = object_field(fields, "flags")?;

    Ok(CountryRecord {
        name: text(name, "common", UNKNOWN),
        official_name: text(name, "official", UNKNOWN),
        country_code: text(Some(fields), "cca3", ""),
        capital: capital(fields.get("capital")),
        region: text(Some(fields), "region", UNKNOWN),
        subregion: text(Some(fields), "subregion", UNKNOWN),
        population: population(fields.get("population")),
        area: fields
            .get("area")
            .and_then(Value::as_f64)
            .filter(|a| a.is_finite() && *a >= 0.0)
            .unwrap_or(0.0),
        flag_emoji: text(Some(fields), "flag", ""),
        flag_url: text(flags, "svg", ""),
        currencies: currencies(fields)?,
        languages: languages(fields)?,
        independent: boolean(fields, "independent"),
        un_member: boolean(fields, "unMember"),
        last_updated: now,
    })
}

// Absent or null is fine; any shape other than an object is malformed.
fn object_field<'a>(
    fields: &'a Fields,
    key: &'static str,
) -> Result<Option<&'a Fields>, MalformedRecord> {
    match fields.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(MalformedRecord::UnexpectedShape {
            field: key,
            expected: "an object",
        }),
    }
}

fn text(fields: Option<&Fields>, key: &str, default: &str) -> String {
    fields
        .and_then(|f| f.get(key))
        .and_then(Value::as_str)
        .unwrap_or(default)
        .to_string()
}

fn boolean(fields: &Fields, key: &str) -> bool {
    fields.get(key).and_then(Value::as_bool).unwrap_or(true)
}

// Integral or fractional, capped to what an SQLite INTEGER holds. Negative is 0.
fn population(value: Option<&Value>) -> u64 {
    let Some(value) = value else {
        return 0;
    };
    value
        .as_u64()
        .or_else(|| {
            value
                .as_f64()
                .filter(|p| p.is_finite() && *p >= 0.0 && *p <= i64::MAX as f64)
                .map(|p| p as u64)
        })
        .map_or(0, |p| p.min(i64::MAX as u64))
}

// Joined only when every entry is a string.
fn capital(value: Option<&Value>) -> String {
    let names: Option<Vec<&str>> = value
        .and_then(Value::as_array)
        .and_then(|items| items.iter().map(Value::as_str).collect());

    match names {
        Some(names) if !names.is_empty() => names.join(", "),
        _ => UNKNOWN.to_string(),
    }
}

fn currencies(fields: &Fields) -> Result<String, MalformedRecord> {
    let Some(currencies) = object_field(fields, "currencies")? else {
        return Ok(String::new());
    };

    let mut rendered = Vec::with_capacity(currencies.len());
    for (code, details) in currencies {
        let details = details
            .as_object()
            .ok_or(MalformedRecord::UnexpectedShape {
                field: "currencies",
                expected: "a map of currency objects",
            })?;
        let name = details.get("name").and_then(Value::as_str).unwrap_or(UNKNOWN);
        let symbol = details.get("symbol").and_then(Value::as_str).unwrap_or("");
        rendered.push(format!("{code} ({name}, {symbol})"));
    }

    Ok(rendered.join(", "))
}

fn languages(fields: &Fields) -> Result<String, MalformedRecord> {
    let Some(languages) = object_field(fields, "languages")? else {
        return Ok(String::new());
    };

    let names = languages
        .values()
        .map(|name| {
            name.as_str().ok_or(MalformedRecord::UnexpectedShape {
                field: "languages",
                expected: "a map of language names",
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(names.join(", "))
}

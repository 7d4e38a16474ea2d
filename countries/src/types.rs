use chrono::{DateTime, Utc};
use serde::Serialize;

/// A country document exactly as the upstream provider returned it. Field
/// presence and shapes are not guaranteed.
pub type RawCountry = serde_json::Value;

pub const UNKNOWN: &str = "Unknown";

/// The normalized, store-ready representation of a country.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CountryRecord {
    pub name: String,
    pub official_name: String,
    pub country_code: String,
    pub capital: String,
    pub region: String,
    pub subregion: String,
    pub population: u64,
    pub area: f64,
    pub flag_emoji: String,
    pub flag_url: String,
    pub currencies: String,
    pub languages: String,
    pub independent: bool,
    pub un_member: bool,
    pub last_updated: DateTime<Utc>,
}

impl CountryRecord {
    /// A record carrying safe defaults for everything except the names.
    pub fn with_defaults<N, O>(name: N, official_name: O, last_updated: DateTime<Utc>) -> Self
    where
        N: Into<String>,
        O: Into<String>,
    {
        CountryRecord {
            name: name.into(),
            official_name: official_name.into(),
            country_code: String::new(),
            capital: UNKNOWN.into(),
            region: UNKNOWN.into(),
            subregion: UNKNOWN.into(),
            population: 0,
            area: 0.0,
            flag_emoji: String::new(),
            flag_url: String::new(),
            currencies: String::new(),
            languages: String::new(),
            independent: true,
            un_member: true,
            last_updated,
        }
    }
}

/// A canonical record plus the surrogate id assigned by the store.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PersistedCountry {
    pub id: i64,
    #[serde(flatten)]
    pub record: CountryRecord,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RegionCount {
    pub region: String,
    pub count: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Aggregate {
    pub total: f64,
    pub average: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CountryStats {
    pub total_countries: u64,
    pub regions: Vec<RegionCount>,
    pub population: Aggregate,
    pub area: Aggregate,
}

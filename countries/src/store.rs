//! Relational storage for countries, keyed by surrogate id with a unique
//! natural key on `name`.

use crate::metrics_defs::{STORE_UPSERT_FAILURE, STORE_UPSERT_SUCCESS, counter};
use crate::types::{Aggregate, CountryRecord, CountryStats, PersistedCountry, RegionCount};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params};
use std::path::Path;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS countries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    official_name TEXT NOT NULL,
    country_code TEXT NOT NULL,
    capital TEXT NOT NULL,
    region TEXT NOT NULL,
    subregion TEXT NOT NULL,
    population INTEGER NOT NULL,
    area REAL NOT NULL,
    flag_emoji TEXT NOT NULL,
    flag_url TEXT NOT NULL,
    currencies TEXT NOT NULL,
    languages TEXT NOT NULL,
    independent INTEGER NOT NULL DEFAULT 1,
    un_member INTEGER NOT NULL DEFAULT 1,
    last_updated TEXT NOT NULL
);
";

const COLUMNS: &str = "id, name, official_name, country_code, capital, region, subregion, \
    population, area, flag_emoji, flag_url, currencies, languages, independent, un_member, \
    last_updated";

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortField {
    Name,
    Population,
    Area,
    Region,
}

impl SortField {
    /// Parses a query-string value. Unknown fields yield `None`.
    pub fn from_param(value: &str) -> Option<Self> {
        match value {
            "name" => Some(SortField::Name),
            "population" => Some(SortField::Population),
            "area" => Some(SortField::Area),
            "region" => Some(SortField::Region),
            _ => None,
        }
    }

    fn column(&self) -> &'static str {
        match self {
            SortField::Name => "name",
            SortField::Population => "population",
            SortField::Area => "area",
            SortField::Region => "region",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn from_param(value: &str) -> Self {
        if value.eq_ignore_ascii_case("desc") {
            SortOrder::Desc
        } else {
            SortOrder::Asc
        }
    }

    fn keyword(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Filter and ordering for [`CountryStore::list`]. A `sort` of `None` keeps
/// insertion order.
#[derive(Clone, Debug, PartialEq)]
pub struct CountryQuery {
    pub region: Option<String>,
    pub sort: Option<SortField>,
    pub order: SortOrder,
}

impl Default for CountryQuery {
    fn default() -> Self {
        CountryQuery {
            region: None,
            sort: Some(SortField::Name),
            order: SortOrder::Asc,
        }
    }
}

pub trait CountryStore: Send + Sync {
    /// Inserts the record, or overwrites every field of the row with the same
    /// name. The surrogate id of an existing row never changes.
    fn upsert(&self, record: &CountryRecord) -> Result<PersistedCountry, StoreError>;
    fn list(&self, query: &CountryQuery) -> Result<Vec<PersistedCountry>, StoreError>;
    /// First country whose name contains `fragment`, ignoring case.
    fn find_by_name(&self, fragment: &str) -> Result<Option<PersistedCountry>, StoreError>;
    fn regions(&self) -> Result<Vec<String>, StoreError>;
    fn stats(&self) -> Result<CountryStats, StoreError>;
}

/// Upserts each record independently and returns how many were saved. Failed
/// records are logged and skipped.
pub fn upsert_batch(store: &dyn CountryStore, records: &[CountryRecord]) -> usize {
    let mut saved = 0;

    for record in records {
        match store.upsert(record) {
            Ok(_) => {
                saved += 1;
                counter!(STORE_UPSERT_SUCCESS).increment(1);
            }
            Err(err) => {
                counter!(STORE_UPSERT_FAILURE).increment(1);
                tracing::error!(name = %record.name, error = %err, "Error saving country");
            }
        }
    }

    tracing::info!(saved, total = records.len(), "Saved countries to store");
    saved
}

pub struct SqliteCountryStore {
    conn: Mutex<Connection>,
}

impl SqliteCountryStore {
    /// Opens (or creates) the database file and bootstraps the table.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(SqliteCountryStore {
            conn: Mutex::new(conn),
        })
    }

    #[cfg(test)]
    fn execute_batch(&self, sql: &str) -> Result<(), StoreError> {
        Ok(self.conn.lock().execute_batch(sql)?)
    }
}

impl CountryStore for SqliteCountryStore {
    fn upsert(&self, record: &CountryRecord) -> Result<PersistedCountry, StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        match write_record(&tx, record) {
            Ok((id, updated)) => {
                tx.commit()?;
                if updated {
                    tracing::debug!(id, name = %record.name, "Updated country");
                } else {
                    tracing::debug!(id, name = %record.name, "Added new country");
                }
                Ok(PersistedCountry {
                    id,
                    record: record.clone(),
                })
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback() {
                    tracing::error!(error = %rollback_err, "Rollback failed");
                }
                Err(err.into())
            }
        }
    }

    fn list(&self, query: &CountryQuery) -> Result<Vec<PersistedCountry>, StoreError> {
        let mut sql = format!("SELECT {COLUMNS} FROM countries");
        if query.region.is_some() {
            sql.push_str(" WHERE region = ?1");
        }
        match query.sort {
            Some(field) => {
                sql.push_str(&format!(
                    " ORDER BY {} {}",
                    field.column(),
                    query.order.keyword()
                ));
            }
            None => sql.push_str(" ORDER BY id"),
        }

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = match &query.region {
            Some(region) => stmt.query_map(params![region], read_country)?,
            None => stmt.query_map([], read_country)?,
        };

        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn find_by_name(&self, fragment: &str) -> Result<Option<PersistedCountry>, StoreError> {
        let conn = self.conn.lock();
        let country = conn
            .query_row(
                &format!(
                    "SELECT {COLUMNS} FROM countries \
                     WHERE instr(lower(name), lower(?1)) > 0 ORDER BY id LIMIT 1"
                ),
                params![fragment],
                read_country,
            )
            .optional()?;
        Ok(country)
    }

    fn regions(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT DISTINCT region FROM countries WHERE region <> '' ORDER BY region")?;
        let regions = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(regions)
    }

    fn stats(&self) -> Result<CountryStats, StoreError> {
        let conn = self.conn.lock();

        let total_countries: u64 =
            conn.query_row("SELECT COUNT(*) FROM countries", [], |row| row.get(0))?;

        let mut stmt = conn
            .prepare("SELECT region, COUNT(id) FROM countries GROUP BY region ORDER BY region")?;
        let regions = stmt
            .query_map([], |row| {
                Ok(RegionCount {
                    region: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let (population, area) = conn.query_row(
            "SELECT COALESCE(SUM(population), 0), COALESCE(AVG(population), 0), \
                    COALESCE(SUM(area), 0), COALESCE(AVG(area), 0) FROM countries",
            [],
            |row| {
                Ok((
                    Aggregate {
                        total: row.get(0)?,
                        average: row.get(1)?,
                    },
                    Aggregate {
                        total: row.get(2)?,
                        average: row.get(3)?,
                    },
                ))
            },
        )?;

        Ok(CountryStats {
            total_countries,
            regions,
            population,
            area,
        })
    }
}

// Returns the row id and whether an existing row was updated.
fn write_record(tx: &Transaction<'_>, record: &CountryRecord) -> rusqlite::Result<(i64, bool)> {
    let existing: Option<i64> = tx
        .query_row(
            "SELECT id FROM countries WHERE name = ?1",
            params![record.name],
            |row| row.get(0),
        )
        .optional()?;

    match existing {
        Some(id) => {
            tx.execute(
                "UPDATE countries SET name = ?2, official_name = ?3, country_code = ?4, \
                 capital = ?5, region = ?6, subregion = ?7, population = ?8, area = ?9, \
                 flag_emoji = ?10, flag_url = ?11, currencies = ?12, languages = ?13, \
                 independent = ?14, un_member = ?15, last_updated = ?16 WHERE id = ?1",
                params![
                    id,
                    record.name,
                    record.official_name,
                    record.country_code,
                    record.capital,
                    record.region,
                    record.subregion,
                    record.population,
                    record.area,
                    record.flag_emoji,
                    record.flag_url,
                    record.currencies,
                    record.languages,
                    record.independent,
                    record.un_member,
                    record.last_updated,
                ],
            )?;
            Ok((id, true))
        }
        None => {
            tx.execute(
                "INSERT INTO countries (name, official_name, country_code, capital, region, \
                 subregion, population, area, flag_emoji, flag_url, currencies, languages, \
                 independent, un_member, last_updated) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                params![
                    record.name,
                    record.official_name,
                    record.country_code,
                    record.capital,
                    record.region,
                    record.subregion,
                    record.population,
                    record.area,
                    record.flag_emoji,
                    record.flag_url,
                    record.currencies,
                    record.languages,
                    record.independent,
                    record.un_member,
                    record.last_updated,
                ],
            )?;
            Ok((tx.last_insert_rowid(), false))
        }
    }
}

fn read_country(row: &Row<'_>) -> rusqlite::Result<PersistedCountry> {
    Ok(PersistedCountry {
        id: row.get(0)?,
        record: CountryRecord {
            name: row.get(1)?,
            official_name: row.get(2)?,
            country_code: row.get(3)?,
            capital: row.get(4)?,
            region: row.get(5)?,
            subregion: row.get(6)?,
            population: row.get(7)?,
            area: row.get(8)?,
            flag_emoji: row.get(9)?,
            flag_url: row.get(10)?,
            currencies: row.get(11)?,
            languages: row.get(12)?,
            independent: row.get(13)?,
            un_member: row.get(14)?,
            last_updated: row.get(15)?,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn country(name: &str, region: &str, population: u64, area: f64) -> CountryRecord {
        let mut record = CountryRecord::with_defaults(
            name,
            format!("Republic of {name}"),
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        );
        record.region = region.into();
        record.population = population;
        record.area = area;
        record
    }

    fn seeded_store() -> SqliteCountryStore {
        let store = SqliteCountryStore::open_in_memory().unwrap();
        for record in [
            country("Peru", "Americas", 33_000_000, 1_285_216.0),
            country("France", "Europe", 68_000_000, 551_695.0),
            country("Chile", "Americas", 19_000_000, 756_102.0),
            country("Malta", "Europe", 520_000, 316.0),
        ] {
            store.upsert(&record).unwrap();
        }
        store
    }

    fn names(countries: &[PersistedCountry]) -> Vec<&str> {
        countries.iter().map(|c| c.record.name.as_str()).collect()
    }

    fn reject_name(store: &SqliteCountryStore, name: &str) {
        store
            .execute_batch(&format!(
                "CREATE TRIGGER reject_insert BEFORE INSERT ON countries \
                 WHEN NEW.name = '{name}' BEGIN SELECT RAISE(ABORT, 'rejected'); END;"
            ))
            .unwrap();
    }

    #[test]
    fn test_upsert_inserts_then_updates() {
        let store = SqliteCountryStore::open_in_memory().unwrap();

        let first = store.upsert(&country("Peru", "Americas", 1000, 10.0)).unwrap();
        let mut changed = country("Peru", "South America", 2000, 20.0);
        changed.capital = "Lima".into();
        let second = store.upsert(&changed).unwrap();

        assert_eq!(first.id, second.id);

        let all = store.list(&CountryQuery::default()).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, first.id);
        assert_eq!(all[0].record, changed);
    }

    #[test]
    fn test_distinct_names_get_distinct_ids() {
        let store = SqliteCountryStore::open_in_memory().unwrap();
        let a = store.upsert(&country("Peru", "Americas", 1, 1.0)).unwrap();
        let b = store.upsert(&country("peru", "Americas", 1, 1.0)).unwrap();
        // Natural key match is case-sensitive on write
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_batch_skips_failed_records() {
        let store = SqliteCountryStore::open_in_memory().unwrap();
        reject_name(&store, "Country 4");

        let records: Vec<_> = (0..10)
            .map(|i| country(&format!("Country {i}"), "Europe", i, 1.0))
            .collect();

        assert_eq!(upsert_batch(&store, &records), 9);

        let stored = store
            .list(&CountryQuery {
                sort: None,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(stored.len(), 9);
        assert!(!names(&stored).contains(&"Country 4"));
        // The failure did not disturb records after it
        assert_eq!(stored[8].record.name, "Country 9");
    }

    #[test]
    fn test_failed_update_rolls_back() {
        let store = SqliteCountryStore::open_in_memory().unwrap();
        store.upsert(&country("Peru", "Americas", 1000, 10.0)).unwrap();
        store
            .execute_batch(
                "CREATE TRIGGER reject_update BEFORE UPDATE ON countries \
                 WHEN NEW.population = 666 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();

        let result = store.upsert(&country("Peru", "Nowhere", 666, 99.0));
        assert!(matches!(result, Err(StoreError::Database(_))));

        let peru = store.find_by_name("Peru").unwrap().unwrap();
        assert_eq!(peru.record.population, 1000);
        assert_eq!(peru.record.region, "Americas");

        // The store is still usable after a rollback
        store.upsert(&country("Chile", "Americas", 1, 1.0)).unwrap();
        assert_eq!(store.stats().unwrap().total_countries, 2);
    }

    #[test]
    fn test_list_filter_and_sort() {
        let store = seeded_store();

        let by_name = store.list(&CountryQuery::default()).unwrap();
        assert_eq!(names(&by_name), vec!["Chile", "France", "Malta", "Peru"]);

        let europe_by_pop = store
            .list(&CountryQuery {
                region: Some("Europe".into()),
                sort: Some(SortField::Population),
                order: SortOrder::Desc,
            })
            .unwrap();
        assert_eq!(names(&europe_by_pop), vec!["France", "Malta"]);

        let by_area = store
            .list(&CountryQuery {
                sort: SortField::from_param("area"),
                order: SortOrder::from_param("ASC"),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(names(&by_area), vec!["Malta", "France", "Chile", "Peru"]);

        // Unknown sort field keeps insertion order
        let unsorted = store
            .list(&CountryQuery {
                sort: SortField::from_param("capital"),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(names(&unsorted), vec!["Peru", "France", "Chile", "Malta"]);

        let none = store
            .list(&CountryQuery {
                region: Some("Oceania".into()),
                ..Default::default()
            })
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_find_by_name() {
        let store = seeded_store();

        assert_eq!(
            store.find_by_name("fRaN").unwrap().unwrap().record.name,
            "France"
        );
        // Several matches: first inserted wins
        assert_eq!(store.find_by_name("l").unwrap().unwrap().record.name, "Chile");
        // LIKE wildcards are matched literally
        assert!(store.find_by_name("%").unwrap().is_none());
        assert!(store.find_by_name("Atlantis").unwrap().is_none());
    }

    #[test]
    fn test_regions() {
        let store = seeded_store();
        store.upsert(&country("Nowhere", "", 0, 0.0)).unwrap();
        assert_eq!(store.regions().unwrap(), vec!["Americas", "Europe"]);
    }

    #[test]
    fn test_stats() {
        let store = SqliteCountryStore::open_in_memory().unwrap();
        let empty = store.stats().unwrap();
        assert_eq!(empty.total_countries, 0);
        assert!(empty.regions.is_empty());
        assert_eq!(empty.population.total, 0.0);
        assert_eq!(empty.area.average, 0.0);

        store.upsert(&country("A", "Europe", 100, 10.0)).unwrap();
        store.upsert(&country("B", "Europe", 300, 30.0)).unwrap();
        store.upsert(&country("C", "Asia", 200, 20.0)).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.total_countries, 3);
        assert_eq!(
            stats.regions,
            vec![
                RegionCount {
                    region: "Asia".into(),
                    count: 1
                },
                RegionCount {
                    region: "Europe".into(),
                    count: 2
                },
            ]
        );
        assert_eq!(stats.population.total, 600.0);
        assert_eq!(stats.population.average, 200.0);
        assert_eq!(stats.area.total, 60.0);
        assert_eq!(stats.area.average, 20.0);
    }

    #[test]
    fn test_file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("countries.db");

        let id = {
            let store = SqliteCountryStore::open(&path).unwrap();
            store.upsert(&country("Peru", "Americas", 1, 1.0)).unwrap().id
        };

        let store = SqliteCountryStore::open(&path).unwrap();
        let peru = store.find_by_name("peru").unwrap().unwrap();
        assert_eq!(peru.id, id);
        assert_eq!(peru.record, country("Peru", "Americas", 1, 1.0));
    }
}

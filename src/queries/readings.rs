use std::collections::{BTreeSet, HashMap};

use chrono::{NaiveDate, NaiveTime};
use sea_orm::{ConnectionTrait, DatabaseBackend, FromQueryResult, Statement, Value};
use serde::Serialize;

use crate::error::{AppError, AppResult};

/// One timestamped measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Reading {
    pub site_id: i32,
    /// Unix seconds
    pub time: i64,
    pub value: f64,
}

/// Query result: the readings plus the name each site id resolved to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadingSet {
    pub readings: Vec<Reading>,
    pub site_names: HashMap<i32, String>,
}

#[derive(Debug, FromQueryResult)]
struct ReadingRow {
    site_id: i32,
    name: Option<String>,
    time: i64,
    reading: Option<f64>,
}

/// Unix seconds at midnight UTC of `date`.
#[must_use]
pub fn day_start(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp()
}

/// Half-open `[start_of(start), start_of(end + 1 day))` window in unix seconds.
///
/// # Errors
///
/// `AppError::Validation` if `start > end` or `end` is the last representable date.
pub fn time_bounds(start: NaiveDate, end: NaiveDate) -> AppResult<(i64, i64)> {
    if start > end {
        return Err(AppError::validation(format!(
            "start date {start} is after end date {end}"
        )));
    }
    let after_end = end
        .succ_opt()
        .ok_or_else(|| AppError::validation(format!("end date {end} is out of range")))?;
    Ok((day_start(start), day_start(after_end)))
}

fn readings_sql(id_count: usize) -> String {
    let placeholders = (1..=id_count)
        .map(|i| format!("${i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let lower = id_count + 1;
    let upper = id_count + 2;

    // Casts pin the wire types: `time` may be int4 and `reading` numeric.
    format!(
        "SELECT site_data.site_id AS site_id, sites.name AS name, \
         site_data.time::BIGINT AS time, site_data.reading::DOUBLE PRECISION AS reading \
         FROM site_data LEFT JOIN sites ON site_data.site_id = sites.id \
         WHERE site_data.site_id IN ({placeholders}) \
         AND site_data.time >= ${lower} AND site_data.time < ${upper} \
         ORDER BY site_data.site_id, site_data.time"
    )
}

/// Readings for `site_ids` whose timestamp falls on any day from `start` to
/// `end` inclusive (UTC).
///
/// Ids and bounds are bound as statement parameters. Rows come back in result
/// order; a site without a catalog row is labelled `Site <id>`. Rows with a
/// null reading are dropped.
///
/// # Errors
///
/// `AppError::Validation` for an empty id set or an inverted range (no query is
/// issued), otherwise `AppError::Query` / `AppError::Connection` from the database.
pub async fn fetch_readings<C: ConnectionTrait>(
    conn: &C,
    site_ids: &BTreeSet<i32>,
    start: NaiveDate,
    end: NaiveDate,
) -> AppResult<ReadingSet> {
    if site_ids.is_empty() {
        return Err(AppError::validation("select at least one sensor location"));
    }
    let (lower, upper) = time_bounds(start, end)?;

    let mut values: Vec<Value> = site_ids.iter().map(|&id| id.into()).collect();
    values.push(lower.into());
    values.push(upper.into());

    let rows = conn
        .query_all(Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            readings_sql(site_ids.len()),
            values,
        ))
        .await?
        .iter()
        .map(|row| ReadingRow::from_query_result(row, ""))
        .collect::<Result<Vec<_>, _>>()?;

    let mut set = ReadingSet {
        readings: Vec::with_capacity(rows.len()),
        site_names: HashMap::new(),
    };
    let mut null_readings = 0usize;

    for row in rows {
        set.site_names
            .entry(row.site_id)
            .or_insert_with(|| row.name.unwrap_or_else(|| format!("Site {}", row.site_id)));

        match row.reading {
            Some(value) => set.readings.push(Reading {
                site_id: row.site_id,
                time: row.time,
                value,
            }),
            None => null_readings += 1,
        }
    }

    tracing::debug!(
        sites = ?site_ids,
        lower,
        upper,
        rows = set.readings.len(),
        null_readings,
        "Fetched readings"
    );
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{MockDatabase, Transaction};
    use std::collections::BTreeMap;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn row(
        site_id: i32,
        name: Option<&str>,
        time: i64,
        reading: Option<f64>,
    ) -> BTreeMap<&'static str, Value> {
        BTreeMap::from([
            ("site_id", Value::Int(Some(site_id))),
            ("name", Value::String(name.map(|n| Box::new(n.to_string())))),
            ("time", Value::BigInt(Some(time))),
            ("reading", Value::Double(reading)),
        ])
    }

    #[test]
    fn day_start_is_utc_midnight() {
        assert_eq!(day_start(date(1970, 1, 2)), 86_400);
        assert_eq!(day_start(date(2020, 12, 1)), 1_606_780_800);
    }

    #[test]
    fn bounds_cover_the_whole_end_day() {
        let (lower, upper) = time_bounds(date(2020, 12, 1), date(2020, 12, 1)).unwrap();
        assert_eq!(lower, 1_606_780_800);
        assert_eq!(upper - lower, 86_400);

        let (lower, upper) = time_bounds(date(2020, 12, 1), date(2020, 12, 31)).unwrap();
        assert_eq!(upper - lower, 31 * 86_400);
    }

    #[test]
    fn inverted_range_is_rejected() {
        let err = time_bounds(date(2020, 12, 2), date(2020, 12, 1)).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn sql_uses_placeholders_only() {
        let sql = readings_sql(3);
        assert!(sql.contains("IN ($1, $2, $3)"));
        assert!(sql.contains("site_data.time >= $4 AND site_data.time < $5"));
        assert!(!sql.contains("{"));
    }

    #[tokio::test]
    async fn binds_ids_and_bounds_as_parameters() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![
                row(1, Some("Chula Vista"), 1_606_780_800, Some(5.0)),
                row(1, Some("Chula Vista"), 1_606_784_400, Some(7.0)),
                row(3, Some("El Cajon"), 1_606_780_800, Some(2.5)),
            ]])
            .into_connection();

        let ids = BTreeSet::from([3, 1]);
        let set = fetch_readings(&db, &ids, date(2020, 12, 1), date(2020, 12, 2))
            .await
            .unwrap();

        assert_eq!(set.readings.len(), 3);
        assert_eq!(
            set.readings[1],
            Reading { site_id: 1, time: 1_606_784_400, value: 7.0 }
        );
        assert_eq!(set.site_names[&1], "Chula Vista");
        assert_eq!(set.site_names[&3], "El Cajon");

        assert_eq!(
            db.into_transaction_log(),
            vec![Transaction::from_sql_and_values(
                DatabaseBackend::Postgres,
                readings_sql(2),
                [
                    1i32.into(),
                    3i32.into(),
                    1_606_780_800i64.into(),
                    1_606_953_600i64.into(),
                ]
            )]
        );
    }

    #[tokio::test]
    async fn unnamed_sites_and_null_readings() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![
                row(9, None, 1_606_780_800, Some(1.0)),
                row(9, None, 1_606_781_400, None),
            ]])
            .into_connection();

        let set = fetch_readings(&db, &BTreeSet::from([9]), date(2020, 12, 1), date(2020, 12, 1))
            .await
            .unwrap();
        assert_eq!(set.readings.len(), 1);
        assert_eq!(set.site_names[&9], "Site 9");
    }

    #[tokio::test]
    async fn empty_selection_never_queries() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();

        let err = fetch_readings(&db, &BTreeSet::new(), date(2020, 12, 1), date(2020, 12, 2))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(db.into_transaction_log().is_empty());
    }

    #[tokio::test]
    async fn inverted_range_never_queries() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();

        let err = fetch_readings(&db, &BTreeSet::from([1]), date(2021, 1, 2), date(2021, 1, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(db.into_transaction_log().is_empty());
    }
}

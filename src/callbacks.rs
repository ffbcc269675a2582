//! Interaction handling for the dashboard page.
//!
//! The page posts the current value of every input a callback depends on;
//! [`CallbackRegistry`] maps the requested output to the handler registered
//! for it. The chart handler runs `fetch_readings` then `build_chart` inside
//! the request scope and turns any failure into a visible error panel.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{NaiveDate, NaiveDateTime};
use futures::future::BoxFuture;
use sea_orm::ConnectionTrait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::chart::{build_chart, ChartSettings, ChartSpec};
use crate::common::AppState;
use crate::database::RequestScope;
use crate::error::{AppError, AppResult};
use crate::layout::{CHART_REGION_ID, DATE_PICKER_ID, SITE_SELECT_ID};
use crate::queries::{fetch_readings, time_bounds};

/// A component property, addressed as `id.property` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Dependency {
    pub id: &'static str,
    pub property: &'static str,
}

impl Dependency {
    #[must_use]
    pub const fn new(id: &'static str, property: &'static str) -> Self {
        Self { id, property }
    }

    #[must_use]
    pub fn key(&self) -> String {
        format!("{}.{}", self.id, self.property)
    }
}

pub const CHART_OUTPUT: Dependency = Dependency::new(CHART_REGION_ID, "children");
pub const SITES_INPUT: Dependency = Dependency::new(SITE_SELECT_ID, "value");
pub const START_DATE_INPUT: Dependency = Dependency::new(DATE_PICKER_ID, "start_date");
pub const END_DATE_INPUT: Dependency = Dependency::new(DATE_PICKER_ID, "end_date");

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct InputValue {
    pub id: String,
    pub property: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub value: Value,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateRequest {
    /// Output key, e.g. `time_series_chart_col.children`
    pub output: String,
    pub inputs: Vec<InputValue>,
    /// Client-side interaction counter, echoed back unchanged
    #[serde(default)]
    pub seq: Option<u64>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UpdateResponse {
    pub seq: Option<u64>,
    pub output: String,
    pub response: ChartPanel,
}

/// What the chart placeholder should show.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChartPanel {
    Chart { chart: ChartSpec },
    Prompt { message: String },
    Error { kind: String, message: String },
}

impl ChartPanel {
    #[must_use]
    pub fn from_error(err: &AppError) -> Self {
        Self::Error {
            kind: err.kind().to_string(),
            message: err.public_message(),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DependencySpec {
    pub output: String,
    pub inputs: Vec<String>,
}

/// Current UI state as sent by the page.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QuerySelection {
    pub site_ids: BTreeSet<i32>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl QuerySelection {
    /// Decode the chart callback's inputs.
    ///
    /// The site value may be a single id (single-select shape) or a list.
    ///
    /// # Errors
    ///
    /// `AppError::Validation` for a non-integer id or a malformed date.
    pub fn from_inputs(inputs: &[InputValue]) -> AppResult<Self> {
        let value_of = |dep: Dependency| {
            inputs
                .iter()
                .find(|i| i.id == dep.id && i.property == dep.property)
                .map_or(&Value::Null, |i| &i.value)
        };

        Ok(Self {
            site_ids: parse_site_ids(value_of(SITES_INPUT))?,
            start_date: parse_date(value_of(START_DATE_INPUT))?,
            end_date: parse_date(value_of(END_DATE_INPUT))?,
        })
    }

    #[must_use]
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        self.start_date.zip(self.end_date)
    }
}

fn parse_site_id(value: &Value) -> AppResult<i32> {
    value
        .as_i64()
        .and_then(|id| i32::try_from(id).ok())
        .ok_or_else(|| AppError::validation(format!("site id must be an integer, got {value}")))
}

fn parse_site_ids(value: &Value) -> AppResult<BTreeSet<i32>> {
    match value {
        Value::Null => Ok(BTreeSet::new()),
        Value::Array(items) => items.iter().map(parse_site_id).collect(),
        single => Ok(BTreeSet::from([parse_site_id(single)?])),
    }
}

fn parse_date(value: &Value) -> AppResult<Option<NaiveDate>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) if s.is_empty() => Ok(None),
        Value::String(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").map(|dt| dt.date()))
            .map(Some)
            .map_err(|_| AppError::validation(format!("invalid date '{s}', expected YYYY-MM-DD"))),
        other => Err(AppError::validation(format!(
            "invalid date {other}, expected YYYY-MM-DD"
        ))),
    }
}

/// Query and assemble one chart. Independent of HTTP; the caller supplies the
/// connection.
pub async fn render_time_series<C: ConnectionTrait>(
    conn: &C,
    site_ids: &BTreeSet<i32>,
    start: NaiveDate,
    end: NaiveDate,
    settings: &ChartSettings,
) -> AppResult<ChartSpec> {
    let set = fetch_readings(conn, site_ids, start, end).await?;
    Ok(build_chart(&set.readings, &set.site_names, start, end, settings))
}

/// Borrowed view handed to a callback.
pub struct CallbackContext<'a> {
    pub state: &'a AppState,
    pub scope: &'a RequestScope,
    pub inputs: &'a [InputValue],
}

pub type Handler = for<'a> fn(CallbackContext<'a>) -> BoxFuture<'a, AppResult<ChartPanel>>;

pub struct Callback {
    pub output: Dependency,
    pub inputs: Vec<Dependency>,
    handler: Handler,
}

#[derive(Default)]
pub struct CallbackRegistry {
    callbacks: BTreeMap<String, Callback>,
}

impl CallbackRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the dashboard's single chart callback.
    #[must_use]
    pub fn dashboard() -> Self {
        let mut registry = Self::new();
        registry.register(
            CHART_OUTPUT,
            vec![SITES_INPUT, START_DATE_INPUT, END_DATE_INPUT],
            update_time_series_chart,
        );
        registry
    }

    /// Register `handler` to produce `output` whenever any of `inputs` change.
    /// A later registration for the same output replaces the earlier one.
    pub fn register(&mut self, output: Dependency, inputs: Vec<Dependency>, handler: Handler) {
        self.callbacks.insert(
            output.key(),
            Callback {
                output,
                inputs,
                handler,
            },
        );
    }

    #[must_use]
    pub fn get(&self, output: &str) -> Option<&Callback> {
        self.callbacks.get(output)
    }

    #[must_use]
    pub fn dependencies(&self) -> Vec<DependencySpec> {
        self.callbacks
            .values()
            .map(|cb| DependencySpec {
                output: cb.output.key(),
                inputs: cb.inputs.iter().map(Dependency::key).collect(),
            })
            .collect()
    }

    /// Run the callback registered for `request.output`.
    ///
    /// Unknown outputs and missing declared inputs are protocol errors and are
    /// returned as `Err`. Failures inside the handler become an error panel.
    pub async fn dispatch(
        &self,
        state: &AppState,
        scope: &RequestScope,
        request: &UpdateRequest,
    ) -> AppResult<ChartPanel> {
        let callback = self.get(&request.output).ok_or_else(|| {
            AppError::NotFound(format!("no callback for output '{}'", request.output))
        })?;

        if let Some(missing) = callback.inputs.iter().find(|dep| {
            !request
                .inputs
                .iter()
                .any(|i| i.id == dep.id && i.property == dep.property)
        }) {
            return Err(AppError::validation(format!(
                "missing input '{}'",
                missing.key()
            )));
        }

        let ctx = CallbackContext {
            state,
            scope,
            inputs: &request.inputs,
        };
        match (callback.handler)(ctx).await {
            Ok(panel) => Ok(panel),
            Err(err) => {
                match &err {
                    AppError::Validation(msg) => {
                        tracing::info!(output = %request.output, "Rejected selection: {msg}");
                    }
                    other => {
                        tracing::error!(output = %request.output, "Callback failed: {other}");
                    }
                }
                Ok(ChartPanel::from_error(&err))
            }
        }
    }
}

fn update_time_series_chart(ctx: CallbackContext<'_>) -> BoxFuture<'_, AppResult<ChartPanel>> {
    Box::pin(async move {
        let selection = QuerySelection::from_inputs(ctx.inputs)?;

        let Some((start, end)) = selection.date_range() else {
            return Ok(ChartPanel::Prompt {
                message: "Choose a start and end date to see readings".to_string(),
            });
        };

        // Reject before a connection is opened.
        if selection.site_ids.is_empty() {
            return Err(AppError::validation("select at least one sensor location"));
        }
        time_bounds(start, end)?;

        let conn = ctx.scope.acquire().await?;
        let chart =
            render_time_series(conn, &selection.site_ids, start, end, &ctx.state.chart).await?;

        tracing::debug!(
            sites = ?selection.site_ids,
            %start,
            %end,
            series = chart.series.len(),
            "Rendered chart"
        );
        Ok(ChartPanel::Chart { chart })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::database::ConnectionProvider;
    use crate::layout::page_for_sites;
    use sea_orm::{DatabaseBackend, DbErr, MockDatabase};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn input(dep: Dependency, value: Value) -> InputValue {
        InputValue {
            id: dep.id.to_string(),
            property: dep.property.to_string(),
            value,
        }
    }

    fn request(sites: Value, start: Value, end: Value) -> UpdateRequest {
        UpdateRequest {
            output: CHART_OUTPUT.key(),
            inputs: vec![
                input(SITES_INPUT, sites),
                input(START_DATE_INPUT, start),
                input(END_DATE_INPUT, end),
            ],
            seq: Some(1),
        }
    }

    fn state(db: MockDatabase) -> AppState {
        AppState::new(
            ConnectionProvider::from_connection(db.into_connection()),
            Config::with_defaults("postgres://localhost/test"),
            page_for_sites(&[]),
        )
    }

    fn reading_row(
        site_id: i32,
        name: &str,
        time: i64,
        reading: f64,
    ) -> BTreeMap<&'static str, sea_orm::Value> {
        BTreeMap::from([
            ("site_id", site_id.into()),
            ("name", name.into()),
            ("time", time.into()),
            ("reading", reading.into()),
        ])
    }

    #[test]
    fn selection_accepts_single_id_or_list() {
        let single =
            QuerySelection::from_inputs(&request(json!(3), json!(null), json!(null)).inputs)
                .unwrap();
        assert_eq!(single.site_ids, BTreeSet::from([3]));

        let many = QuerySelection::from_inputs(
            &request(json!([2, 1, 2]), json!("2020-12-01"), json!("2020-12-31T00:00:00")).inputs,
        )
        .unwrap();
        assert_eq!(many.site_ids, BTreeSet::from([1, 2]));
        assert_eq!(
            many.date_range(),
            Some((
                NaiveDate::from_ymd_opt(2020, 12, 1).unwrap(),
                NaiveDate::from_ymd_opt(2020, 12, 31).unwrap()
            ))
        );
    }

    #[test]
    fn selection_rejects_non_integer_ids() {
        for bad in [
            json!("1; DROP TABLE sites"),
            json!([1, 2.5]),
            json!({"id": 1}),
            json!(1_i64 << 40),
        ] {
            let err = QuerySelection::from_inputs(&request(bad, json!(null), json!(null)).inputs)
                .unwrap_err();
            assert!(matches!(err, AppError::Validation(_)));
        }
    }

    #[test]
    fn selection_rejects_malformed_dates() {
        let inputs = request(json!(1), json!("12/01/2020"), json!(null)).inputs;
        let err = QuerySelection::from_inputs(&inputs).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn dashboard_registry_wiring() {
        let deps = CallbackRegistry::dashboard().dependencies();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].output, "time_series_chart_col.children");
        assert_eq!(
            deps[0].inputs,
            vec![
                "types_dropdown.value",
                "date_picker.start_date",
                "date_picker.end_date"
            ]
        );
    }

    #[tokio::test]
    async fn missing_dates_prompt_without_connecting() {
        let state = state(MockDatabase::new(DatabaseBackend::Postgres));
        let scope = state.db.scope();

        let panel = state
            .callbacks
            .dispatch(&state, &scope, &request(json!([1]), json!(null), json!("2020-12-01")))
            .await
            .unwrap();
        assert!(matches!(panel, ChartPanel::Prompt { .. }));
        assert!(!scope.is_open());
    }

    #[tokio::test]
    async fn invalid_selection_renders_error_panel_without_connecting() {
        let state = state(MockDatabase::new(DatabaseBackend::Postgres));

        for req in [
            request(json!([]), json!("2020-12-01"), json!("2020-12-31")),
            request(json!([1]), json!("2020-12-31"), json!("2020-12-01")),
        ] {
            let scope = state.db.scope();
            let panel = state.callbacks.dispatch(&state, &scope, &req).await.unwrap();
            match panel {
                ChartPanel::Error { kind, .. } => assert_eq!(kind, "validation"),
                other => panic!("expected error panel, got {other:?}"),
            }
            assert!(!scope.is_open());
        }
    }

    #[tokio::test]
    async fn unknown_output_and_missing_inputs_are_protocol_errors() {
        let state = state(MockDatabase::new(DatabaseBackend::Postgres));
        let scope = state.db.scope();

        let mut unknown = request(json!([1]), json!(null), json!(null));
        unknown.output = "nowhere.children".to_string();
        assert!(matches!(
            state.callbacks.dispatch(&state, &scope, &unknown).await,
            Err(AppError::NotFound(_))
        ));

        let mut partial = request(json!([1]), json!(null), json!(null));
        partial.inputs.pop();
        assert!(matches!(
            state.callbacks.dispatch(&state, &scope, &partial).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn renders_chart_from_query_results() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).append_query_results([vec![
            reading_row(1, "A", 1_606_780_800, 5.0),
            reading_row(1, "A", 1_606_784_400, 7.0),
        ]]);
        let state = state(db);
        let scope = state.db.scope();

        let panel = state
            .callbacks
            .dispatch(
                &state,
                &scope,
                &request(json!([1]), json!("2020-12-01"), json!("2020-12-01")),
            )
            .await
            .unwrap();
        let ChartPanel::Chart { chart } = panel else {
            panic!("expected chart, got {panel:?}");
        };
        assert_eq!(chart.series.len(), 1);
        assert_eq!(chart.series[0].name, "A");
        assert_eq!(chart.series[0].points.len(), 2);
        assert!(scope.is_open());
        scope.release().await.unwrap();
    }

    #[tokio::test]
    async fn query_failure_renders_error_panel() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_errors([DbErr::Custom(
                "canceling statement due to statement timeout".into(),
            )]);
        let state = state(db);
        let scope = state.db.scope();

        let panel = state
            .callbacks
            .dispatch(
                &state,
                &scope,
                &request(json!([1]), json!("2020-12-01"), json!("2020-12-02")),
            )
            .await
            .unwrap();
        assert_eq!(
            panel,
            ChartPanel::Error {
                kind: "query".to_string(),
                message: "Database error".to_string(),
            }
        );
    }

    fn unreachable_database(_ctx: CallbackContext<'_>) -> BoxFuture<'_, AppResult<ChartPanel>> {
        Box::pin(async { Err(AppError::Connection("connection refused".to_string())) })
    }

    #[tokio::test]
    async fn connection_failure_renders_error_panel() {
        let state = state(MockDatabase::new(DatabaseBackend::Postgres));
        let scope = state.db.scope();
        let mut registry = CallbackRegistry::new();
        registry.register(
            CHART_OUTPUT,
            vec![SITES_INPUT, START_DATE_INPUT, END_DATE_INPUT],
            unreachable_database,
        );

        let panel = registry
            .dispatch(
                &state,
                &scope,
                &request(json!([1]), json!("2020-12-01"), json!("2020-12-02")),
            )
            .await
            .unwrap();
        let expected = ChartPanel::Error {
            kind: "connection".to_string(),
            message: "Database unavailable".to_string(),
        };
        assert_eq!(panel, expected);
        assert_eq!(
            ChartPanel::from_error(&AppError::Connection("pool timed out".to_string())),
            expected
        );
    }

    #[tokio::test]
    async fn render_time_series_is_framework_free() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![
                reading_row(1, "A", 1_606_784_400, 7.0),
                reading_row(2, "A", 1_606_780_800, 5.0),
            ]])
            .into_connection();

        let chart = render_time_series(
            &db,
            &BTreeSet::from([1, 2]),
            NaiveDate::from_ymd_opt(2020, 12, 1).unwrap(),
            NaiveDate::from_ymd_opt(2020, 12, 1).unwrap(),
            &ChartSettings::default(),
        )
        .await
        .unwrap();

        assert_eq!(chart.series.len(), 1);
        let times: Vec<i64> = chart.series[0].points.iter().map(|p| p.time.timestamp()).collect();
        assert_eq!(times, vec![1_606_780_800, 1_606_784_400]);
    }
}

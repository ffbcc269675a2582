//! Static page skeleton, built once at startup.

use chrono::NaiveDate;
use sea_orm::ConnectionTrait;
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::AppResult;
use crate::queries::{list_sites, Site};

pub const PAGE_TITLE: &str = "San Diego BC Data";

pub const SITE_SELECT_ID: &str = "types_dropdown";
pub const DATE_PICKER_ID: &str = "date_picker";
pub const CHART_REGION_ID: &str = "time_series_chart_col";

const DATA_SOURCE_URL: &str =
    "https://www.sandiegocounty.gov/content/sdc/apcd/en/CurrentAirQuality.html";
const EPA_BLACK_CARBON_URL: &str =
    "https://www.epa.gov/sites/production/files/2013-12/documents/black-carbon-fact-sheet_0.pdf";

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct NavLink {
    pub label: String,
    pub href: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Navbar {
    pub brand: String,
    pub brand_href: String,
    pub links: Vec<NavLink>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SelectOption {
    pub label: String,
    pub value: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct MultiSelect {
    pub id: String,
    pub label: String,
    pub options: Vec<SelectOption>,
    /// Initially selected site ids
    pub value: Vec<i32>,
    pub multi: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct DateRangePicker {
    pub id: String,
    pub label: String,
    pub min_date_allowed: NaiveDate,
    pub max_date_allowed: NaiveDate,
    pub initial_visible_month: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Placeholder {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PageSpec {
    pub title: String,
    pub navbar: Navbar,
    pub site_select: MultiSelect,
    pub date_range: DateRangePicker,
    pub chart_region: Placeholder,
}

// Range covered by the archived data set.
#[must_use]
pub fn min_date_allowed() -> NaiveDate {
    NaiveDate::from_ymd_opt(2019, 10, 1).unwrap_or_default()
}

#[must_use]
pub fn max_date_allowed() -> NaiveDate {
    NaiveDate::from_ymd_opt(2021, 1, 31).unwrap_or_default()
}

fn initial_visible_month() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 12, 1).unwrap_or_default()
}

fn navbar() -> Navbar {
    Navbar {
        brand: "Home".to_string(),
        brand_href: "/".to_string(),
        links: vec![
            NavLink {
                label: "Data Source".to_string(),
                href: DATA_SOURCE_URL.to_string(),
            },
            NavLink {
                label: "EPA Black Carbon Info".to_string(),
                href: EPA_BLACK_CARBON_URL.to_string(),
            },
        ],
    }
}

/// Assemble the page from an already loaded site catalog.
///
/// The first site is the default selection; an empty catalog yields an empty
/// selection rather than an error.
#[must_use]
pub fn page_for_sites(sites: &[Site]) -> PageSpec {
    PageSpec {
        title: PAGE_TITLE.to_string(),
        navbar: navbar(),
        site_select: MultiSelect {
            id: SITE_SELECT_ID.to_string(),
            label: "Location of Sensors".to_string(),
            options: sites
                .iter()
                .map(|s| SelectOption {
                    label: s.name.clone(),
                    value: s.id,
                })
                .collect(),
            value: sites.first().map(|s| s.id).into_iter().collect(),
            multi: true,
        },
        date_range: DateRangePicker {
            id: DATE_PICKER_ID.to_string(),
            label: "Date Selector".to_string(),
            min_date_allowed: min_date_allowed(),
            max_date_allowed: max_date_allowed(),
            initial_visible_month: initial_visible_month(),
        },
        chart_region: Placeholder {
            id: CHART_REGION_ID.to_string(),
        },
    }
}

/// Load the site catalog and build the page. Called once at startup; any
/// error here should abort the process.
pub async fn build_layout<C: ConnectionTrait>(conn: &C) -> AppResult<PageSpec> {
    let sites = list_sites(conn).await?;
    if sites.is_empty() {
        tracing::warn!("Site catalog is empty; the selector will have no options");
    }
    Ok(page_for_sites(&sites))
}

use std::collections::BTreeMap;
use std::env;

#[derive(Debug, Clone)]
pub enum Deployment {
    Local,
    Dev,
    Stage,
    Prod,
}

impl Deployment {
    #[must_use]
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Self::Dev,
            "stage" | "staging" => Self::Stage,
            "prod" | "production" => Self::Prod,
            _ => Self::Local,
        }
    }
}

#[derive(Clone)]
pub struct Config {
    // Database
    pub database_url: String,
    pub db_max_connections: u32,
    pub run_migrations: bool,

    // Session signing secret, opaque
    pub secret_key: Option<String>,

    // API settings
    pub api_host: String,
    pub api_port: u16,

    // Rate limiting
    pub disable_rate_limiting: bool,
    pub rate_limit_per_second: u64,
    pub rate_limit_burst: u32,

    // Chart
    pub chart_y_axis_label: String,
    pub series_colors: BTreeMap<String, String>,

    // Application metadata
    pub deployment: Deployment,
}

// Hand-written so the database password and secret key never reach the logs.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("db_max_connections", &self.db_max_connections)
            .field("run_migrations", &self.run_migrations)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .field("api_host", &self.api_host)
            .field("api_port", &self.api_port)
            .field("disable_rate_limiting", &self.disable_rate_limiting)
            .field("chart_y_axis_label", &self.chart_y_axis_label)
            .field("series_colors", &self.series_colors)
            .field("deployment", &self.deployment)
            .finish_non_exhaustive()
    }
}

pub const DEFAULT_Y_AXIS_LABEL: &str = "Black Carbon (µg/m³)";

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if required environment variables are not set,
    /// and `ConfigError::Invalid` if `SERIES_COLORS` cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            // Database
            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,
            db_max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            run_migrations: env::var("RUN_MIGRATIONS")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),

            secret_key: env::var("SECRET_KEY").ok().filter(|s| !s.is_empty()),

            // API settings
            api_host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            api_port: env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .unwrap_or(3000),

            // Rate limiting
            disable_rate_limiting: env::var("DISABLE_RATE_LIMITING")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
            rate_limit_per_second: env::var("RATE_LIMIT_PER_SECOND")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),
            rate_limit_burst: env::var("RATE_LIMIT_BURST")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),

            // Chart
            chart_y_axis_label: env::var("CHART_Y_AXIS_LABEL")
                .unwrap_or_else(|_| DEFAULT_Y_AXIS_LABEL.to_string()),
            series_colors: parse_series_colors(&env::var("SERIES_COLORS").unwrap_or_default())?,

            // Application metadata
            deployment: Deployment::from_str(
                &env::var("DEPLOYMENT").unwrap_or_else(|_| "local".to_string()),
            ),
        })
    }

    /// Configuration with every optional setting at its default.
    #[must_use]
    pub fn with_defaults(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            db_max_connections: 10,
            run_migrations: false,
            secret_key: None,
            api_host: "0.0.0.0".to_string(),
            api_port: 3000,
            disable_rate_limiting: false,
            rate_limit_per_second: 5,
            rate_limit_burst: 30,
            chart_y_axis_label: DEFAULT_Y_AXIS_LABEL.to_string(),
            series_colors: BTreeMap::new(),
            deployment: Deployment::Local,
        }
    }

    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }
}

/// Parse `Name=#rrggbb` pairs separated by `;` into a name to color map.
///
/// Blank entries are skipped, so a trailing `;` is fine.
///
/// # Errors
///
/// Returns `ConfigError::Invalid` when a pair has no `=` or an empty side.
pub fn parse_series_colors(raw: &str) -> Result<BTreeMap<String, String>, ConfigError> {
    let mut colors = BTreeMap::new();
    for entry in raw.split(';').map(str::trim).filter(|e| !e.is_empty()) {
        let (name, color) = entry
            .split_once('=')
            .map(|(n, c)| (n.trim(), c.trim()))
            .filter(|(n, c)| !n.is_empty() && !c.is_empty())
            .ok_or_else(|| {
                ConfigError::Invalid("SERIES_COLORS", format!("expected Name=color, got '{entry}'"))
            })?;
        colors.insert(name.to_string(), color.to_string());
    }
    Ok(colors)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn series_colors_parse_pairs() {
        let colors = parse_series_colors("Chula Vista=#1f77b4; El Cajon = #ff7f0e;").unwrap();
        assert_eq!(colors.len(), 2);
        assert_eq!(colors["Chula Vista"], "#1f77b4");
        assert_eq!(colors["El Cajon"], "#ff7f0e");
    }

    #[test]
    fn series_colors_empty_is_ok() {
        assert!(parse_series_colors("").unwrap().is_empty());
        assert!(parse_series_colors(" ; ").unwrap().is_empty());
    }

    #[test]
    fn series_colors_reject_malformed() {
        assert!(matches!(
            parse_series_colors("Chula Vista"),
            Err(ConfigError::Invalid("SERIES_COLORS", _))
        ));
        assert!(parse_series_colors("=#fff").is_err());
    }

    #[test]
    fn deployment_aliases() {
        assert!(matches!(Deployment::from_str("Production"), Deployment::Prod));
        assert!(matches!(Deployment::from_str("staging"), Deployment::Stage));
        assert!(matches!(Deployment::from_str("anything"), Deployment::Local));
    }
}

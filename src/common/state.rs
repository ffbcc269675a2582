use std::sync::Arc;

use crate::callbacks::CallbackRegistry;
use crate::chart::ChartSettings;
use crate::config::Config;
use crate::database::ConnectionProvider;
use crate::layout::PageSpec;

#[derive(Clone)]
pub struct AppState {
    pub db: ConnectionProvider,
    pub config: Arc<Config>,
    /// Built once at startup from the site catalog.
    pub page: Arc<PageSpec>,
    pub chart: Arc<ChartSettings>,
    pub callbacks: Arc<CallbackRegistry>,
}

impl AppState {
    pub fn new(db: ConnectionProvider, config: Config, page: PageSpec) -> Self {
        let chart = ChartSettings::from_config(&config);

        Self {
            db,
            config: Arc::new(config),
            page: Arc::new(page),
            chart: Arc::new(chart),
            callbacks: Arc::new(CallbackRegistry::dashboard()),
        }
    }
}

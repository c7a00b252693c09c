//! Module bootstrap

use crate::config::Config;
use crate::error::DbResult;
use crate::executor::Executor;
use crate::metadata::{install, registry, Registry};
use crate::searcher::{SearchOptions, Searcher};
use anyhow::Result;
use parking_lot::RwLock;
use std::sync::Arc;

/// Data access module: owns the configuration and the installed table registry
pub struct DataModule {
    config: RwLock<Config>,
    registry: RwLock<Option<Arc<Registry>>>,
}

impl Default for DataModule {
    fn default() -> Self {
        Self {
            config: RwLock::new(Config::default()),
            registry: RwLock::new(None),
        }
    }
}

impl DataModule {
    /// Store the configuration and, when a metadata file is configured, install
    /// its tables as the process-wide registry
    pub fn init(&self, config: Config) -> Result<()> {
        if let Some(path) = &config.tables_file {
            let installed = install(Registry::load(path)?);
            *self.registry.write() = Some(installed);
        }

        tracing::info!(
            tables_file = ?config.tables_file,
            fan_out_concurrency = config.fan_out_concurrency,
            show_deleted = config.show_deleted,
            "Data module initialized"
        );
        *self.config.write() = config;
        Ok(())
    }

    pub fn config(&self) -> Config {
        self.config.read().clone()
    }

    pub fn options(&self) -> SearchOptions {
        SearchOptions::from(&*self.config.read())
    }

    /// Searcher over the module's registry, falling back to the process-wide one
    pub fn searcher<'a>(&self, db: &'a dyn Executor, table: &str) -> DbResult<Searcher<'a>> {
        let registry = match self.registry.read().clone() {
            Some(registry) => registry,
            None => registry()?,
        };
        Ok(Searcher::with_registry(db, registry, table).with_options(self.options()))
    }
}

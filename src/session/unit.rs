use super::unit_of_work::UnitOfWork;
use crate::config::PersistenceConfig;
use crate::core::Result;
use crate::facade::DataSource;
use crate::metadata::Metamodel;
use std::sync::Arc;

/// A metamodel bound to a data source. Cheap to clone; every
/// [`UnitOfWork`] it opens runs in its own transaction.
#[derive(Clone)]
pub struct PersistenceUnit {
    model: Arc<Metamodel>,
    source: Arc<dyn DataSource>,
    config: PersistenceConfig,
}

impl PersistenceUnit {
    pub fn new(model: Metamodel, source: Arc<dyn DataSource>, config: PersistenceConfig) -> Self {
        Self {
            model: Arc::new(model),
            source,
            config,
        }
    }

    pub fn metamodel(&self) -> &Metamodel {
        &self.model
    }

    pub fn config(&self) -> &PersistenceConfig {
        &self.config
    }

    pub fn data_source(&self) -> &Arc<dyn DataSource> {
        &self.source
    }

    /// Create the mapped tables that do not exist yet.
    pub async fn create_schema(&self) -> Result<()> {
        for schema in self.model.table_schemas()? {
            if self.source.table_exists(schema.name()).await {
                continue;
            }
            log::debug!("Creating table {}", schema.name());
            self.source.create_table(schema).await?;
        }
        Ok(())
    }

    pub async fn open(&self) -> Result<UnitOfWork> {
        UnitOfWork::begin(self.model.clone(), self.source.clone(), self.config.clone()).await
    }
}

impl std::fmt::Debug for PersistenceUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceUnit")
            .field("name", &self.config.unit_name)
            .field("entities", &self.model.entities().count())
            .finish()
    }
}

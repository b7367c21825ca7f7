//! Dataset and config loaded for one invocation.
//!
//! The dataset is materialized into a `MemoryStore` plus its lookup
//! providers; after a writing command the committed state is folded back
//! into the dataset and saved over the original file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use nomen_core::{EntityIdentifier, RecordStore, Result};
use nomen_engine::{
    KeyDeriver, MigrationOptions, MigrationSummary, Naming, NamingContext, NomenConfig,
    RenameEngine, CONFIG_FILE_NAME,
};
use nomen_storage::{Dataset, LockingMode, MemoryStore, StaticCatalog};

/// Default dataset file name.
pub const DEFAULT_DATA_FILE: &str = "nomen.json";

/// Loaded dataset, providers, and config.
pub struct Workspace {
    data_path: PathBuf,
    dataset: Dataset,
    store: MemoryStore,
    catalog: StaticCatalog,
    deriver: KeyDeriver,
    config: NomenConfig,
}

impl Workspace {
    /// Load the dataset and config.
    ///
    /// An explicit config path must exist; otherwise `nomen.toml` is used
    /// when present and built-in defaults when not.
    pub fn open(data: Option<&str>, config: Option<&str>) -> Result<Self> {
        let config = match config {
            Some(path) => NomenConfig::from_file(Path::new(path))?,
            None if Path::new(CONFIG_FILE_NAME).exists() => {
                NomenConfig::from_file(Path::new(CONFIG_FILE_NAME))?
            }
            None => NomenConfig::default(),
        };

        let data_path = PathBuf::from(data.unwrap_or(DEFAULT_DATA_FILE));
        let dataset = Dataset::load(&data_path)?;
        let loaded = dataset.materialize(LockingMode::Strict)?;
        let deriver = KeyDeriver::new(Arc::new(loaded.directory))
            .with_default_group(config.default_group.clone());

        Ok(Self {
            data_path,
            dataset,
            store: loaded.store,
            catalog: loaded.catalog,
            deriver,
            config,
        })
    }

    /// Effective configuration.
    pub fn config(&self) -> &NomenConfig {
        &self.config
    }

    /// Run a migration for one entity type.
    pub fn migrate(&self, entity_type: &str, options: &MigrationOptions) -> Result<MigrationSummary> {
        let profile = self.config.profile(entity_type)?;
        RenameEngine::new(&self.store, &self.catalog, &self.deriver).migrate(&profile, options)
    }

    fn naming(&self, entity_type: &str) -> Result<Naming<'_>> {
        let profile = self.config.profile(entity_type)?;
        Ok(Naming::new(&self.deriver, profile)
            .with_padding(self.config.padding)
            .with_initial_value(self.config.initial_value))
    }

    /// Create a record with a freshly assigned identifier.
    pub fn create(&self, entity_type: &str, ctx: &NamingContext) -> Result<EntityIdentifier> {
        self.naming(entity_type)?
            .create_entity(&self.store, ctx, BTreeMap::new())
    }

    /// Allocate the next identifier and commit the counter.
    pub fn next(&self, entity_type: &str, ctx: &NamingContext) -> Result<EntityIdentifier> {
        let naming = self.naming(entity_type)?;
        let mut txn = self.store.begin()?;
        let identifier = naming.generate_identifier(txn.as_mut(), ctx)?;
        txn.commit()?;
        Ok(identifier)
    }

    /// Write committed records and counters back to the dataset file.
    pub fn save(&mut self) -> Result<()> {
        self.dataset.refresh_from(&self.store);
        self.dataset.save(&self.data_path)
    }
}

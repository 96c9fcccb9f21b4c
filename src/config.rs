//! Store configuration.
//!
//! A configuration file carries the schema declarations and dispatcher
//! tuning:
//!
//! ```json
//! {
//!   "schemas": {
//!     "articles": {"author": "users", "comments": ["comments"]},
//!     "comments": {"commenter": "users"},
//!     "users": {}
//!   },
//!   "dispatcher": {"stream_capacity": 64}
//! }
//! ```

use serde::{Deserialize, Serialize};

pub use crate::dispatch::DispatcherConfig;

use crate::dispatch::StoreDispatcher;
use crate::error::{ConfigError, StoreResult};
use crate::schema::SchemaMap;
use crate::store::EntityStore;

/// Full store configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Entity type declarations.
    pub schemas: SchemaMap,
    /// Dispatcher tuning.
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
}

impl StoreConfig {
    /// Creates a configuration with default dispatcher settings.
    #[must_use]
    pub fn new(schemas: SchemaMap) -> Self {
        Self {
            schemas,
            dispatcher: DispatcherConfig::default(),
        }
    }

    /// Parses a configuration from JSON.
    ///
    /// # Errors
    /// Returns `ConfigError::Parse` on malformed input. Schema consistency is
    /// checked later, when a store is built.
    pub fn from_json(s: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(s).map_err(|e| ConfigError::Parse {
            message: format!("store config: {e}"),
        })
    }

    /// Builds an empty store from the declarations.
    ///
    /// # Errors
    /// Returns a configuration error for inconsistent declarations.
    pub fn build_store(&self) -> StoreResult<EntityStore> {
        EntityStore::new(self.schemas.clone())
    }

    /// Builds a dispatcher owning an empty store.
    ///
    /// # Errors
    /// Returns a configuration error for inconsistent declarations.
    pub fn build_dispatcher(&self) -> StoreResult<StoreDispatcher> {
        Ok(StoreDispatcher::new(
            self.build_store()?,
            self.dispatcher.clone(),
        ))
    }
}

//! Process-wide collaborators, built once at start-up.

use std::sync::Arc;

use anyhow::Result;
use upsell_advisor_core::completion::CompletionClient;
use upsell_advisor_core::models::Collaborator;
use upsell_advisor_core::store::RecordStore;

use crate::config::Config;
use crate::llm::create_completion_client;
use crate::supabase::create_record_store;

/// Shared, read-only application context.
///
/// Handlers receive it as `Arc<AppContext>`; tests build one directly
/// with in-memory collaborators.
pub struct AppContext {
    pub config: Config,
    pub store: Collaborator<dyn RecordStore>,
    pub completion: Collaborator<dyn CompletionClient>,
}

impl AppContext {
    /// Build concrete collaborators from configuration and the process
    /// environment.
    pub fn from_config(config: Config) -> Result<Self> {
        let lookup = |key: &str| std::env::var(key).ok();
        let store = create_record_store(&config.store, lookup)?;
        let completion = create_completion_client(&config.completion, lookup)?;
        Ok(Self {
            config,
            store,
            completion,
        })
    }

    pub fn new(
        config: Config,
        store: Collaborator<dyn RecordStore>,
        completion: Collaborator<dyn CompletionClient>,
    ) -> Self {
        Self {
            config,
            store,
            completion,
        }
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

//! Command-line interface.

pub mod commands;
pub mod output;
pub mod types;

pub use types::{Cli, Commands};

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::adapters::sqlite::{database_url, initialize_database, PoolConfig, SqliteCaseStore};
use crate::domain::models::{CaseId, Config};
use crate::domain::ports::CaseStore;
use crate::infrastructure::config::ConfigLoader;

/// Load configuration from an explicit file or the project hierarchy.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

/// Open the configured SQLite store, migrating it if needed.
pub async fn open_store(config: &Config) -> Result<Arc<SqliteCaseStore>> {
    let url = database_url(&config.database.path);
    let pool = initialize_database(&url, Some(PoolConfig::from(&config.database)))
        .await
        .with_context(|| format!("Failed to open database at {}", config.database.path))?;
    Ok(Arc::new(SqliteCaseStore::new(pool)))
}

/// Resolve a full case id or a unique prefix of one.
pub async fn resolve_case_id(store: &dyn CaseStore, id: &str) -> Result<CaseId> {
    if let Ok(uuid) = uuid::Uuid::parse_str(id) {
        return Ok(uuid);
    }
    let prefix = id.to_lowercase();
    let matches: Vec<CaseId> = store
        .list_cases()
        .await?
        .into_iter()
        .map(|c| c.id)
        .filter(|case_id| case_id.to_string().starts_with(&prefix))
        .collect();

    match matches.as_slice() {
        [single] => Ok(*single),
        [] => anyhow::bail!("No case matches '{id}'"),
        _ => anyhow::bail!("'{id}' matches {} cases; use a longer prefix", matches.len()),
    }
}

/// Report a command failure and exit non-zero.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let chain: Vec<String> = err.chain().map(ToString::to_string).collect();
        let body = serde_json::json!({ "error": err.to_string(), "causes": chain });
        println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("Error: {err:#}");
    }
    std::process::exit(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::in_memory::InMemoryCaseStore;
    use crate::domain::models::{Case, PhaseState};

    #[tokio::test]
    async fn test_resolve_case_id_by_prefix() {
        let store = InMemoryCaseStore::new();
        let case = Case::new("slow login");
        store.create_case(&case, &PhaseState::default()).await.unwrap();

        let full = case.id.to_string();
        assert_eq!(resolve_case_id(&store, &full).await.unwrap(), case.id);
        assert_eq!(resolve_case_id(&store, &full[..8]).await.unwrap(), case.id);
        assert!(resolve_case_id(&store, "zzzz").await.is_err());
    }
}

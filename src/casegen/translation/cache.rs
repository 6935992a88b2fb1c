// SPDX-License-Identifier: MIT

//! Per-language label lookup tables

use crate::adk::error::CasegenError;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tokio::sync::RwLock;

type Table = HashMap<String, String>;

/// Table key for a language name: trimmed, lowercased
pub fn language_key(language: &str) -> String {
    language.trim().to_lowercase()
}

/// Source label to translated label, per target language
///
/// Owned by the caller and shared across runs; persisted as YAML
/// (`language -> {source label: translated label}`). Languages are keyed by
/// [`language_key`], so `German` and ` german` share a table.
#[derive(Debug, Default)]
pub struct TranslationCache {
    tables: RwLock<HashMap<String, Table>>,
}

impl TranslationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tables(tables: HashMap<String, Table>) -> Self {
        let mut merged: HashMap<String, Table> = HashMap::new();
        for (language, table) in tables {
            merged.entry(language_key(&language)).or_default().extend(table);
        }
        Self {
            tables: RwLock::new(merged),
        }
    }

    pub fn parse_yaml(content: &str) -> Result<Self, CasegenError> {
        let tables: Option<HashMap<String, Table>> = serde_yaml::from_str(content)?;
        Ok(Self::from_tables(tables.unwrap_or_default()))
    }

    /// Load tables from `path`; a missing file yields an empty cache
    pub async fn load(path: &Path) -> Result<Self, CasegenError> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                let cache = Self::parse_yaml(&content)?;
                log::info!(
                    "[Translation] Loaded {} label tables from {}",
                    cache.tables.read().await.len(),
                    path.display()
                );
                Ok(cache)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("[Translation] No cache at {}, starting empty", path.display());
                Ok(Self::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write all tables to `path`, sorted for stable diffs
    pub async fn save(&self, path: &Path) -> Result<(), CasegenError> {
        let sorted: BTreeMap<String, BTreeMap<String, String>> = self
            .tables
            .read()
            .await
            .iter()
            .map(|(language, table)| {
                let table: BTreeMap<String, String> =
                    table.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                (language.clone(), table)
            })
            .collect();
        let content = serde_yaml::to_string(&sorted)?;
        tokio::fs::write(path, content).await?;
        log::debug!("[Translation] Saved cache to {}", path.display());
        Ok(())
    }

    pub async fn lookup(&self, language: &str, label: &str) -> Option<String> {
        self.tables
            .read()
            .await
            .get(&language_key(language))
            .and_then(|table| table.get(label))
            .cloned()
    }

    /// Source label whose translation into `language` is `translated`
    pub async fn reverse_lookup(&self, language: &str, translated: &str) -> Option<String> {
        self.tables.read().await.get(&language_key(language)).and_then(|table| {
            table
                .iter()
                .filter(|(_, t)| t.as_str() == translated)
                .map(|(source, _)| source)
                .min()
                .cloned()
        })
    }

    /// Known translations for `labels`; missing labels are absent from the result
    pub async fn lookup_many(&self, language: &str, labels: &[String]) -> Table {
        let tables = self.tables.read().await;
        let Some(table) = tables.get(&language_key(language)) else {
            return Table::new();
        };
        labels
            .iter()
            .filter_map(|label| table.get(label).map(|t| (label.clone(), t.clone())))
            .collect()
    }

    pub async fn insert_all(&self, language: &str, entries: &Table) {
        let mut tables = self.tables.write().await;
        let table = tables.entry(language_key(language)).or_default();
        for (source, translated) in entries {
            table.insert(source.clone(), translated.clone());
        }
    }

    /// Number of entries for `language`
    pub async fn len(&self, language: &str) -> usize {
        self.tables
            .read()
            .await
            .get(&language_key(language))
            .map_or(0, HashMap::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(entries: &[(&str, &str)]) -> Table {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_lookup_and_reverse_lookup() {
        let cache = TranslationCache::new();
        cache
            .insert_all("German", &table(&[("Onset", "Beginn"), ("Pain", "Schmerz")]))
            .await;

        assert_eq!(cache.lookup("German", "Onset").await.as_deref(), Some("Beginn"));
        assert!(cache.lookup("French", "Onset").await.is_none());
        assert_eq!(
            cache.reverse_lookup("German", "Schmerz").await.as_deref(),
            Some("Pain")
        );
        assert!(cache.reverse_lookup("German", "Fieber").await.is_none());
        assert_eq!(cache.len("German").await, 2);
    }

    #[tokio::test]
    async fn test_lookup_many_returns_known_subset() {
        let cache = TranslationCache::from_tables(
            [("German".to_string(), table(&[("Onset", "Beginn")]))]
                .into_iter()
                .collect(),
        );
        let labels = vec!["Onset".to_string(), "Course".to_string()];

        let found = cache.lookup_many("German", &labels).await;
        assert_eq!(found, table(&[("Onset", "Beginn")]));
        assert!(cache.lookup_many("Spanish", &labels).await.is_empty());
    }

    #[tokio::test]
    async fn test_yaml_parsing() {
        let cache = TranslationCache::parse_yaml("German:\n  Onset: Beginn\n").unwrap();
        assert_eq!(cache.lookup("German", "Onset").await.as_deref(), Some("Beginn"));

        let empty = TranslationCache::parse_yaml("").unwrap();
        assert_eq!(empty.len("German").await, 0);

        assert!(TranslationCache::parse_yaml("- not\n- a map\n").is_err());
    }

    #[tokio::test]
    async fn test_language_names_share_a_table() {
        let cache = TranslationCache::new();
        cache.insert_all("German", &table(&[("Onset", "Beginn")])).await;
        cache.insert_all(" german ", &table(&[("Pain", "Schmerz")])).await;

        assert_eq!(cache.len("GERMAN").await, 2);
        assert_eq!(cache.lookup("german", "Onset").await.as_deref(), Some("Beginn"));
        assert_eq!(
            cache.reverse_lookup("German", "Schmerz").await.as_deref(),
            Some("Pain")
        );

        let loaded = TranslationCache::parse_yaml(
            "German:\n  Onset: Beginn\ngerman:\n  Pain: Schmerz\n",
        )
        .unwrap();
        assert_eq!(loaded.len("German").await, 2);
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let path =
            std::env::temp_dir().join(format!("casegen-cache-{}.yaml", uuid::Uuid::new_v4()));
        let cache = TranslationCache::new();
        cache
            .insert_all("German", &table(&[("Pain", "Schmerz"), ("Onset", "Beginn")]))
            .await;
        cache.save(&path).await.unwrap();

        let loaded = TranslationCache::load(&path).await.unwrap();
        assert_eq!(loaded.lookup("German", "Pain").await.as_deref(), Some("Schmerz"));
        assert_eq!(loaded.len("German").await, 2);

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let path =
            std::env::temp_dir().join(format!("casegen-missing-{}.yaml", uuid::Uuid::new_v4()));
        let cache = TranslationCache::load(&path).await.unwrap();
        assert_eq!(cache.len("German").await, 0);
    }
}

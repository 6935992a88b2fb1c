// SPDX-License-Identifier: MIT

//! Translation of a finished case into another language
//!
//! A linear three-node graph: categorical labels and short list entries go
//! through the [`TranslationCache`] first, with the model only asked for
//! labels the cache does not know; everything else is translated in one call
//! against the whole case.

pub mod cache;

pub use cache::{language_key, TranslationCache};

use crate::adk::error::{CallError, CasegenError, WorkflowError};
use crate::adk::retry::{retry, RetryPolicy};
use crate::casegen::collaborators::Translator;
use crate::casegen::config::{LabelPath, TranslationFields};
use crate::casegen::decode::{decode, CaseSchema, MappingSchema};
use crate::casegen::types::Case;
use crate::casegen::workflow::graph::{Graph, GraphBuilder, Node, END, START};
use crate::casegen::workflow::state::{
    FieldType, ReducerType, StateSchema, StateUpdate, WorkflowState,
};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

const CASE: &str = "case";
const LANGUAGE: &str = "language";

pub const TRANSLATE_LABELS: &str = "translate_labels";
pub const TRANSLATE_LISTS: &str = "translate_lists";
pub const TRANSLATE_VALUES: &str = "translate_values";

/// Everything the translation nodes share
struct Context {
    translator: Arc<dyn Translator>,
    cache: Arc<TranslationCache>,
    fields: TranslationFields,
    source_language: String,
    retry: RetryPolicy,
}

impl Context {
    /// Translations for `labels` into `language`, asking the model only for
    /// labels missing from the cache
    async fn label_mapping(
        &self,
        labels: BTreeSet<String>,
        language: &str,
    ) -> Result<HashMap<String, String>, CasegenError> {
        let labels: Vec<String> = labels.into_iter().collect();
        let mut mapping = self.cache.lookup_many(language, &labels).await;
        let missing: Vec<String> = labels
            .into_iter()
            .filter(|label| !mapping.contains_key(label))
            .collect();
        if missing.is_empty() {
            log::debug!("[Translation] All {} labels cached", mapping.len());
            return Ok(mapping);
        }

        log::info!(
            "[Translation] Asking model for {} uncached labels into {}",
            missing.len(),
            language
        );
        let fetched = self
            .fetch_mapping(&missing, &self.source_language, language)
            .await?;
        self.cache.insert_all(language, &fetched).await;
        mapping.extend(fetched);
        Ok(mapping)
    }

    async fn fetch_mapping(
        &self,
        labels: &[String],
        source: &str,
        target: &str,
    ) -> Result<HashMap<String, String>, CasegenError> {
        let translator = &self.translator;
        let schema = &MappingSchema {
            expected: labels.to_vec(),
        };
        let mapping = retry(self.retry, "label translation", move || async move {
            let raw = translator.translate_labels(labels, source, target).await?;
            Ok::<_, CallError>(decode(&raw, schema)?)
        })
        .await?;
        Ok(mapping)
    }
}

fn case_and_language(state: &WorkflowState) -> Result<(Case, String), CasegenError> {
    Ok((state.require(CASE)?, state.require(LANGUAGE)?))
}

/// String labels at `path` in `case`
fn labels_at(case: &Case, path: &LabelPath) -> Vec<String> {
    let Some(Value::Array(items)) = case.get(&path.field) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| item.get(&path.key).and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}

fn strings_in(case: &Case, field: &str) -> Vec<String> {
    let Some(Value::Array(items)) = case.get(field) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect()
}

fn translated(mapping: &HashMap<String, String>, value: &mut Value) {
    if let Some(text) = value.as_str() {
        if let Some(translation) = mapping.get(text) {
            *value = Value::String(translation.clone());
        }
    }
}

/// Categorical labels, e.g. each `anamnesis[].category`
struct LabelsNode(Arc<Context>);

#[async_trait]
impl Node for LabelsNode {
    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, CasegenError> {
        let (case, language) = case_and_language(state)?;
        let labels: BTreeSet<String> = self
            .0
            .fields
            .labels
            .iter()
            .flat_map(|path| labels_at(&case, path))
            .collect();
        if labels.is_empty() {
            return Ok(StateUpdate::new());
        }

        let mapping = self.0.label_mapping(labels, &language).await?;
        let mut map = case.into_inner();
        for path in &self.0.fields.labels {
            if let Some(Value::Array(items)) = map.get_mut(&path.field) {
                for item in items.iter_mut() {
                    if let Some(label) = item.get_mut(&path.key) {
                        translated(&mapping, label);
                    }
                }
            }
        }
        Ok(StateUpdate::new().set(CASE, Value::Object(map)))
    }
}

/// Fields holding lists of short strings
struct ListsNode(Arc<Context>);

#[async_trait]
impl Node for ListsNode {
    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, CasegenError> {
        let (case, language) = case_and_language(state)?;
        let entries: BTreeSet<String> = self
            .0
            .fields
            .lists
            .iter()
            .flat_map(|field| strings_in(&case, field))
            .collect();
        if entries.is_empty() {
            return Ok(StateUpdate::new());
        }

        let mapping = self.0.label_mapping(entries, &language).await?;
        let mut map = case.into_inner();
        for field in &self.0.fields.lists {
            if let Some(Value::Array(items)) = map.get_mut(field) {
                items.iter_mut().for_each(|item| translated(&mapping, item));
            }
        }
        Ok(StateUpdate::new().set(CASE, Value::Object(map)))
    }
}

/// Every remaining free-text value, in one model call
struct ValuesNode(Arc<Context>);

#[async_trait]
impl Node for ValuesNode {
    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, CasegenError> {
        let (case, language) = case_and_language(state)?;
        let required: Vec<String> = case.fields().cloned().collect();

        let translator = &self.0.translator;
        let case = &case;
        let source = self.0.source_language.as_str();
        let target = language.as_str();
        let schema = &CaseSchema::new(&required);
        let translated = retry(self.0.retry, "case translation", move || async move {
            let raw = translator.translate_case(case, source, target).await?;
            Ok::<_, CallError>(decode(&raw, schema)?)
        })
        .await?;

        log::info!("[Translation] Case translated into {}", language);
        Ok(StateUpdate::new().set(CASE, translated.to_value()))
    }
}

/// Translates finished cases out of the source language
pub struct TranslationPipeline {
    context: Arc<Context>,
    graph: Graph,
}

impl TranslationPipeline {
    pub fn new(
        translator: Arc<dyn Translator>,
        cache: Arc<TranslationCache>,
        fields: TranslationFields,
        source_language: impl Into<String>,
        retry: RetryPolicy,
    ) -> Result<Self, WorkflowError> {
        let context = Arc::new(Context {
            translator,
            cache,
            fields,
            source_language: source_language.into(),
            retry,
        });

        let schema = StateSchema::new()
            .field(CASE, FieldType::Object, ReducerType::Overwrite)
            .field(LANGUAGE, FieldType::String, ReducerType::Overwrite);
        let graph = GraphBuilder::new("translation", schema)
            .add_node(TRANSLATE_LABELS, Arc::new(LabelsNode(context.clone())))
            .add_node(TRANSLATE_LISTS, Arc::new(ListsNode(context.clone())))
            .add_node(TRANSLATE_VALUES, Arc::new(ValuesNode(context.clone())))
            .add_edge(START, TRANSLATE_LABELS)
            .add_edge(TRANSLATE_LABELS, TRANSLATE_LISTS)
            .add_edge(TRANSLATE_LISTS, TRANSLATE_VALUES)
            .add_edge(TRANSLATE_VALUES, END)
            .compile()?;

        Ok(Self { context, graph })
    }

    pub fn source_language(&self) -> &str {
        &self.context.source_language
    }

    fn is_source(&self, language: &str) -> bool {
        language_key(language) == language_key(&self.context.source_language)
    }

    /// Translate `case` into `language`; the source language is a no-op
    pub async fn translate(&self, case: Case, language: &str) -> Result<Case, CasegenError> {
        if self.is_source(language) {
            log::debug!("[Translation] {} is the source language, nothing to do", language);
            return Ok(case);
        }

        log::info!("[Translation] Translating case into {}", language);
        let mut input = Map::new();
        input.insert(CASE.to_string(), case.to_value());
        input.insert(LANGUAGE.to_string(), json!(language));
        let state = self.graph.execute(self.graph.initial_state(input)).await?;
        Ok(state.require(CASE)?)
    }

    /// Map labels given in `language` back to source-language labels
    ///
    /// Unknown labels are translated by the model and cached in the
    /// source-to-target direction.
    pub async fn to_source_labels(
        &self,
        labels: &[String],
        language: &str,
    ) -> Result<Vec<String>, CasegenError> {
        if labels.is_empty() || self.is_source(language) {
            return Ok(labels.to_vec());
        }

        let cache = &self.context.cache;
        let mut known = HashMap::new();
        let mut missing = Vec::new();
        for label in labels {
            match cache.reverse_lookup(language, label).await {
                Some(source) => {
                    known.insert(label.clone(), source);
                }
                None if !missing.contains(label) => missing.push(label.clone()),
                None => {}
            }
        }

        if !missing.is_empty() {
            log::info!(
                "[Translation] Mapping {} {} labels back to {}",
                missing.len(),
                language,
                self.context.source_language
            );
            let fetched = self
                .context
                .fetch_mapping(&missing, language, &self.context.source_language)
                .await?;
            let inverted: HashMap<String, String> = fetched
                .iter()
                .map(|(translated, source)| (source.clone(), translated.clone()))
                .collect();
            cache.insert_all(language, &inverted).await;
            known.extend(fetched);
        }

        Ok(labels
            .iter()
            .map(|label| known.get(label).cloned().unwrap_or_else(|| label.clone()))
            .collect())
    }
}

//! Field transformation - the per-source-field pipeline executor
//!
//! A [`FieldTransformation`] binds one source field to an ordered list of
//! [`ValueTransformation`]s. The list is private: every edit goes through a
//! mutation method, all of which funnel into one setter that marks the cached
//! preview results dirty and bumps a revision counter observers can watch.
//! Cached results are recomputed on the next read.

use futures::stream::{self, StreamExt};
use futures::FutureExt;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::watch;

use super::cancel::{Cancellation, CANCELLED_MESSAGE};
use super::result::{ResultContext, TransformationResult};
use super::value::ValueTransformation;
use crate::models::{Dataset, FieldDescriptor, Table};

/// Rows transformed concurrently by one `apply_*` call.
const PIPELINE_CONCURRENCY: usize = 16;

pub const MISSING_SOURCE_RECORD: &str = "No source record available for this field";

/// Ordered pipeline of value transformations bound to one source field.
#[derive(Debug)]
pub struct FieldTransformation {
    field: Arc<FieldDescriptor>,
    transformations: Vec<Box<dyn ValueTransformation>>,
    cache: Vec<TransformationResult>,
    dirty: bool,
    revision: watch::Sender<u64>,
}

impl FieldTransformation {
    pub fn new(field: Arc<FieldDescriptor>) -> Self {
        Self::with_transformations(field, Vec::new())
    }

    pub fn with_transformations(field: Arc<FieldDescriptor>, transformations: Vec<Box<dyn ValueTransformation>>) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            field,
            transformations,
            cache: Vec::new(),
            dirty: true,
            revision,
        }
    }

    /// Bind to a field by name only (no value set).
    pub fn for_field_name(name: impl Into<String>) -> Self {
        Self::new(Arc::new(FieldDescriptor::new(name, Default::default())))
    }

    pub fn field(&self) -> &Arc<FieldDescriptor> {
        &self.field
    }

    pub fn field_name(&self) -> &str {
        &self.field.name
    }

    /// Rebind to another descriptor (e.g. the same column of a newly parsed file).
    pub fn set_field(&mut self, field: Arc<FieldDescriptor>) {
        self.field = field;
        self.invalidate();
    }

    pub fn transformations(&self) -> &[Box<dyn ValueTransformation>] {
        &self.transformations
    }

    pub fn is_empty(&self) -> bool {
        self.transformations.is_empty()
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    pub fn add_transformation(&mut self, transformation: Box<dyn ValueTransformation>) {
        let mut list = self.take_list();
        list.push(transformation);
        self.install(list);
    }

    pub fn remove_transformation_at(&mut self, index: usize) -> Option<Box<dyn ValueTransformation>> {
        if index >= self.transformations.len() {
            return None;
        }
        let mut list = self.take_list();
        let removed = list.remove(index);
        self.install(list);
        Some(removed)
    }

    /// Remove every stage matching `predicate`; returns how many were removed.
    pub fn remove_transformation_where<P>(&mut self, mut predicate: P) -> usize
    where
        P: FnMut(&dyn ValueTransformation) -> bool,
    {
        let list = self.take_list();
        let before = list.len();
        let kept: Vec<_> = list.into_iter().filter(|t| !predicate(t.as_ref())).collect();
        let removed = before - kept.len();
        self.install(kept);
        removed
    }

    /// Swap the stage at `index`, returning the previous one.
    pub fn replace_transformation_at(
        &mut self,
        index: usize,
        transformation: Box<dyn ValueTransformation>,
    ) -> Option<Box<dyn ValueTransformation>> {
        if index >= self.transformations.len() {
            return None;
        }
        let mut list = self.take_list();
        let previous = std::mem::replace(&mut list[index], transformation);
        self.install(list);
        Some(previous)
    }

    pub fn clear_transformations(&mut self) {
        self.install(Vec::new());
    }

    pub fn set_transformations(&mut self, transformations: Vec<Box<dyn ValueTransformation>>) {
        self.install(transformations);
    }

    /// Edit one stage's configuration in place.
    ///
    /// This is the only way to reach a stage mutably, so nested edits (even
    /// inside a conditional's branch rules) always invalidate this pipeline.
    pub fn edit_transformation<R>(
        &mut self,
        index: usize,
        edit: impl FnOnce(&mut dyn ValueTransformation) -> R,
    ) -> Option<R> {
        let mut list = self.take_list();
        let outcome = list.get_mut(index).map(|t| edit(t.as_mut()));
        self.install(list);
        outcome
    }

    /// Downcasting variant of [`edit_transformation`](Self::edit_transformation).
    pub fn edit_transformation_as<T: Any, R>(&mut self, index: usize, edit: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.edit_transformation(index, |t| t.as_any_mut().downcast_mut::<T>().map(edit))
            .flatten()
    }

    fn take_list(&mut self) -> Vec<Box<dyn ValueTransformation>> {
        std::mem::take(&mut self.transformations)
    }

    fn install(&mut self, transformations: Vec<Box<dyn ValueTransformation>>) {
        self.transformations = transformations;
        self.invalidate();
    }

    fn invalidate(&mut self) {
        self.dirty = true;
        self.revision.send_modify(|revision| *revision += 1);
    }

    // =========================================================================
    // Change notification and cache
    // =========================================================================

    /// Observe configuration changes; the value is a revision counter.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Cached results over the bound field's value set, recomputed if stale.
    pub async fn results(&mut self, cancel: &Cancellation) -> &[TransformationResult] {
        if self.dirty {
            self.refresh(cancel).await;
        }
        &self.cache
    }

    /// Cached results without recomputing; `None` while stale.
    pub fn cached_results(&self) -> Option<&[TransformationResult]> {
        (!self.dirty).then_some(self.cache.as_slice())
    }

    /// Recompute the cache now.
    ///
    /// A cancelled refresh stores its (failed) results but stays dirty.
    pub async fn refresh(&mut self, cancel: &Cancellation) {
        let values = self.field.value_set.clone();
        self.cache = self.apply_values(values, cancel).await;
        self.dirty = cancel.is_cancelled();
    }

    // =========================================================================
    // Application
    // =========================================================================

    /// Run the pipeline over the bound column of a table, row by row.
    pub async fn apply_table(&self, table: &Table, cancel: &Cancellation) -> Vec<TransformationResult> {
        let seeds = table
            .rows
            .iter()
            .map(|record| {
                let context = ResultContext::for_record(table, record);
                let value = record.get(&self.field.name).cloned().unwrap_or(Value::Null);
                seed(value, context)
            })
            .collect();
        self.apply_results(seeds, cancel).await
    }

    /// Run the pipeline over the table of a dataset that owns the bound field.
    ///
    /// Returns no results when no table has the field.
    pub async fn apply_dataset(&self, dataset: &Dataset, cancel: &Cancellation) -> Vec<TransformationResult> {
        match dataset.table_for_field(&self.field.name) {
            Some(table) => self.apply_table(table, cancel).await,
            None => Vec::new(),
        }
    }

    /// Run the pipeline for the bound field of the record in `context`.
    pub async fn apply_record(&self, context: &ResultContext, cancel: &Cancellation) -> TransformationResult {
        let Some(record) = &context.record else {
            let target = context.target_field_type.unwrap_or(self.field.value_type);
            return TransformationResult::failure(Value::Null, target, MISSING_SOURCE_RECORD, context.clone());
        };
        let value = record.get(&self.field.name).cloned().unwrap_or(Value::Null);
        self.apply_to_single_result(seed(value, context.clone()), cancel).await
    }

    /// Run the pipeline over raw values.
    pub async fn apply_values(&self, values: Vec<Value>, cancel: &Cancellation) -> Vec<TransformationResult> {
        let seeds = values
            .into_iter()
            .map(|value| seed(value, ResultContext::default()))
            .collect();
        self.apply_results(seeds, cancel).await
    }

    /// Run the pipeline over pre-seeded results, preserving their order.
    pub async fn apply_results(
        &self,
        seeds: Vec<TransformationResult>,
        cancel: &Cancellation,
    ) -> Vec<TransformationResult> {
        stream::iter(seeds)
            .map(|seed| self.apply_to_single_result(seed, cancel))
            .buffered(PIPELINE_CONCURRENCY)
            .collect()
            .await
    }

    /// Run every stage in order on one result.
    ///
    /// Stops at the first failure. Cancellation and stage panics become
    /// failures carrying the partial context; nothing propagates to the caller.
    pub async fn apply_to_single_result(
        &self,
        seed: TransformationResult,
        cancel: &Cancellation,
    ) -> TransformationResult {
        let mut current = seed;

        for transformation in &self.transformations {
            if current.was_failure() {
                break;
            }
            if cancel.is_cancelled() {
                return current.into_failure(CANCELLED_MESSAGE);
            }

            let fallback = current.clone();
            let step = AssertUnwindSafe(transformation.apply_transformation(current, cancel))
                .catch_unwind()
                .await;
            current = match step {
                Ok(result) => result,
                Err(panic) => fallback.into_failure(format!(
                    "StagePanic: '{}' panicked: {}",
                    transformation.type_key(),
                    panic_message(panic.as_ref())
                )),
            };
        }

        current
    }
}

fn seed(value: Value, context: ResultContext) -> TransformationResult {
    let value_type = crate::models::ValueType::of(&value);
    TransformationResult::initial(value, value_type, context)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

// =============================================================================
// Clone / serde
// =============================================================================

impl Clone for FieldTransformation {
    /// Deep copy: stages are cloned, the copy gets its own revision channel
    /// and an empty (dirty) cache.
    fn clone(&self) -> Self {
        Self::with_transformations(Arc::clone(&self.field), self.transformations.clone())
    }
}

impl Serialize for FieldTransformation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("FieldTransformation", 2)?;
        state.serialize_field("field", &self.field)?;
        state.serialize_field("transformations", &self.transformations)?;
        state.end()
    }
}

#[derive(Deserialize)]
struct FieldTransformationConfig {
    field: Arc<FieldDescriptor>,
    #[serde(default)]
    transformations: Vec<Box<dyn ValueTransformation>>,
}

impl<'de> Deserialize<'de> for FieldTransformation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let config = FieldTransformationConfig::deserialize(deserializer)?;
        Ok(Self::with_transformations(config.field, config.transformations))
    }
}

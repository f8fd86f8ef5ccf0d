//! Batch resolution of parser output.
//!
//! A [`BatchResolver`] takes the record stream produced by a source parser
//! and returns a [`ResolutionRun`]: a stream of [`RecordOutcome`]s carrying
//! the same documents with canonical identifiers written in.
//!
//! Per record:
//!
//! 1. collect candidate keys for every [`InputSpec`] (arrays fan out);
//! 2. search from each key towards the configured target namespaces;
//! 3. merge values per target ([`MergeMode`]);
//! 4. write outputs, the optional id field and diagnostics;
//! 5. apply the [`UnresolvedPolicy`].
//!
//! Lookup failures stay attached to their record. Only an upstream source
//! error or a run of consecutive failing records ends the run.

use crate::cache::{CacheStats, LookupCache};
use crate::error::{PipelineConfigError, RunError};
use crate::retry::RetryPolicy;
use crate::search::{ResolvedValue, SearchMode, TraversalLimits};
use crate::short_circuit::ShortCircuit;
use crate::Resolver;
use chemxref_graph::ResolutionGraph;
use chemxref_store::{key_strings_at, set_path, DocumentStore};
use futures_util::stream::{BoxStream, Stream, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// ============================================================================
// Configuration
// ============================================================================

fn default_input_field() -> String {
    "_id".to_string()
}

/// Where to read candidate keys for one namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSpec {
    pub namespace: String,
    /// Dotted path; arrays along the path fan out into several keys.
    #[serde(default = "default_input_field")]
    pub field: String,
}

impl InputSpec {
    pub fn new(namespace: &str, field: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            field: field.to_string(),
        }
    }

    pub fn id(namespace: &str) -> Self {
        Self::new(namespace, "_id")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    /// Lowest-cost value as a string.
    #[default]
    Single,
    /// Every merged value as an array.
    Multi,
}

/// A target namespace and where its value goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSpec {
    pub namespace: String,
    /// Dotted path to write; `None` resolves the namespace without writing
    /// it (useful together with `id_field`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default)]
    pub cardinality: Cardinality,
}

impl OutputSpec {
    pub fn new(namespace: &str, field: Option<&str>, cardinality: Cardinality) -> Self {
        Self {
            namespace: namespace.to_string(),
            field: field.map(str::to_string),
            cardinality,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMode {
    /// Distinct values, each with its cheapest cost and path; a value keeps
    /// the position of its first discovery.
    #[default]
    Union,
    /// One entry per distinct (value, path).
    PerPath,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum UnresolvedPolicy {
    #[default]
    PassThrough,
    Drop,
    Flag { field: String },
}

fn default_workers() -> usize {
    8
}

fn default_ordered() -> bool {
    true
}

fn default_max_consecutive_failures() -> usize {
    16
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub inputs: Vec<InputSpec>,
    #[serde(default)]
    pub outputs: Vec<OutputSpec>,
    /// Replaced with the best value of the first resolved output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics_field: Option<String>,
    #[serde(default)]
    pub unresolved: UnresolvedPolicy,
    #[serde(default)]
    pub merge: MergeMode,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_ordered")]
    pub ordered: bool,
    #[serde(default)]
    pub limits: TraversalLimits,
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Target namespace -> regex of keys already canonical for it.
    #[serde(default)]
    pub short_circuit: BTreeMap<String, String>,
    /// `0` disables the threshold.
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            inputs: Vec::new(),
            outputs: Vec::new(),
            id_field: None,
            diagnostics_field: None,
            unresolved: UnresolvedPolicy::default(),
            merge: MergeMode::default(),
            workers: default_workers(),
            ordered: default_ordered(),
            limits: TraversalLimits::default(),
            retry: RetryPolicy::default(),
            short_circuit: BTreeMap::new(),
            max_consecutive_failures: default_max_consecutive_failures(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(text: &str) -> Result<Self, PipelineConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, PipelineConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| PipelineConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// `FirstResolution` when every output wants a single value.
    pub fn search_mode(&self) -> SearchMode {
        if self
            .outputs
            .iter()
            .all(|o| o.cardinality == Cardinality::Single)
        {
            SearchMode::FirstResolution
        } else {
            SearchMode::Exhaustive
        }
    }

    /// Distinct output namespaces in configured order.
    pub fn targets(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for o in &self.outputs {
            if !out.contains(&o.namespace.as_str()) {
                out.push(&o.namespace);
            }
        }
        out
    }

    pub fn compile_short_circuit(&self) -> Result<ShortCircuit, PipelineConfigError> {
        let mut sc = ShortCircuit::new();
        for (namespace, pattern) in &self.short_circuit {
            sc = sc.with_pattern(namespace, pattern).map_err(|source| {
                PipelineConfigError::InvalidPattern {
                    namespace: namespace.clone(),
                    source,
                }
            })?;
        }
        Ok(sc)
    }

    /// Check the configuration against a built graph.
    pub fn validate(&self, graph: &ResolutionGraph) -> Result<(), PipelineConfigError> {
        if self.inputs.is_empty() {
            return Err(PipelineConfigError::NoInputs);
        }
        if self.outputs.is_empty() {
            return Err(PipelineConfigError::NoOutputs);
        }
        if self.workers == 0 {
            return Err(PipelineConfigError::ZeroWorkers);
        }

        let known = |role: &'static str, ns: &str| {
            if graph.contains_namespace(ns) {
                Ok(())
            } else {
                Err(PipelineConfigError::UnknownNamespace {
                    role,
                    namespace: ns.to_string(),
                })
            }
        };
        for input in &self.inputs {
            known("input", &input.namespace)?;
            non_empty(&input.field, || format!("input field for `{}`", input.namespace))?;
        }
        for output in &self.outputs {
            known("output", &output.namespace)?;
            if let Some(field) = &output.field {
                non_empty(field, || format!("output field for `{}`", output.namespace))?;
            }
        }
        for namespace in self.short_circuit.keys() {
            known("short_circuit", namespace)?;
        }
        if let Some(field) = &self.id_field {
            non_empty(field, || "id_field".to_string())?;
        }
        if let Some(field) = &self.diagnostics_field {
            non_empty(field, || "diagnostics_field".to_string())?;
        }
        if let UnresolvedPolicy::Flag { field } = &self.unresolved {
            non_empty(field, || "unresolved flag field".to_string())?;
        }
        self.compile_short_circuit()?;
        Ok(())
    }
}

fn non_empty(value: &str, what: impl FnOnce() -> String) -> Result<(), PipelineConfigError> {
    if value.trim().is_empty() {
        Err(PipelineConfigError::EmptyField { what: what() })
    } else {
        Ok(())
    }
}

// ============================================================================
// Outcomes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Resolved,
    Unresolved,
    Failed,
}

/// A lookup that kept failing after retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupFailure {
    /// Input namespace of the key being resolved.
    pub namespace: String,
    pub key: String,
    /// Label of the failing edge.
    pub edge: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordOutcome {
    /// Position of the record in the input stream (0-based).
    pub index: u64,
    pub status: RecordStatus,
    pub document: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<LookupFailure>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    /// Records pulled from the input.
    pub records: u64,
    pub emitted: u64,
    pub resolved: u64,
    pub unresolved: u64,
    pub failed: u64,
    pub dropped: u64,
    pub cache: CacheStats,
}

// ============================================================================
// Batch resolver
// ============================================================================

#[derive(Debug, Clone)]
pub struct BatchResolver {
    resolver: Arc<Resolver>,
    config: Arc<PipelineConfig>,
}

impl BatchResolver {
    /// Validate `config` against `graph` and build the resolver.
    pub fn new(
        graph: Arc<ResolutionGraph>,
        store: Arc<dyn DocumentStore>,
        config: PipelineConfig,
    ) -> Result<Self, PipelineConfigError> {
        config.validate(&graph)?;
        let resolver = Resolver::new(graph, store)
            .with_short_circuit(config.compile_short_circuit()?)
            .with_limits(config.limits)
            .with_retry(config.retry);
        Ok(Self {
            resolver: Arc::new(resolver),
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Start resolving `input`. Nothing is pulled until the returned stream
    /// is polled. Cancelling `cancel` stops pulling input; records already in
    /// flight still complete and are yielded.
    pub fn run<S, E>(&self, input: S, cancel: CancellationToken) -> ResolutionRun
    where
        S: Stream<Item = Result<Value, E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        let cancel = cancel.child_token();
        let state = Arc::new(RunState {
            resolver: Arc::clone(&self.resolver),
            config: Arc::clone(&self.config),
            cache: LookupCache::new(),
            cancel: cancel.clone(),
            counters: Counters::default(),
            streak: Mutex::new(0),
        });

        let workers = self.config.workers.max(1);
        let worker_state = Arc::clone(&state);
        let records = input
            .take_until(cancel.clone().cancelled_owned())
            .enumerate()
            .map(move |(index, item)| {
                let state = Arc::clone(&worker_state);
                let item = item.map_err(|e| e.to_string());
                async move { state.process(index as u64, item).await }
            });
        let steps: BoxStream<'static, Step> = if self.config.ordered {
            records.buffered(workers).boxed()
        } else {
            records.buffer_unordered(workers).boxed()
        };

        ResolutionRun {
            steps,
            state,
            cancel,
            finished: false,
        }
    }
}

// ============================================================================
// Run
// ============================================================================

enum Step {
    Emit(RecordOutcome),
    Skip,
    Abort(RunError),
}

#[derive(Debug, Default)]
struct Counters {
    records: AtomicU64,
    emitted: AtomicU64,
    resolved: AtomicU64,
    unresolved: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

struct RunState {
    resolver: Arc<Resolver>,
    config: Arc<PipelineConfig>,
    cache: LookupCache,
    cancel: CancellationToken,
    counters: Counters,
    /// Consecutive failed records, in completion order.
    streak: Mutex<usize>,
}

impl RunState {
    async fn process(&self, index: u64, item: Result<Value, String>) -> Step {
        self.counters.records.fetch_add(1, Ordering::Relaxed);
        let doc = match item {
            Ok(doc) => doc,
            Err(message) => {
                self.cancel.cancel();
                return Step::Abort(RunError::Source {
                    record: index,
                    message,
                });
            }
        };

        let outcome = self.resolve_record(index, doc).await;
        let counter = match outcome.status {
            RecordStatus::Resolved => &self.counters.resolved,
            RecordStatus::Unresolved => &self.counters.unresolved,
            RecordStatus::Failed => &self.counters.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        if let Some(abort) = self.track_failures(&outcome) {
            self.cancel.cancel();
            return Step::Abort(abort);
        }

        if outcome.status == RecordStatus::Unresolved
            && self.config.unresolved == UnresolvedPolicy::Drop
        {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            debug!(record = index, "dropping unresolved record");
            return Step::Skip;
        }
        Step::Emit(outcome)
    }

    fn track_failures(&self, outcome: &RecordOutcome) -> Option<RunError> {
        let mut streak = self.streak.lock();
        if outcome.status != RecordStatus::Failed {
            *streak = 0;
            return None;
        }
        *streak += 1;
        let threshold = self.config.max_consecutive_failures;
        if threshold == 0 || *streak < threshold {
            return None;
        }
        let last = outcome.failures.last();
        Some(RunError::StoreUnavailable {
            record: outcome.index,
            edge: last.map(|f| f.edge.clone()).unwrap_or_default(),
            namespace: last.map(|f| f.namespace.clone()).unwrap_or_default(),
            failures: *streak,
        })
    }

    async fn resolve_record(&self, index: u64, mut doc: Value) -> RecordOutcome {
        let config = &self.config;
        let targets = config.targets();
        let mode = config.search_mode();
        let search = self.resolver.search(&self.cache);

        let mut merged: Vec<Vec<ResolvedValue>> = vec![Vec::new(); targets.len()];
        let mut failures = Vec::new();

        for input in &config.inputs {
            for key in key_strings_at(&doc, &input.field) {
                match search.resolve(&input.namespace, &key, &targets, mode).await {
                    Ok(resolution) => {
                        for (slot, target) in merged.iter_mut().zip(&targets) {
                            if let Some(set) = resolution.get(target) {
                                merge_into(slot, set.iter(), config.merge);
                            }
                        }
                        failures.extend(resolution.failures.into_iter().map(|f| LookupFailure {
                            namespace: input.namespace.clone(),
                            key: key.clone(),
                            edge: f.edge,
                            message: f.message,
                        }));
                    }
                    Err(err) => {
                        warn!(
                            record = index,
                            namespace = %input.namespace,
                            key = %key,
                            error = %err,
                            "lookup failed"
                        );
                        failures.push(LookupFailure {
                            namespace: input.namespace.clone(),
                            key: key.clone(),
                            edge: err.edge().unwrap_or_default().to_string(),
                            message: err.to_string(),
                        });
                    }
                }
            }
        }

        let resolved_any = merged.iter().any(|m| !m.is_empty());
        let slot_of = |namespace: &str| targets.iter().position(|t| *t == namespace);

        for output in &config.outputs {
            let (Some(field), Some(slot)) = (&output.field, slot_of(&output.namespace)) else {
                continue;
            };
            let values = &merged[slot];
            let value = match output.cardinality {
                Cardinality::Single => match best(values) {
                    Some(v) => Value::String(v.key.clone()),
                    None => continue,
                },
                Cardinality::Multi if values.is_empty() => continue,
                Cardinality::Multi => Value::Array(
                    values.iter().map(|v| Value::String(v.key.clone())).collect(),
                ),
            };
            write_field(&mut doc, field, value, index);
        }

        if let Some(id_field) = &config.id_field {
            let id = config
                .outputs
                .iter()
                .filter_map(|o| slot_of(&o.namespace))
                .find_map(|slot| best(&merged[slot]));
            if let Some(v) = id {
                write_field(&mut doc, id_field, Value::String(v.key.clone()), index);
            }
        }

        if let Some(field) = &config.diagnostics_field {
            let diagnostics = diagnostics(&targets, &merged, &failures);
            write_field(&mut doc, field, diagnostics, index);
        }

        let status = if resolved_any {
            RecordStatus::Resolved
        } else if !failures.is_empty() {
            RecordStatus::Failed
        } else {
            RecordStatus::Unresolved
        };

        if status != RecordStatus::Resolved {
            if let UnresolvedPolicy::Flag { field } = &config.unresolved {
                write_field(&mut doc, field, Value::Bool(true), index);
            }
        }
        debug!(record = index, ?status, "record resolved");

        RecordOutcome {
            index,
            status,
            document: doc,
            failures,
        }
    }

    fn stats(&self) -> RunStats {
        let c = &self.counters;
        RunStats {
            records: c.records.load(Ordering::Relaxed),
            emitted: c.emitted.load(Ordering::Relaxed),
            resolved: c.resolved.load(Ordering::Relaxed),
            unresolved: c.unresolved.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            dropped: c.dropped.load(Ordering::Relaxed),
            cache: self.cache.stats(),
        }
    }
}

fn merge_into<'v>(
    slot: &mut Vec<ResolvedValue>,
    values: impl Iterator<Item = &'v ResolvedValue>,
    mode: MergeMode,
) {
    for value in values {
        let existing = slot.iter_mut().find(|v| match mode {
            MergeMode::Union => v.key == value.key,
            MergeMode::PerPath => v.key == value.key && v.path == value.path,
        });
        match existing {
            // a cheaper route to a known value replaces cost and path but
            // keeps its discovery position
            Some(v) if value.cost < v.cost => {
                v.cost = value.cost;
                v.path = value.path.clone();
            }
            Some(_) => {}
            None => slot.push(value.clone()),
        }
    }
}

fn best(values: &[ResolvedValue]) -> Option<&ResolvedValue> {
    values.iter().fold(None, |best: Option<&ResolvedValue>, v| match best {
        Some(b) if b.cost <= v.cost => Some(b),
        _ => Some(v),
    })
}

fn diagnostics(targets: &[&str], merged: &[Vec<ResolvedValue>], failures: &[LookupFailure]) -> Value {
    let mut out = Map::new();
    for (target, values) in targets.iter().zip(merged) {
        let entries: Vec<Value> = values
            .iter()
            .map(|v| {
                json!({
                    "value": v.key,
                    "cost": v.cost,
                    "path": v.path.iter().map(|h| h.label()).collect::<Vec<_>>(),
                })
            })
            .collect();
        out.insert(target.to_string(), Value::Array(entries));
    }
    if !failures.is_empty() {
        out.insert(
            "_failures".to_string(),
            serde_json::to_value(failures).unwrap_or(Value::Null),
        );
    }
    Value::Object(out)
}

fn write_field(doc: &mut Value, field: &str, value: Value, index: u64) {
    if let Err(err) = set_path(doc, field, value) {
        warn!(record = index, field, error = %err, "could not write field");
    }
}

/// Stream of record outcomes for one batch run.
///
/// Ends after the input is exhausted (or cancelled) and in-flight records
/// have drained, or right after a [`RunError`] is yielded.
pub struct ResolutionRun {
    steps: BoxStream<'static, Step>,
    state: Arc<RunState>,
    cancel: CancellationToken,
    finished: bool,
}

impl ResolutionRun {
    pub fn stats(&self) -> RunStats {
        self.state.stats()
    }

    /// Token that cancels this run only.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn finish(&mut self) {
        self.finished = true;
        let stats = self.stats();
        info!(
            records = stats.records,
            emitted = stats.emitted,
            resolved = stats.resolved,
            unresolved = stats.unresolved,
            failed = stats.failed,
            dropped = stats.dropped,
            cache_hits = stats.cache.hits,
            cache_misses = stats.cache.misses,
            cancelled = self.cancel.is_cancelled(),
            "resolution run finished"
        );
    }
}

impl Stream for ResolutionRun {
    type Item = Result<RecordOutcome, RunError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        loop {
            match this.steps.poll_next_unpin(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Step::Skip)) => continue,
                Poll::Ready(Some(Step::Emit(outcome))) => {
                    this.state.counters.emitted.fetch_add(1, Ordering::Relaxed);
                    return Poll::Ready(Some(Ok(outcome)));
                }
                Poll::Ready(Some(Step::Abort(err))) => {
                    this.cancel.cancel();
                    this.finish();
                    return Poll::Ready(Some(Err(err)));
                }
                Poll::Ready(None) => {
                    this.finish();
                    return Poll::Ready(None);
                }
            }
        }
    }
}

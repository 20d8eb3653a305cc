//! # Pipeline Engine (C9)
//!
//! Named, ordered sequences of transforms applied at one of three
//! points in a request's life: before planning (`Query`), when a
//! document is indexed (`Document`), or after shard results are merged
//! (`Result`). A pipeline's [`FailurePolicy`] decides whether a failing
//! stage aborts the whole request or is skipped so the request still
//! completes in degraded form.

use crate::ast::SearchRequest;
use crate::error::{Error, Result};
use crate::value::{Hit, Row};
use dashmap::DashMap;
use std::sync::Arc;

/// Which point in the request lifecycle a stage runs at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Query,
    Document,
    Result,
}

/// The value flowing through a pipeline, tagged by the stage kind it
/// matches. A [`Stage`] only ever sees the variant matching its own
/// [`StageKind`].
#[derive(Debug, Clone)]
pub enum PipelineValue {
    Query(SearchRequest),
    Document(Row),
    Result(Vec<Hit>),
}

/// A single named transform. `apply` receives and returns a
/// [`PipelineValue`] of the stage's own kind; a mismatch is a caller
/// bug (pipelines are only ever built from same-kind stages) and is
/// reported as an internal error rather than panicking.
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;
    fn kind(&self) -> StageKind;
    fn apply(&self, value: PipelineValue) -> Result<PipelineValue>;
}

/// What happens when a stage returns an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Propagate the error, failing the whole request.
    Abort,
    /// Log and continue with the value as it was before the failing
    /// stage, so the request still completes in degraded form.
    SkipStage,
}

/// An ordered list of same-kind stages plus the policy applied when
/// one of them fails.
pub struct Pipeline {
    name: String,
    kind: StageKind,
    stages: Vec<Box<dyn Stage>>,
    failure_policy: FailurePolicy,
}

/// Per-pipeline execution counters, surfaced through [`crate::telemetry`].
#[derive(Debug, Default, Clone, Copy)]
pub struct PipelineStats {
    pub runs: u64,
    pub stage_failures: u64,
}

impl Pipeline {
    pub fn new(name: impl Into<String>, kind: StageKind, failure_policy: FailurePolicy) -> Self {
        Pipeline {
            name: name.into(),
            kind,
            stages: Vec::new(),
            failure_policy,
        }
    }

    pub fn with_stage(mut self, stage: Box<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> StageKind {
        self.kind
    }

    /// Runs every stage in order. Under [`FailurePolicy::SkipStage`], a
    /// stage that errors is skipped and the pipeline continues with the
    /// value as it entered that stage; under [`FailurePolicy::Abort`]
    /// the first error is returned immediately.
    pub fn run(&self, mut value: PipelineValue) -> Result<(PipelineValue, u64)> {
        let mut failures = 0u64;
        for stage in &self.stages {
            match stage.apply(value.clone_shallow()) {
                Ok(next) => value = next,
                Err(e) => {
                    failures += 1;
                    match self.failure_policy {
                        FailurePolicy::Abort => {
                            return Err(Error::Pipeline {
                                pipeline: self.name.clone(),
                                stage: stage.name().to_string(),
                                reason: e.to_string(),
                            })
                        }
                        FailurePolicy::SkipStage => continue,
                    }
                }
            }
        }
        Ok((value, failures))
    }
}

impl PipelineValue {
    /// `PipelineValue` does not derive `Clone` directly since `Stage`
    /// consumes its input by value; this gives `run` a value to fall
    /// back to if a stage is skipped without needing to re-clone on
    /// every iteration.
    fn clone_shallow(&self) -> PipelineValue {
        self.clone()
    }
}

/// Named pipeline lookup table. Indexing/search request handling fetch
/// a pipeline by name and run it; a missing name is treated as "no
/// pipeline configured" rather than an error at the call site.
///
/// Also holds the `(index, kind) -> pipeline name` bindings (§4.9):
/// at most one pipeline per `(index, kind)` pair, guarded the same
/// read-mostly way as [`crate::schema::directory`]'s cached topology.
#[derive(Default)]
pub struct PipelineRegistry {
    pipelines: DashMap<String, Arc<Pipeline>>,
    associations: DashMap<(String, StageKind), String>,
}

impl PipelineRegistry {
    pub fn new() -> Self {
        PipelineRegistry::default()
    }

    pub fn register_pipeline(&self, pipeline: Pipeline) {
        self.pipelines.insert(pipeline.name().to_string(), Arc::new(pipeline));
    }

    pub fn get_pipeline(&self, name: &str) -> Option<Arc<Pipeline>> {
        self.pipelines.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Binds `name` as the pipeline run for `(index, kind)`. Errors if
    /// `name` is not registered or is registered with a different
    /// [`StageKind`] than the one being bound.
    pub fn associate(&self, index: &str, kind: StageKind, name: &str) -> Result<()> {
        let pipeline = self.get_pipeline(name).ok_or_else(|| Error::Pipeline {
            pipeline: name.to_string(),
            stage: String::new(),
            reason: "no such pipeline registered".to_string(),
        })?;
        if pipeline.kind() != kind {
            return Err(Error::Pipeline {
                pipeline: name.to_string(),
                stage: String::new(),
                reason: format!(
                    "pipeline '{name}' has kind {:?}, cannot associate as {kind:?}",
                    pipeline.kind()
                ),
            });
        }
        self.associations.insert((index.to_string(), kind), name.to_string());
        Ok(())
    }

    /// The pipeline currently bound to `(index, kind)`, if any.
    pub fn pipeline_for(&self, index: &str, kind: StageKind) -> Option<Arc<Pipeline>> {
        let name = self.associations.get(&(index.to_string(), kind))?;
        self.get_pipeline(name.value())
    }

    /// Removes a pipeline by name. Errors if it is still bound to any
    /// `(index, kind)` association.
    pub fn remove_pipeline(&self, name: &str) -> Result<bool> {
        if self.associations.iter().any(|entry| entry.value() == name) {
            return Err(Error::Pipeline {
                pipeline: name.to_string(),
                stage: String::new(),
                reason: "pipeline is still associated with an index; remove the association first".to_string(),
            });
        }
        Ok(self.pipelines.remove(name).is_some())
    }

    pub fn names(&self) -> Vec<String> {
        self.pipelines.iter().map(|e| e.key().clone()).collect()
    }
}

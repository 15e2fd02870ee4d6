//! Render jobs: from a timeline plan document to a finished video.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use inlay_common::config::{AppConfig, RenderSettings};
use inlay_common::error::{InlayError, InlayResult};
use inlay_timeline_model::document::{IssueSeverity, TimelinePlan};
use serde::Serialize;

use crate::acquire::{AcquireRequest, Acquirer};
use crate::executor::{
    CancelFlag, ProgressCallback, RenderExecutor, RenderInvocation, RenderProgress, RenderStage,
};
use crate::graph::{GraphBuilder, GraphReport};
use crate::probe::{FfprobeProber, Prober};
use crate::workspace::JobWorkspace;

/// Planner and probe durations further apart than this are logged.
const DURATION_MISMATCH_WARN_SECS: f64 = 0.5;

/// Lifecycle state of a render job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    Created,
    Running,
    Completed { output: PathBuf },
    Failed { error: String },
}

impl JobState {
    fn name(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }

    fn can_become(&self, next: &JobState) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Running)
                | (Self::Running, Self::Completed { .. })
                | (Self::Running, Self::Failed { .. })
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRecord {
    pub id: String,
    #[serde(flatten)]
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    jobs: BTreeMap<String, JobRecord>,
    next_seq: u64,
}

/// In-memory record of render jobs, shared between threads.
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a new job and return its id (`render_<unix millis>_<seq>`).
    pub fn create(&self) -> String {
        let now = Utc::now();
        let mut inner = self.lock();
        let id = format!("render_{}_{}", now.timestamp_millis(), inner.next_seq);
        inner.next_seq += 1;
        inner.jobs.insert(
            id.clone(),
            JobRecord {
                id: id.clone(),
                state: JobState::Created,
                created_at: now,
                updated_at: now,
            },
        );
        id
    }

    pub fn start(&self, id: &str) -> InlayResult<()> {
        self.transition(id, JobState::Running)
    }

    pub fn complete(&self, id: &str, output: PathBuf) -> InlayResult<()> {
        self.transition(id, JobState::Completed { output })
    }

    pub fn fail(&self, id: &str, error: impl Into<String>) -> InlayResult<()> {
        self.transition(
            id,
            JobState::Failed {
                error: error.into(),
            },
        )
    }

    fn transition(&self, id: &str, next: JobState) -> InlayResult<()> {
        let mut inner = self.lock();
        let record = inner
            .jobs
            .get_mut(id)
            .ok_or_else(|| InlayError::render(format!("unknown job '{id}'")))?;

        if !record.state.can_become(&next) {
            return Err(InlayError::render(format!(
                "job '{id}' cannot go from {} to {}",
                record.state, next
            )));
        }

        tracing::debug!(job_id = id, from = %record.state, to = %next, "Job state change");
        record.state = next;
        record.updated_at = Utc::now();
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<JobRecord> {
        self.lock().jobs.get(id).cloned()
    }

    /// All jobs, oldest first.
    pub fn list(&self) -> Vec<JobRecord> {
        let mut jobs: Vec<JobRecord> = self.lock().jobs.values().cloned().collect();
        jobs.sort_by_key(|job| job.created_at);
        jobs
    }
}

/// Caller-supplied parameters of one render.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    /// Base video reference. Falls back to the plan's `a_roll.url`.
    pub base_reference: Option<String>,

    /// Where the finished video goes.
    pub output_path: PathBuf,

    /// Overrides the configured transition length.
    pub transition_secs: Option<f64>,
}

impl RenderRequest {
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            base_reference: None,
            output_path: output_path.into(),
            transition_secs: None,
        }
    }

    pub fn with_base(mut self, reference: impl Into<String>) -> Self {
        self.base_reference = Some(reference.into());
        self
    }

    pub fn with_transition(mut self, secs: f64) -> Self {
        self.transition_secs = Some(secs);
        self
    }
}

/// Result of a successful render.
#[derive(Debug, Clone)]
pub struct RenderOutcome {
    pub job_id: String,
    pub output_path: PathBuf,
    pub report: GraphReport,
    pub elapsed: Duration,
}

/// Runs render jobs end to end.
pub struct Renderer {
    config: AppConfig,
    prober: Arc<dyn Prober>,
    executor: RenderExecutor,
    acquirer: Acquirer,
    registry: JobRegistry,
}

impl Renderer {
    pub fn new(config: AppConfig) -> Self {
        Self {
            prober: Arc::new(FfprobeProber::from_config(&config.tools)),
            executor: RenderExecutor::from_config(&config.tools),
            acquirer: Acquirer::new(&config.acquisition),
            registry: JobRegistry::new(),
            config,
        }
    }

    pub fn with_prober(mut self, prober: Arc<dyn Prober>) -> Self {
        self.prober = prober;
        self
    }

    pub fn with_registry(mut self, registry: JobRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Render `plan` into `request.output_path`.
    ///
    /// The job is registered first and ends `Completed` or `Failed`. On any
    /// failure nothing is written at the output path and the job workspace
    /// is removed.
    pub async fn render_timeline_plan(
        &self,
        plan: &TimelinePlan,
        request: RenderRequest,
        progress: Option<ProgressCallback>,
        cancel: CancelFlag,
    ) -> InlayResult<RenderOutcome> {
        let job_id = self.registry.create();
        self.registry.start(&job_id)?;
        let started = Instant::now();

        tracing::info!(
            job_id = %job_id,
            insertions = plan.insertions.len(),
            output = %request.output_path.display(),
            "Starting render job"
        );

        match self.run_job(&job_id, plan, &request, progress, cancel).await {
            Ok((output_path, report)) => {
                self.registry.complete(&job_id, output_path.clone())?;
                let elapsed = started.elapsed();
                tracing::info!(
                    job_id = %job_id,
                    overlays = report.overlays,
                    dropped = report.dropped(),
                    elapsed_secs = elapsed.as_secs_f64(),
                    "Render job completed"
                );
                Ok(RenderOutcome {
                    job_id,
                    output_path,
                    report,
                    elapsed,
                })
            }
            Err(err) => {
                tracing::error!(job_id = %job_id, error = %err, "Render job failed");
                self.registry.fail(&job_id, err.to_string())?;
                Err(err)
            }
        }
    }

    async fn run_job(
        &self,
        job_id: &str,
        plan: &TimelinePlan,
        request: &RenderRequest,
        progress: Option<ProgressCallback>,
        cancel: CancelFlag,
    ) -> InlayResult<(PathBuf, GraphReport)> {
        self.config.validate()?;
        if let Some(secs) = request.transition_secs {
            RenderSettings::validate_transition(secs)?;
        }

        if let Some(issue) = plan
            .validate(&self.config.planning)
            .into_iter()
            .find(|issue| issue.severity == IssueSeverity::Error)
        {
            return Err(InlayError::plan(issue.message));
        }

        let base_reference = request
            .base_reference
            .clone()
            .or_else(|| plan.a_roll.as_ref().map(|a| a.url.clone()))
            .ok_or_else(|| InlayError::plan("no base video reference given"))?;

        let workspace = match &self.config.work_dir {
            Some(root) => JobWorkspace::new_in(root, job_id)?,
            None => JobWorkspace::new(job_id)?,
        };
        if let Some(cb) = &progress {
            cb(RenderProgress::stage(RenderStage::Acquiring, 0));
        }

        let clip_requests: Vec<AcquireRequest> = plan
            .referenced_clips()
            .into_iter()
            .map(|clip| {
                AcquireRequest::new(clip.id.clone(), clip.url.clone())
                    .with_name(format!("broll_{}", clip.id))
            })
            .collect();
        let (base_path, clip_paths) = tokio::try_join!(
            self.acquirer.acquire(&base_reference, workspace.dir(), "a_roll"),
            self.acquirer.acquire_all(clip_requests, workspace.dir()),
        )?;

        if cancel.is_cancelled() {
            return Err(InlayError::Cancelled);
        }

        let prober = Arc::clone(&self.prober);
        let probe_path = base_path.clone();
        let info = tokio::task::spawn_blocking(move || prober.probe(&probe_path))
            .await
            .map_err(|e| InlayError::render(format!("probe task failed: {e}")))??;

        if plan.a_roll_duration_secs > 0.0
            && (plan.a_roll_duration_secs - info.duration_secs).abs() > DURATION_MISMATCH_WARN_SECS
        {
            tracing::warn!(
                planned_secs = plan.a_roll_duration_secs,
                probed_secs = info.duration_secs,
                "Planned base duration differs from probed duration; using probed"
            );
        }

        let render_plan = plan.to_render_plan(info.into_base_track(&base_path), &clip_paths)?;

        let mut builder = GraphBuilder::from_settings(&self.config.render);
        if let Some(secs) = request.transition_secs {
            builder = builder.with_transition(secs);
        }
        let (graph, report) = builder.build(&render_plan)?;

        if let Some(cb) = &progress {
            cb(RenderProgress::stage(
                RenderStage::Preparing,
                graph.frame_rate().frames_in(graph.duration_secs()),
            ));
        }

        let invocation = RenderInvocation::from_graph(
            &graph,
            &self.config.render.encoding,
            workspace.staging_output(),
        );
        let executor = self.executor.clone();
        let run_cancel = cancel.clone();
        tokio::task::spawn_blocking(move || executor.execute(&invocation, progress, &run_cancel))
            .await
            .map_err(|e| InlayError::render(format!("render task failed: {e}")))??;

        if cancel.is_cancelled() {
            return Err(InlayError::Cancelled);
        }

        let output = workspace.finalize(&request.output_path)?;
        Ok((output, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_ids_are_unique_and_prefixed() {
        let registry = JobRegistry::new();
        let a = registry.create();
        let b = registry.create();
        assert_ne!(a, b);
        assert!(a.starts_with("render_"));
        assert!(b.ends_with("_1"));
        assert_eq!(registry.list().len(), 2);
    }

    #[test]
    fn test_lifecycle_happy_path() {
        let registry = JobRegistry::new();
        let id = registry.create();
        assert_eq!(registry.get(&id).unwrap().state, JobState::Created);

        registry.start(&id).unwrap();
        registry.complete(&id, PathBuf::from("/out/final.mp4")).unwrap();

        let record = registry.get(&id).unwrap();
        assert!(record.state.is_terminal());
        assert!(record.updated_at >= record.created_at);
    }

    #[test]
    fn test_invalid_transitions_rejected() {
        let registry = JobRegistry::new();
        let id = registry.create();

        assert!(registry.complete(&id, PathBuf::from("/x")).is_err());
        registry.start(&id).unwrap();
        assert!(registry.start(&id).is_err());
        registry.fail(&id, "boom").unwrap();
        assert!(registry.complete(&id, PathBuf::from("/x")).is_err());
        assert!(registry.start("render_0_99").is_err());
    }

    #[test]
    fn test_record_serializes_state_inline() {
        let registry = JobRegistry::new();
        let id = registry.create();
        registry.start(&id).unwrap();
        registry.fail(&id, "engine exited 1").unwrap();

        let json = serde_json::to_value(registry.get(&id).unwrap()).unwrap();
        assert_eq!(json["state"], "failed");
        assert_eq!(json["error"], "engine exited 1");
    }

    #[test]
    fn test_registry_shared_across_threads() {
        let registry = JobRegistry::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.create())
            })
            .collect();
        let mut ids: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 8);
    }
}

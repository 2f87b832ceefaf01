//! Task orchestration
//!
//! Drives one task through acquire, analyze, generate, execute and
//! aggregate, persisting the task on every transition and progress update.
//! Per-file and per-language failures are recorded in the result bundle;
//! only a rejected or unobtainable source and the whole-task timeout fail
//! the task.

use crate::acquire::TreeSource;
use crate::ai::{CompletionTransport, GenerationClient};
use crate::analysis::{analyze, RepositoryAnalysis};
use crate::catalog::Language;
use crate::config::Config;
use crate::error::{StoreError, TaskError};
use crate::execute::{Budget, ExecutionRequest, ExecutionResult, TestExecutor};
use crate::generate::{generate_for_language, GenerationOptions, LanguageGeneration};
use crate::task::store::TaskStore;
use crate::task::{ProgressSink, Task};
use crate::util::round2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::Instrument;

const PROGRESS_ACQUIRE: u8 = 10;
const PROGRESS_ANALYZE: u8 = 20;
const PROGRESS_GENERATE: (u8, u8) = (30, 70);
const PROGRESS_EXECUTE: (u8, u8) = (70, 90);
const PROGRESS_AGGREGATE: u8 = 90;

/// Aggregate view over one task's results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total_files: usize,
    pub total_tests_generated: usize,
    pub total_tests_executed: usize,
    pub tests_passed: usize,
    pub tests_failed: usize,
    /// Mean over languages with measured coverage; 0 when there are none
    pub overall_coverage: f64,
    pub languages_detected: Vec<Language>,
    pub successful_languages: Vec<Language>,
    /// Languages whose execution numbers are estimates, not measurements
    #[serde(default)]
    pub estimated_languages: Vec<Language>,
}

impl Summary {
    pub fn aggregate(
        analysis: &RepositoryAnalysis,
        generation: &BTreeMap<Language, LanguageGeneration>,
        execution: &BTreeMap<Language, ExecutionResult>,
    ) -> Self {
        let mut summary = Summary {
            total_files: analysis.total_files,
            total_tests_generated: generation.values().map(|g| g.tests_generated).sum(),
            languages_detected: analysis.languages_detected(),
            successful_languages: generation
                .values()
                .filter(|g| g.success)
                .map(|g| g.language)
                .collect(),
            ..Default::default()
        };

        let mut coverages = Vec::new();
        for (language, result) in execution {
            if result.error.is_some() {
                continue;
            }
            summary.tests_passed += result.tests_passed;
            summary.tests_failed += result.tests_failed;
            summary.total_tests_executed += result.tests_total;
            if !result.is_measured() {
                summary.estimated_languages.push(*language);
                continue;
            }
            if let Some(coverage) = result.coverage_percentage {
                coverages.push(coverage);
            }
        }

        if !coverages.is_empty() {
            summary.overall_coverage = round2(coverages.iter().sum::<f64>() / coverages.len() as f64);
        }
        summary
    }
}

/// Everything a completed task produced
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskResults {
    /// Commit the tree was taken from, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    pub analysis: RepositoryAnalysis,
    pub generation: BTreeMap<Language, LanguageGeneration>,
    pub execution: BTreeMap<Language, ExecutionResult>,
    pub summary: Summary,
}

/// Final task state, plus results when it completed
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub task: Task,
    pub results: Option<TaskResults>,
}

/// Run a store call on the blocking pool; file stores may wait on a lock.
async fn on_store<R, F>(store: &Arc<dyn TaskStore>, f: F) -> Result<R, StoreError>
where
    R: Send + 'static,
    F: FnOnce(&dyn TaskStore) -> Result<R, StoreError> + Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || f(store.as_ref()))
        .await
        .map_err(|e| StoreError::Join(e.to_string()))?
}

/// Shared handle on the running task: every update is persisted and
/// reported to the sink.
struct Tracker<'a> {
    task: Arc<Mutex<Task>>,
    /// Held by the writer for the whole save, so the last writer always
    /// stores the newest state even if an earlier save is still in flight.
    write_turn: Arc<Mutex<()>>,
    store: Arc<dyn TaskStore>,
    sink: &'a dyn ProgressSink,
}

impl<'a> Tracker<'a> {
    fn new(task: Task, store: Arc<dyn TaskStore>, sink: &'a dyn ProgressSink) -> Self {
        Self {
            task: Arc::new(Mutex::new(task)),
            write_turn: Arc::new(Mutex::new(())),
            store,
            sink,
        }
    }

    async fn with_task<R>(&self, f: impl FnOnce(&mut Task) -> R) -> R {
        let result = {
            let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
            f(&mut task)
        };
        if let Err(err) = self.persist().await {
            tracing::warn!(error = %err, "Failed to persist task");
        }
        result
    }

    async fn persist(&self) -> Result<(), StoreError> {
        let task = Arc::clone(&self.task);
        let turn = Arc::clone(&self.write_turn);
        on_store(&self.store, move |store| {
            let _turn = turn.lock().unwrap_or_else(|e| e.into_inner());
            let snapshot = task.lock().unwrap_or_else(|e| e.into_inner()).clone();
            store.save_task(&snapshot)
        })
        .await
    }

    async fn advance(&self, progress: u8, step: &str) {
        let reported = self
            .with_task(|task| match task.advance(progress, step) {
                Ok(()) => Some(task.progress),
                Err(err) => {
                    tracing::debug!(error = %err, "Ignoring progress update");
                    None
                }
            })
            .await;
        if let Some(progress) = reported {
            tracing::info!(progress, step, "Task progress");
            self.sink.report(progress, step);
        }
    }

    fn snapshot(&self) -> Task {
        self.task.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Position `index` of `count` inside a progress band.
fn band(range: (u8, u8), index: usize, count: usize) -> u8 {
    if count == 0 {
        return range.0;
    }
    let span = (range.1 - range.0) as usize;
    range.0 + (span * index / count) as u8
}

pub struct Orchestrator {
    config: Config,
    store: Arc<dyn TaskStore>,
    transport: Arc<dyn CompletionTransport>,
    source: Arc<dyn TreeSource>,
    executor: Arc<dyn TestExecutor>,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        store: Arc<dyn TaskStore>,
        transport: Arc<dyn CompletionTransport>,
        source: Arc<dyn TreeSource>,
        executor: Arc<dyn TestExecutor>,
    ) -> Self {
        Self {
            config,
            store,
            transport,
            source,
            executor,
        }
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    /// Create and persist a pending task.
    pub async fn submit(&self, source: &str) -> Result<Task, TaskError> {
        let task = Task::new(source);
        let record = task.clone();
        on_store(&self.store, move |store| store.save_task(&record)).await?;
        tracing::info!(task_id = %task.id, source = %source, "Task submitted");
        Ok(task)
    }

    /// Run a pending task to a terminal state.
    pub async fn run(&self, task: Task, sink: &dyn ProgressSink) -> Result<TaskOutcome, TaskError> {
        let span = tracing::info_span!("task", task_id = %task.id);
        self.run_task(task, sink).instrument(span).await
    }

    async fn run_task(&self, mut task: Task, sink: &dyn ProgressSink) -> Result<TaskOutcome, TaskError> {
        if let Err(err) = self.source.validate(&task.source) {
            tracing::warn!(error = %err, "Rejected task source");
            task.fail(err.to_string())?;
            let record = task.clone();
            on_store(&self.store, move |store| store.save_task(&record)).await?;
            return Ok(TaskOutcome {
                task,
                results: None,
            });
        }

        task.start()?;
        let record = task.clone();
        on_store(&self.store, move |store| store.save_task(&record)).await?;
        let source = task.source.clone();
        let task_id = task.id;
        let tracker = Tracker::new(task, Arc::clone(&self.store), sink);

        let limit = self.config.task_timeout();
        let budget = Budget::with_timeout(limit);
        let outcome = tokio::time::timeout(limit, self.run_stages(&tracker, &source, task_id, budget)).await;

        let results = match outcome {
            Ok(Ok(results)) => {
                let record = results.clone();
                match on_store(&self.store, move |store| store.save_results(task_id, &record)).await {
                    Ok(()) => Some(results),
                    Err(err) => {
                        tracker
                            .with_task(|task| task.fail(format!("Failed to store results: {}", err)))
                            .await?;
                        None
                    }
                }
            }
            Ok(Err(err)) => {
                tracing::error!(error = %err, "Task failed");
                tracker.with_task(|task| task.fail(err.to_string())).await?;
                None
            }
            Err(_) => {
                let err = TaskError::Timeout(limit.as_secs());
                tracing::error!(error = %err, "Task timed out");
                tracker.with_task(|task| task.fail(err.to_string())).await?;
                None
            }
        };

        if results.is_some() {
            tracker.with_task(|task| task.complete()).await?;
            sink.report(100, "Completed");
            tracing::info!("Task completed");
        }

        Ok(TaskOutcome {
            task: tracker.snapshot(),
            results,
        })
    }

    async fn run_stages(
        &self,
        tracker: &Tracker<'_>,
        source: &str,
        task_id: uuid::Uuid,
        budget: Budget,
    ) -> Result<TaskResults, TaskError> {
        tracker.advance(PROGRESS_ACQUIRE, "Acquiring repository").await;
        let tree = self.source.acquire(source, task_id).await?;

        tracker.advance(PROGRESS_ANALYZE, "Analyzing repository").await;
        let analysis = analyze(&tree.root)?;
        let languages = analysis.languages_detected();
        tracing::info!(
            files = analysis.total_files,
            languages = ?languages,
            "Repository analyzed"
        );

        let generation = self.generate(tracker, &tree.root, &analysis, &languages).await;
        let execution = self.execute(tracker, &tree.root, &generation, budget).await;

        tracker.advance(PROGRESS_AGGREGATE, "Aggregating results").await;
        let summary = Summary::aggregate(&analysis, &generation, &execution);
        Ok(TaskResults {
            revision: tree.revision,
            analysis,
            generation,
            execution,
            summary,
        })
    }

    async fn generate(
        &self,
        tracker: &Tracker<'_>,
        root: &std::path::Path,
        analysis: &RepositoryAnalysis,
        languages: &[Language],
    ) -> BTreeMap<Language, LanguageGeneration> {
        let mut generation = BTreeMap::new();
        // One client per task keeps the model cursor task-scoped
        let client = match GenerationClient::new(self.transport.clone(), &self.config.ai) {
            Ok(client) => client,
            Err(err) => {
                for language in languages {
                    generation.insert(*language, LanguageGeneration::failed(*language, err.to_string()));
                }
                return generation;
            }
        };
        let options = GenerationOptions {
            max_file_bytes: self.config.pipeline.max_file_bytes,
            max_files: self.config.pipeline.max_files_per_language,
            generate_mocks: self.config.pipeline.generate_mocks,
        };

        for (index, language) in languages.iter().enumerate() {
            tracker
                .advance(
                    band(PROGRESS_GENERATE, index, languages.len()),
                    &format!("Generating {} tests", language.display_name()),
                )
                .await;
            let result = generate_for_language(&client, root, analysis, *language, &options).await;
            generation.insert(*language, result);
        }
        generation
    }

    async fn execute(
        &self,
        tracker: &Tracker<'_>,
        root: &std::path::Path,
        generation: &BTreeMap<Language, LanguageGeneration>,
        budget: Budget,
    ) -> BTreeMap<Language, ExecutionResult> {
        let runnable: Vec<&LanguageGeneration> = generation.values().filter(|g| g.success).collect();
        let mut execution = BTreeMap::new();

        tracker.advance(PROGRESS_EXECUTE.0, "Running tests").await;
        for (index, entry) in runnable.iter().enumerate() {
            tracker
                .advance(
                    band(PROGRESS_EXECUTE, index, runnable.len()),
                    &format!("Running {} tests", entry.language.display_name()),
                )
                .await;
            let request = ExecutionRequest {
                root,
                language: entry.language,
                framework: &entry.framework,
                budget,
            };
            let result = self.executor.run(request).await;
            execution.insert(entry.language, result);
        }
        execution
    }
}

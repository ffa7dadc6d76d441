//! Mirror orchestrator - main workflow coordinator.
//!
//! Runs the phases strictly in order: load, patch, create, seed, update,
//! alter, then the optional snapshot dump. Each script is written before the
//! next phase starts; the first error aborts the run.

use std::path::PathBuf;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::Config;
use crate::core::traits::CatalogReader;
use crate::core::Catalog;
use crate::data::{DataReconciler, DataSet, RowSource};
use crate::ddl;
use crate::diff::Patch;
use crate::drivers::MssqlReader;
use crate::error::{MirrorError, Result};
use crate::loader;
use crate::script::{Phase, Script};
use crate::selector::Selection;
use crate::snapshot;

/// Mirror orchestrator.
pub struct Orchestrator {
    config: Config,
    source: Option<Box<dyn CatalogReader>>,
    target: Box<dyn CatalogReader>,
}

/// One written script.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptSummary {
    pub phase: Phase,
    pub path: PathBuf,
    pub batches: usize,
}

/// Result of a mirror run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorResult {
    /// Unique run identifier.
    pub run_id: String,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Whether the source came from a snapshot.
    pub offline: bool,

    /// Source and target database names.
    pub source_database: String,
    pub target_database: String,

    /// Scripts in execution order.
    pub scripts: Vec<ScriptSummary>,

    /// Directory of the snapshot dump, when one was written.
    pub snapshot: Option<PathBuf>,
}

/// Connection test results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    /// `None` in offline mode.
    pub source_connected: Option<bool>,
    pub source_latency_ms: u64,
    pub source_error: Option<String>,
    pub target_connected: bool,
    pub target_latency_ms: u64,
    pub target_error: Option<String>,
    pub healthy: bool,
}

async fn ping(reader: &dyn CatalogReader) -> (bool, u64, Option<String>) {
    let started = Instant::now();
    let outcome = reader.ping().await;
    let latency = started.elapsed().as_millis() as u64;
    match outcome {
        Ok(()) => (true, latency, None),
        Err(e) => (false, latency, Some(e.to_string())),
    }
}

impl Orchestrator {
    /// Create an orchestrator over live SQL Server connections.
    pub fn new(config: Config) -> Result<Self> {
        let source = config
            .source
            .clone()
            .map(|c| Box::new(MssqlReader::new(c)) as Box<dyn CatalogReader>);
        let target = Box::new(MssqlReader::new(config.target.clone()));
        Self::with_readers(config, source, target)
    }

    /// Create an orchestrator over caller-supplied readers.
    pub fn with_readers(
        config: Config,
        source: Option<Box<dyn CatalogReader>>,
        target: Box<dyn CatalogReader>,
    ) -> Result<Self> {
        if source.is_none() && !config.is_offline() {
            return Err(MirrorError::Config(
                "no source connection or snapshot path configured".to_string(),
            ));
        }
        Ok(Self {
            config,
            source,
            target,
        })
    }

    /// Run every phase and write the scripts.
    pub async fn run(self) -> Result<MirrorResult> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let output_dir = self.config.output_dir();
        info!("Starting mirror run: {}", run_id);

        // Phase 1: Load
        info!("Phase 1: Loading catalogs");
        let (source, selection, snapshot_rows) = self.load_source().await?;
        let target = loader::load_catalog(self.target.as_ref(), &selection, "target").await?;
        std::fs::create_dir_all(&output_dir)?;

        let mut scripts = Vec::new();
        let mut write = |script: Script| -> Result<()> {
            let path = script.write_to(&output_dir)?;
            scripts.push(ScriptSummary {
                phase: script.phase(),
                path,
                batches: script.batches().len(),
            });
            Ok(())
        };

        // Phase 2: Patch
        info!("Phase 2: Patching existing objects");
        write(Patch::between(&source, &target).script(target.database_name()))?;

        // Phase 3: Create
        info!("Phase 3: Creating missing objects");
        write(ddl::create_script(&source, target.database_name()))?;

        // Phases 4-5: Seed and update
        let rows = match (&self.source, &snapshot_rows) {
            (Some(reader), _) => RowSource::Live(reader.as_ref()),
            (None, Some(data)) => RowSource::Snapshot(data),
            (None, None) => {
                return Err(MirrorError::Config("no row source available".to_string()))
            }
        };
        let mut reconciler = DataReconciler::new(&source, &target, &selection, rows);
        info!("Phase 4: Seeding empty tables");
        write(reconciler.seed().await?)?;
        info!("Phase 5: Updating changed tables");
        write(reconciler.update().await?)?;
        let data = reconciler.into_data_set();

        // Phase 6: Alter
        info!("Phase 6: Adding constraints and replacing routines");
        write(ddl::alter_script(&source, &target, self.config.routines))?;

        // Phase 7: Dump
        let snapshot = if self.config.output.dump {
            info!("Phase 7: Dumping source snapshot");
            if data.is_empty() {
                warn!("Snapshot carries no rows: offline runs will seed and update nothing");
            }
            snapshot::write_snapshot(&output_dir, &source, &data)?;
            Some(output_dir.clone())
        } else {
            None
        };

        let completed_at = Utc::now();
        let duration = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;
        let result = MirrorResult {
            run_id,
            started_at,
            completed_at,
            duration_seconds: duration,
            offline: self.source.is_none(),
            source_database: source.database_name().to_string(),
            target_database: target.database_name().to_string(),
            scripts,
            snapshot,
        };

        info!(
            "Mirror completed: {} scripts written to {} in {:.1}s",
            result.scripts.len(),
            output_dir.display(),
            result.duration_seconds
        );
        Ok(result)
    }

    /// Source catalog, the selection shared by both sides, and the
    /// snapshot rows in offline mode.
    async fn load_source(&self) -> Result<(Catalog, Selection, Option<DataSet>)> {
        let model = self.config.model.as_ref();
        let data = self.config.data.as_ref();

        match &self.source {
            Some(reader) => {
                let selection = loader::discover_selection(reader.as_ref(), model, data).await?;
                let catalog = loader::load_catalog(reader.as_ref(), &selection, "source").await?;
                Ok((catalog, selection, None))
            }
            None => {
                let dir = self.config.output_dir();
                info!("Offline mode: reading source snapshot from {}", dir.display());
                let (catalog, rows) = snapshot::read_snapshot(&dir)?;
                let names: Vec<String> = catalog.schemas().iter().map(|s| s.name.clone()).collect();
                let selection = Selection::resolve(model, data, &names)?;
                Ok((catalog, selection, Some(rows)))
            }
        }
    }

    /// Test database connections.
    pub async fn health_check(&self) -> Result<HealthCheckResult> {
        let (source_connected, source_latency_ms, source_error) = match &self.source {
            Some(reader) => {
                let (ok, ms, err) = ping(reader.as_ref()).await;
                (Some(ok), ms, err)
            }
            None => (None, 0, None),
        };
        let (target_connected, target_latency_ms, target_error) = ping(self.target.as_ref()).await;

        let healthy = target_connected && source_connected.unwrap_or(true);
        if !healthy {
            warn!("Health check failed");
        }
        Ok(HealthCheckResult {
            source_connected,
            source_latency_ms,
            source_error,
            target_connected,
            target_latency_ms,
            target_error,
            healthy,
        })
    }
}

//! Generated script artifacts.
//!
//! A phase produces a [`Script`]: an ordered list of batches. Rendering adds
//! the database context line and the `GO` separators, or a placeholder
//! comment when the phase had nothing to do.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::drivers::mssql::dialect;
use crate::error::Result;

/// Batch separator.
pub const BATCH_SEPARATOR: &str = "GO";

/// Pipeline phases that emit a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Patch,
    Create,
    Seed,
    Update,
    Alter,
}

impl Phase {
    /// Execution order.
    pub const ALL: [Phase; 5] = [
        Phase::Patch,
        Phase::Create,
        Phase::Seed,
        Phase::Update,
        Phase::Alter,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            Phase::Patch => "patch.sql",
            Phase::Create => "create.sql",
            Phase::Seed => "seed.sql",
            Phase::Update => "update.sql",
            Phase::Alter => "alter.sql",
        }
    }

    /// Comment written when the phase produced no batches.
    pub fn placeholder(self) -> &'static str {
        match self {
            Phase::Patch => "-- Nothing to patch. --",
            Phase::Create => "-- Nothing to create. --",
            Phase::Seed => "-- Nothing to seed. --",
            Phase::Update => "-- Nothing to update. --",
            Phase::Alter => "-- Nothing to alter. --",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Patch => "patch",
            Phase::Create => "create",
            Phase::Seed => "seed",
            Phase::Update => "update",
            Phase::Alter => "alter",
        };
        f.write_str(name)
    }
}

/// Ordered batches for one phase against one database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    phase: Phase,
    database: String,
    batches: Vec<String>,
}

impl Script {
    pub fn new(phase: Phase, database: impl Into<String>) -> Self {
        Self {
            phase,
            database: database.into(),
            batches: Vec::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn push(&mut self, batch: impl Into<String>) {
        self.batches.push(batch.into());
    }

    pub fn extend<I>(&mut self, batches: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.batches.extend(batches);
    }

    pub fn batches(&self) -> &[String] {
        &self.batches
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Full script text.
    pub fn render(&self) -> String {
        let mut out = format!("{}\n\n", dialect::use_database(&self.database));
        if self.batches.is_empty() {
            out.push_str(self.phase.placeholder());
            out.push('\n');
            return out;
        }
        for batch in &self.batches {
            out.push_str(batch);
            out.push('\n');
            out.push_str(BATCH_SEPARATOR);
            out.push_str("\n\n");
        }
        out
    }

    /// Write the rendered script into `dir` under the phase's file name.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(self.phase.file_name());
        std::fs::write(&path, self.render())?;
        info!(
            "Wrote {} ({} batches) to {}",
            self.phase,
            self.batches.len(),
            path.display()
        );
        Ok(path)
    }
}

//! Project file migration
//!
//! A project file is tagged with the `appVersion` that wrote it. Migration
//! walks an ordered list of [`Migration`] records, each gated by a
//! [`VersionRange`], and applies the ones whose range contains that version.
//! Bounds ascend through the list, so a file from any past release runs only
//! the steps it still needs and ends up in the current shape. The result is
//! then validated by the [`SchemaRegistry`].
//!
//! ```text
//! raw JSON ──▶ appVersion check ──▶ step 1 ─▶ … ─▶ step n ──▶ schema ──▶ talk checks ──▶ ProjectDocument
//! ```
//!
//! The document is taken by value and only handed back once every check has
//! passed; a failed migration leaves the caller with nothing half-migrated.

mod document;
pub mod latest;
pub mod mora;
pub mod song;
pub mod talk;

use std::cmp::Ordering;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::checksum::Checksum;
use crate::config::{DefaultsConfig, MigrationConfig};
use crate::error::{ProjectError, Result};
use crate::registry::SchemaRegistry;
use crate::schema::{AccentPhrase, EngineId, ProjectDocument, StyleId, Voice};
use crate::version::{cmp_precedence, ProjectVersion, VersionRange};

/// Recomputes phoneme timing through a synthesis engine
///
/// Implementations return the same number of accent phrases with the same
/// moras; only timing fields are expected to differ.
#[async_trait]
pub trait MoraDataFetcher: Send + Sync {
    async fn fetch_mora_data(
        &self,
        accent_phrases: &[AccentPhrase],
        engine_id: &EngineId,
        style_id: StyleId,
    ) -> anyhow::Result<Vec<AccentPhrase>>;
}

/// External inputs a migration may need
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub fetcher: &'a dyn MoraDataFetcher,
    /// Every voice currently known to the application
    pub voices: &'a [Voice],
}

/// What a step sees besides the document
pub struct MigrationContext<'a> {
    pub fetcher: &'a dyn MoraDataFetcher,
    pub voices: &'a [Voice],
    pub defaults: &'a DefaultsConfig,
}

/// One structural rewrite of the document
#[async_trait]
pub trait MigrationStep: Send + Sync {
    async fn apply(&self, document: &mut Value, ctx: &MigrationContext<'_>) -> Result<()>;
}

/// A step together with the versions it applies to
pub struct Migration {
    pub name: &'static str,
    pub range: VersionRange,
    /// Also run for the development sentinel version
    pub runs_on_development: bool,
    step: Box<dyn MigrationStep>,
}

impl Migration {
    pub fn new(name: &'static str, range: &str, step: impl MigrationStep + 'static) -> Result<Self> {
        Ok(Self {
            name,
            range: range.parse()?,
            runs_on_development: false,
            step: Box::new(step),
        })
    }

    /// Mark the step to run for development builds regardless of version
    pub fn on_development(mut self) -> Self {
        self.runs_on_development = true;
        self
    }

    pub fn applies_to(&self, version: &ProjectVersion, development: bool) -> bool {
        version.satisfies(&self.range) || (development && self.runs_on_development)
    }

    pub async fn apply(&self, document: &mut Value, ctx: &MigrationContext<'_>) -> Result<()> {
        self.step.apply(document, ctx).await
    }
}

impl std::fmt::Debug for Migration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migration")
            .field("name", &self.name)
            .field("range", &self.range.to_string())
            .field("runs_on_development", &self.runs_on_development)
            .finish()
    }
}

/// The full history of format changes, oldest first
pub fn default_migrations() -> Result<Vec<Migration>> {
    Ok(vec![
        Migration::new("rename-character-index", "<0.4.0", talk::RenameCharacterIndex)?,
        Migration::new("query-scale-defaults", "<0.4.0", talk::QueryScaleDefaults)?,
        Migration::new("recompute-mora-timing", "<0.5.0", mora::RecomputeMoraTiming)?,
        Migration::new("character-index-to-speaker", "<0.7.0", talk::CharacterIndexToSpeaker)?,
        Migration::new("speaker-to-style-id", "<0.8.0", talk::SpeakerToStyleId)?,
        Migration::new("default-engine-id", "<0.14.0", talk::DefaultEngineId)?,
        Migration::new("resolve-voice", "<0.15.0", talk::ResolveVoice)?,
        Migration::new("split-talk-and-song", "<0.17.0", song::SplitTalkAndSong)?,
        Migration::new("track-volume-range", "<0.17.1", song::TrackVolumeRange)?,
        Migration::new("track-pitch-edit-data", "<0.19.0", song::TrackPitchEditData)?,
        Migration::new("keyed-tracks", "<0.20.0", song::KeyedTracks)?,
        Migration::new("pause-length-scale", "<0.22.0", talk::PauseLengthScale)?,
        Migration::new("current-shape-backfill", "<1.1.0-dev", latest::CurrentShapeBackfill)?
            .on_development(),
    ])
}

/// Read and check `appVersion` without touching the document
pub fn read_app_version(document: &Value) -> Result<ProjectVersion> {
    let raw = document
        .get("appVersion")
        .and_then(Value::as_str)
        .ok_or_else(|| ProjectError::format("The appVersion of the project file should be string"))?;
    ProjectVersion::parse(raw).map_err(|_| {
        ProjectError::format(format!(
            "The app version of the project file \"{}\" is invalid. The app version should be a string in semver format.",
            raw
        ))
    })
}

/// Summary of one migration run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    /// `appVersion` as stored in the input
    pub from_version: String,
    /// Steps that ran, in order
    pub applied: Vec<&'static str>,
    /// Whether the development sentinel forced the newest step
    pub forced: bool,
    pub before: Checksum,
    pub after: Checksum,
}

impl MigrationReport {
    /// Whether any step changed the document
    pub fn changed(&self) -> bool {
        self.before != self.after
    }
}

/// Ordered, version-gated migration followed by validation
pub struct MigrationPipeline {
    config: MigrationConfig,
    registry: SchemaRegistry,
    migrations: Vec<Migration>,
}

impl std::fmt::Debug for MigrationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationPipeline")
            .field("config", &self.config)
            .field("migrations", &self.migrations)
            .finish_non_exhaustive()
    }
}

impl MigrationPipeline {
    /// Pipeline over the full migration history
    pub fn new(config: MigrationConfig) -> Result<Self> {
        Self::with_migrations(config, default_migrations()?)
    }

    /// Pipeline over a custom list, which must ascend by upper bound
    pub fn with_migrations(config: MigrationConfig, migrations: Vec<Migration>) -> Result<Self> {
        let mut previous: Option<&Migration> = None;
        for migration in &migrations {
            let bound = migration.range.upper_bound().ok_or_else(|| {
                ProjectError::InvalidRange(format!(
                    "migration {} has no upper bound ({})",
                    migration.name, migration.range
                ))
            })?;
            if let Some(prev) = previous {
                let prev_bound = prev.range.upper_bound().unwrap_or(bound);
                if cmp_precedence(prev_bound, bound) == Ordering::Greater {
                    return Err(ProjectError::InvalidRange(format!(
                        "migration {} ({}) is listed after {} ({})",
                        migration.name, migration.range, prev.name, prev.range
                    )));
                }
            }
            previous = Some(migration);
        }

        Ok(Self {
            config,
            registry: SchemaRegistry::new()?,
            migrations,
        })
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    /// Migrate a raw project file into the current format
    pub async fn migrate(&self, document: Value, collaborators: &Collaborators<'_>) -> Result<ProjectDocument> {
        let (project, _) = self.migrate_with_report(document, collaborators).await?;
        Ok(project)
    }

    /// Migrate and report which steps ran
    pub async fn migrate_with_report(
        &self,
        mut document: Value,
        collaborators: &Collaborators<'_>,
    ) -> Result<(ProjectDocument, MigrationReport)> {
        let version = read_app_version(&document)?;
        let forced = self.config.forces_latest(&version);
        if forced {
            warn!(version = %version.as_str(), "development version, forcing the newest migration");
        }

        let before = Checksum::from_json(&document);
        let ctx = MigrationContext {
            fetcher: collaborators.fetcher,
            voices: collaborators.voices,
            defaults: &self.config.defaults,
        };

        let mut applied = Vec::new();
        for migration in &self.migrations {
            if !migration.applies_to(&version, forced) {
                debug!(step = migration.name, range = %migration.range, "skipping migration");
                continue;
            }
            debug!(step = migration.name, range = %migration.range, "applying migration");
            migration.apply(&mut document, &ctx).await?;
            applied.push(migration.name);
        }
        let after = Checksum::from_json(&document);

        // The song section is checked by the score loader downstream.
        let project = self.registry.parse_and_validate(&document)?;
        self.registry.validate_talk_project(&project.talk)?;

        info!(
            from = %version.as_str(),
            steps = applied.len(),
            before = before.short(),
            after = after.short(),
            "project migrated"
        );

        let report = MigrationReport {
            from_version: version.as_str().to_string(),
            applied,
            forced,
            before,
            after,
        };
        Ok((project, report))
    }
}

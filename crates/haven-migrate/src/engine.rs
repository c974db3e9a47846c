//! The migration engine.
//!
//! Each source document becomes one extraction run: the document is
//! normalized into drafts, drafts are resolved against the store and each
//! other, merged contributions are classified and scored, and the result is
//! loaded in fixed-size transactional batches.

use std::{
  collections::{BTreeMap, HashMap},
  path::Path,
};

use chrono::Utc;
use haven_core::{
  catalog::Catalog,
  organization::Organization,
  source::{DataSource, ExtractionRun, RunStats, RunStatus, SourceType, UpdateFrequency},
  store::{DirectoryStore, LoadResult, StagedOrganization},
};
use haven_ingest::{
  AddressParser, ClassifierRules, DedupIndex, RawBatch, classify,
  classify::UNKNOWN,
  detect_shape, hash,
  identity::{self, Origin},
  quality, resolve_identity,
};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
  CancelFlag, Error, Result,
  config::SourceSpec,
  report::{MigrationReport, RunReport},
};

pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Drives documents through the pipeline into a [`DirectoryStore`].
pub struct Engine<S> {
  store:      S,
  catalog:    Catalog,
  rules:      ClassifierRules,
  parser:     AddressParser,
  batch_size: usize,
  cancel:     CancelFlag,
}

/// What one source contributed to one organization in a run.
struct Contribution {
  organization: Organization,
  /// Raw records behind the contribution, in document order.
  payload:      Vec<Value>,
}

impl<S: DirectoryStore> Engine<S> {
  pub fn new(store: S, catalog: Catalog) -> Result<Self> {
    Ok(Self {
      store,
      catalog,
      rules: ClassifierRules::standard()?,
      parser: AddressParser::new()?,
      batch_size: DEFAULT_BATCH_SIZE,
      cancel: CancelFlag::new(),
    })
  }

  pub fn with_rules(mut self, rules: ClassifierRules) -> Self {
    self.rules = rules;
    self
  }

  /// Organizations per load transaction; at least one.
  pub fn with_batch_size(mut self, batch_size: usize) -> Self {
    self.batch_size = batch_size.max(1);
    self
  }

  pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
    self.cancel = cancel;
    self
  }

  pub fn store(&self) -> &S { &self.store }

  pub fn catalog(&self) -> &Catalog { &self.catalog }

  // ─── Setup ─────────────────────────────────────────────────────────────────

  /// Seed reference data and register every catalog source.
  pub async fn prepare(&self) -> Result<()> {
    self
      .store
      .seed_reference_data(&self.catalog)
      .await
      .map_err(Error::store)?;
    for source in self.catalog.sources() {
      self
        .store
        .register_source(source.clone())
        .await
        .map_err(Error::store)?;
    }
    Ok(())
  }

  /// The data source a [`SourceSpec`] refers to. Catalog sources may have their
  /// category overridden; other ids need a category.
  pub fn resolve_source(&self, spec: &SourceSpec) -> Result<DataSource> {
    match (self.catalog.source(&spec.source_id), spec.category) {
      (Some(known), category) => {
        let mut source = known.clone();
        if let Some(category) = category {
          source.category = category;
        }
        Ok(source)
      }
      (None, Some(category)) => Ok(DataSource {
        source_id: spec.source_id.clone(),
        source_name: spec
          .source_name
          .clone()
          .unwrap_or_else(|| spec.source_id.clone()),
        source_type: SourceType::Manual,
        source_url: spec.source_url.clone(),
        source_organization: None,
        reliability_score: 0.5,
        update_frequency: UpdateFrequency::Monthly,
        official_source: false,
        category,
        first_accessed: Some(Utc::now().date_naive()),
      }),
      (None, None) => Err(Error::UnknownSource(spec.source_id.clone())),
    }
  }

  // ─── Migration ─────────────────────────────────────────────────────────────

  /// Ingest every configured source in order, then create indexes and
  /// views and report on the directory.
  ///
  /// Sources are resolved before anything is written, so a bad source list
  /// fails the migration up front. Per-source failures are recorded on the
  /// run and do not stop the migration.
  pub async fn migrate(&self, specs: &[SourceSpec]) -> Result<MigrationReport> {
    let sources = specs
      .iter()
      .map(|spec| Ok((self.resolve_source(spec)?, spec.path.as_path())))
      .collect::<Result<Vec<_>>>()?;

    self.prepare().await?;

    let mut runs = Vec::with_capacity(sources.len());
    let mut skipped = Vec::new();
    for (source, path) in sources {
      if self.cancel.is_cancelled() {
        skipped.push(source.source_id);
        continue;
      }
      self
        .store
        .register_source(source.clone())
        .await
        .map_err(Error::store)?;
      let report = self.ingest_file(&source, path).await?;
      report.log();
      runs.push(report);
    }

    self.store.finalize().await.map_err(Error::store)?;
    let summary = self.store.summary().await.map_err(Error::store)?;
    let report = MigrationReport { runs, summary, skipped };
    report.log();
    Ok(report)
  }

  /// Read a JSON document from disk and ingest it. An unreadable file or
  /// invalid JSON fails the run, not the call.
  pub async fn ingest_file(&self, source: &DataSource, path: &Path) -> Result<RunReport> {
    let document = match tokio::fs::read_to_string(path).await {
      Ok(text) => serde_json::from_str::<Value>(&text)
        .map_err(|e| format!("invalid JSON in {}: {e}", path.display())),
      Err(source) => Err(
        Error::Read {
          path: path.to_owned(),
          source,
        }
        .to_string(),
      ),
    };
    self.run(source, document).await
  }

  /// Ingest an in-memory document as one run.
  pub async fn ingest_document(&self, source: &DataSource, document: Value) -> Result<RunReport> {
    self.run(source, Ok(document)).await
  }

  // ─── Runs ──────────────────────────────────────────────────────────────────

  async fn run(
    &self,
    source: &DataSource,
    document: std::result::Result<Value, String>,
  ) -> Result<RunReport> {
    let run = self
      .store
      .begin_run(source.source_id.clone())
      .await
      .map_err(Error::store)?;

    let batch = document.and_then(|doc| detect_shape(doc).map_err(|e| e.to_string()));
    let batch = match batch {
      Ok(batch) => batch,
      Err(reason) => {
        warn!(source_id = %source.source_id, reason = %reason, "source skipped");
        return self
          .finish(
            &run,
            RunStatus::Failed,
            RunStats::default(),
            LoadResult::default(),
            Some(reason),
            false,
          )
          .await;
      }
    };
    debug!(source_id = %source.source_id, shape = batch.shape_name(), "document shape detected");

    let mut stats = RunStats::default();
    let mut load = LoadResult::default();
    match self.process(source, &run, batch, &mut stats, &mut load).await {
      Ok(cancelled) => {
        let status = if cancelled || load.errors > 0 {
          RunStatus::Partial
        } else {
          RunStatus::Completed
        };
        self.finish(&run, status, stats, load, None, cancelled).await
      }
      Err(e) => {
        if let Err(close) = self.store.complete_run(run.run_id, RunStatus::Failed, stats).await {
          warn!(run_id = %run.run_id, error = %close, "could not mark run failed");
        }
        Err(e)
      }
    }
  }

  async fn finish(
    &self,
    run: &ExtractionRun,
    status: RunStatus,
    stats: RunStats,
    load: LoadResult,
    failure: Option<String>,
    cancelled: bool,
  ) -> Result<RunReport> {
    let run = self
      .store
      .complete_run(run.run_id, status, stats)
      .await
      .map_err(Error::store)?;
    Ok(RunReport { run, load, failure, cancelled })
  }

  /// Normalize, resolve, stage and load one document. Returns whether the
  /// run was cancelled before every batch was written.
  async fn process(
    &self,
    source: &DataSource,
    run: &ExtractionRun,
    batch: RawBatch,
    stats: &mut RunStats,
    load: &mut LoadResult,
  ) -> Result<bool> {
    let records = batch.into_records();
    stats.records_extracted = records.len() as u64;
    let run_date = run.started_at.date_naive();

    // Ordered by id, so duplicate detection is deterministic.
    let existing = self.store.list_organizations().await.map_err(Error::store)?;
    let mut index = DedupIndex::from_persisted(&existing);
    let persisted: HashMap<String, Organization> =
      existing.into_iter().map(|o| (o.id.clone(), o)).collect();

    let mut contributions: BTreeMap<String, Contribution> = BTreeMap::new();
    for record in records {
      let mut draft = match record.to_draft(&self.parser) {
        Ok(draft) => draft,
        Err(e) => {
          warn!(source_id = %source.source_id, position = record.position, error = %e, "record rejected");
          stats.records_rejected += 1;
          continue;
        }
      };
      stats.malformed_fields += draft.malformed.len() as u64;
      draft.apply_category_defaults(source.category);

      let resolution = resolve_identity(&draft, &source.source_id, &index);
      let id = resolution.organization_id.clone();
      let name = draft.name.clone();
      let state = draft.address.state.clone();
      let raw = std::mem::take(&mut draft.raw);
      // Keyed by candidate id until staged, so the record with the smaller
      // candidate id is authoritative whatever id the group ends up with.
      let organization =
        draft.into_organization(resolution.candidate_id.clone(), &source.source_id, run_date);

      let previous = match resolution.renames_staged() {
        Some(old_id) => {
          index.rekey(old_id, &id, &name);
          contributions.remove(old_id)
        }
        None => contributions.remove(&id),
      };
      if resolution.is_new {
        index.insert(&id, &name, state.as_deref(), Origin::Staged);
      }

      let matched_by_name = resolution
        .matched
        .as_ref()
        .is_some_and(|m| m.origin == Origin::Persisted && m.id != resolution.candidate_id);
      if previous.is_some() || matched_by_name {
        stats.duplicates_merged += 1;
        debug!(organization_id = %id, candidate_id = %resolution.candidate_id, "duplicate merged");
      }

      let contribution = match previous {
        Some(mut previous) => {
          previous.organization = identity::merge_staged(previous.organization, organization);
          previous.payload.push(raw);
          previous
        }
        None => Contribution { organization, payload: vec![raw] },
      };
      contributions.insert(id, contribution);
    }

    let mut pending = contributions
      .into_iter()
      .map(|(id, mut c)| {
        c.organization.id = id;
        let existing = persisted.get(&c.organization.id);
        self.stage(source, run, c, existing)
      })
      .collect::<Result<Vec<_>>>()?;

    while !pending.is_empty() {
      if self.cancel.is_cancelled() {
        warn!(
          source_id = %source.source_id,
          remaining = pending.len(),
          "run cancelled; remaining batches skipped"
        );
        return Ok(true);
      }
      let rest = pending.split_off(self.batch_size.min(pending.len()));
      let batch = std::mem::replace(&mut pending, rest);
      let result = self.store.load_batch(batch).await.map_err(Error::store)?;

      stats.records_rejected += result.errors;
      load.absorb(result);
      stats.records_added = load.inserted;
      stats.records_updated = load.updated;
      stats.records_unchanged = load.unchanged;
    }

    info!(
      source_id = %source.source_id,
      organizations = load.inserted + load.updated + load.unchanged,
      lineage_versions = load.lineage_versions,
      type_changes = load.type_changes,
      "document loaded"
    );
    Ok(false)
  }

  /// Merge a contribution into its stored record (if any), then classify
  /// and score the result.
  fn stage(
    &self,
    source: &DataSource,
    run: &ExtractionRun,
    contribution: Contribution,
    existing: Option<&Organization>,
  ) -> Result<StagedOrganization> {
    let data_hash = hash::data_hash(&contribution.organization)?;

    let mut organization = match existing {
      Some(existing) => {
        let mut merged = existing.clone();
        identity::merge(&mut merged, contribution.organization);
        merged
      }
      None => contribution.organization,
    };

    let classification = classify(&organization, &self.rules);
    // Without certification evidence a stored leaf type is kept, so a
    // source of another category does not reassign it.
    let type_id = match existing {
      Some(existing)
        if classification.certification == UNKNOWN
          && self.catalog.taxonomy().is_leaf(&existing.organization_type) =>
      {
        existing.organization_type.clone()
      }
      _ => classification.type_id(
        &self.catalog,
        source.category,
        organization.level_of_care.as_deref(),
      )?,
    };
    classification.apply(&mut organization, &self.catalog, type_id);
    quality::apply(&mut organization);

    Ok(StagedOrganization {
      organization,
      source_id: source.source_id.clone(),
      run_id: run.run_id,
      data_hash,
      payload: Value::Array(contribution.payload),
      type_confidence: classification.confidence,
    })
  }
}

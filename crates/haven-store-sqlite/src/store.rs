//! [`SqliteStore`]: the SQLite implementation of [`DirectoryStore`].

use std::{collections::BTreeMap, path::Path, sync::Arc};

use chrono::Utc;
use rusqlite::{OptionalExtension as _, params};
use tracing::{debug, info};
use uuid::Uuid;

use haven_core::{
  catalog::Catalog,
  lineage::{LineageOutcome, OrganizationLineage, TypeAssignment},
  organization::Organization,
  source::{DataSource, ExtractionRun, RunStats, RunStatus},
  store::{DirectoryStore, DirectorySummary, LoadResult, StagedOrganization},
};

use crate::{
  Error, Result,
  encode::{
    ORGANIZATION_COLUMNS, RUN_COLUMNS, RawLineage, RawOrganization, RawRun, RawSource,
    RawTypeAssignment, encode_date, encode_dt, encode_list, encode_stats, encode_uuid,
  },
  lineage::{self, LineageWrite, TypeWrite},
  load::{self, PreparedRecord},
  schema::{Schema, SchemaSource},
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A recovery services directory backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn:   tokio_rusqlite::Connection,
  schema: Arc<Schema>,
}

impl SqliteStore {
  /// Open (or create) a store at `path` with the embedded schema.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    Self::open_with_schema(path, &SchemaSource::Embedded).await
  }

  /// Open (or create) a store at `path`, reading schema scripts from
  /// `schema`. Fails before touching the database if a script is missing.
  pub async fn open_with_schema(path: impl AsRef<Path>, schema: &SchemaSource) -> Result<Self> {
    let schema = Arc::new(schema.load()?);
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn, schema };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let schema = Arc::new(SchemaSource::Embedded.load()?);
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn, schema };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    let schema = Arc::clone(&self.schema);
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(&schema.core_tables)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn fetch_run(&self, run_id: Uuid) -> Result<Option<ExtractionRun>> {
    let id_str = encode_uuid(run_id);
    let raw: Option<RawRun> = self
      .conn
      .call(move |conn| {
        let raw = conn
          .query_row(
            &format!("SELECT {RUN_COLUMNS} FROM extraction_runs WHERE run_id = ?1"),
            params![id_str],
            RawRun::from_row,
          )
          .optional()?;
        Ok(raw)
      })
      .await?;
    raw.map(RawRun::into_run).transpose()
  }

  #[cfg(test)]
  pub(crate) fn conn_for_tests(&self) -> &tokio_rusqlite::Connection { &self.conn }
}

// ─── DirectoryStore impl ─────────────────────────────────────────────────────

impl DirectoryStore for SqliteStore {
  type Error = Error;

  // ── Reference data ────────────────────────────────────────────────────────

  async fn seed_reference_data<'a>(&'a self, catalog: &'a Catalog) -> Result<()> {
    let taxonomy = catalog.taxonomy();

    // Parents before children so the self-referencing foreign key holds.
    let mut types = taxonomy.types().to_vec();
    types.sort_by_key(|t| taxonomy.lineage(&t.type_id).len());

    let authorities = catalog
      .certifications()
      .authorities()
      .iter()
      .map(|a| Ok((a.clone(), encode_list(&a.jurisdiction_states)?)))
      .collect::<Result<Vec<_>>>()?;
    let cert_types = catalog
      .certifications()
      .types()
      .iter()
      .map(|c| Ok((c.clone(), encode_list(&c.applies_to_org_types)?)))
      .collect::<Result<Vec<_>>>()?;

    let counts = (types.len(), authorities.len(), cert_types.len());

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut stmt = tx.prepare(
            "INSERT INTO organization_types (
               type_id, type_name, parent_type_id, category, level_of_care, description
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(type_id) DO NOTHING",
          )?;
          for t in &types {
            stmt.execute(params![
              t.type_id,
              t.type_name,
              t.parent_type_id,
              t.category,
              t.level_of_care,
              t.description,
            ])?;
          }

          let mut stmt = tx.prepare(
            "INSERT INTO certification_authorities (
               authority_id, authority_name, authority_type, jurisdiction_level,
               jurisdiction_states, website, accreditation_body, is_narr_affiliate
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(authority_id) DO NOTHING",
          )?;
          for (a, states) in &authorities {
            stmt.execute(params![
              a.authority_id,
              a.authority_name,
              a.authority_type,
              a.jurisdiction_level,
              states,
              a.website,
              a.accreditation_body,
              a.is_narr_affiliate,
            ])?;
          }

          let mut stmt = tx.prepare(
            "INSERT INTO certification_types (
               cert_type_id, authority_id, cert_type_name, certification_level,
               applies_to_org_types, renewal_period_months
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(cert_type_id) DO NOTHING",
          )?;
          for (c, applies_to) in &cert_types {
            stmt.execute(params![
              c.cert_type_id,
              c.authority_id,
              c.cert_type_name,
              c.certification_level,
              applies_to,
              c.renewal_period_months,
            ])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    debug!(
      types = counts.0,
      authorities = counts.1,
      cert_types = counts.2,
      "reference data seeded"
    );
    Ok(())
  }

  async fn register_source(&self, source: DataSource) -> Result<()> {
    let first_accessed = source.first_accessed.map(encode_date);
    let registered_at = encode_dt(Utc::now());
    let source_id = source.source_id.clone();

    let inserted = self
      .conn
      .call(move |conn| {
        let n = conn.execute(
          "INSERT INTO data_sources (
             source_id, source_name, source_type, source_url, source_organization,
             reliability_score, update_frequency, official_source, category,
             first_accessed, registered_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
           ON CONFLICT(source_id) DO NOTHING",
          params![
            source.source_id,
            source.source_name,
            source.source_type.as_str(),
            source.source_url,
            source.source_organization,
            source.reliability_score,
            source.update_frequency.as_str(),
            source.official_source,
            source.category.as_str(),
            first_accessed,
            registered_at,
          ],
        )?;
        Ok(n > 0)
      })
      .await?;

    if inserted {
      info!(source_id = %source_id, "data source registered");
    }
    Ok(())
  }

  async fn get_source(&self, source_id: String) -> Result<Option<DataSource>> {
    let raw: Option<RawSource> = self
      .conn
      .call(move |conn| {
        let raw = conn
          .query_row(
            "SELECT source_id, source_name, source_type, source_url, source_organization,
                    reliability_score, update_frequency, official_source, category,
                    first_accessed
               FROM data_sources WHERE source_id = ?1",
            params![source_id],
            |r| {
              Ok(RawSource {
                source_id:           r.get(0)?,
                source_name:         r.get(1)?,
                source_type:         r.get(2)?,
                source_url:          r.get(3)?,
                source_organization: r.get(4)?,
                reliability_score:   r.get(5)?,
                update_frequency:    r.get(6)?,
                official_source:     r.get(7)?,
                category:            r.get(8)?,
                first_accessed:      r.get(9)?,
              })
            },
          )
          .optional()?;
        Ok(raw)
      })
      .await?;
    raw.map(RawSource::into_source).transpose()
  }

  // ── Extraction runs ───────────────────────────────────────────────────────

  async fn begin_run(&self, source_id: String) -> Result<ExtractionRun> {
    let run = ExtractionRun {
      run_id:          Uuid::new_v4(),
      source_id,
      extraction_type: "full".to_owned(),
      started_at:      Utc::now(),
      completed_at:    None,
      status:          RunStatus::Running,
      stats:           RunStats::default(),
    };

    let id_str = encode_uuid(run.run_id);
    let source_id = run.source_id.clone();
    let extraction_type = run.extraction_type.clone();
    let started_at = encode_dt(run.started_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO extraction_runs (
             run_id, source_id, extraction_type, started_at, status
           ) VALUES (?1, ?2, ?3, ?4, 'running')",
          params![id_str, source_id, extraction_type, started_at],
        )?;
        Ok(())
      })
      .await?;

    info!(run_id = %run.run_id, source_id = %run.source_id, "extraction run started");
    Ok(run)
  }

  async fn complete_run(
    &self,
    run_id: Uuid,
    status: RunStatus,
    stats: RunStats,
  ) -> Result<ExtractionRun> {
    if !status.is_finished() {
      return Err(Error::RunStillRunning(run_id));
    }

    let id_str = encode_uuid(run_id);
    let completed_at = encode_dt(Utc::now());
    let status_str = status.as_str();
    let [extracted, added, updated, unchanged, merged, rejected, malformed] = encode_stats(&stats);

    let (changed, raw): (usize, Option<RawRun>) = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE extraction_runs SET
             status = ?2, completed_at = ?3,
             records_extracted = ?4, records_added = ?5, records_updated = ?6,
             records_unchanged = ?7, duplicates_merged = ?8, records_rejected = ?9,
             malformed_fields = ?10
           WHERE run_id = ?1 AND status = 'running'",
          params![
            id_str,
            status_str,
            completed_at,
            extracted,
            added,
            updated,
            unchanged,
            merged,
            rejected,
            malformed,
          ],
        )?;
        let raw = conn
          .query_row(
            &format!("SELECT {RUN_COLUMNS} FROM extraction_runs WHERE run_id = ?1"),
            params![id_str],
            RawRun::from_row,
          )
          .optional()?;
        Ok((changed, raw))
      })
      .await?;

    match (changed, raw) {
      (_, None) => Err(Error::RunNotFound(run_id)),
      (0, Some(_)) => Err(Error::RunAlreadyFinished(run_id)),
      (_, Some(raw)) => {
        let run = raw.into_run()?;
        info!(
          run_id = %run.run_id,
          source_id = %run.source_id,
          status = run.status.as_str(),
          extracted = run.stats.records_extracted,
          added = run.stats.records_added,
          updated = run.stats.records_updated,
          unchanged = run.stats.records_unchanged,
          merged = run.stats.duplicates_merged,
          rejected = run.stats.records_rejected,
          "extraction run finished"
        );
        Ok(run)
      }
    }
  }

  async fn get_run(&self, run_id: Uuid) -> Result<Option<ExtractionRun>> {
    self.fetch_run(run_id).await
  }

  // ── Organizations ─────────────────────────────────────────────────────────

  async fn get_organization(&self, id: String) -> Result<Option<Organization>> {
    let raw: Option<RawOrganization> = self
      .conn
      .call(move |conn| {
        let raw = conn
          .query_row(
            &format!("SELECT {ORGANIZATION_COLUMNS} FROM organizations WHERE id = ?1"),
            params![id],
            RawOrganization::from_row,
          )
          .optional()?;
        Ok(raw)
      })
      .await?;
    raw.map(RawOrganization::into_organization).transpose()
  }

  async fn list_organizations(&self) -> Result<Vec<Organization>> {
    let raws: Vec<RawOrganization> = self
      .conn
      .call(|conn| {
        let mut stmt =
          conn.prepare(&format!("SELECT {ORGANIZATION_COLUMNS} FROM organizations ORDER BY id"))?;
        let rows = stmt
          .query_map([], RawOrganization::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawOrganization::into_organization).collect()
  }

  async fn load_batch(&self, batch: Vec<StagedOrganization>) -> Result<LoadResult> {
    if batch.is_empty() {
      return Ok(LoadResult::default());
    }
    let records = batch
      .iter()
      .map(PreparedRecord::prepare)
      .collect::<Result<Vec<_>>>()?;
    let now = encode_dt(Utc::now());
    let size = records.len();

    let result = self
      .conn
      .call(move |conn| Ok(load::load_batch(conn, &records, &now)))
      .await?;

    debug!(
      size,
      inserted = result.inserted,
      updated = result.updated,
      unchanged = result.unchanged,
      errors = result.errors,
      "batch loaded"
    );
    Ok(result)
  }

  // ── Lineage ───────────────────────────────────────────────────────────────

  async fn record_lineage(
    &self,
    organization_id: String,
    source_id: String,
    run_id: Uuid,
    data_hash: String,
    payload: serde_json::Value,
  ) -> Result<LineageOutcome> {
    let run_id = encode_uuid(run_id);
    let payload = serde_json::to_string(&payload)?;
    let now = encode_dt(Utc::now());

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let outcome = lineage::record_lineage(&tx, &LineageWrite {
          organization_id: &organization_id,
          source_id:       &source_id,
          run_id:          &run_id,
          data_hash:       &data_hash,
          payload:         &payload,
          extracted_at:    &now,
        })?;
        tx.commit()?;
        Ok(outcome)
      })
      .await?;
    Ok(outcome)
  }

  async fn record_type_assignment(
    &self,
    organization_id: String,
    type_id: String,
    confidence: f64,
    classification_source: Option<String>,
  ) -> Result<bool> {
    let now = encode_dt(Utc::now());
    let changed = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let changed = lineage::record_type_assignment(&tx, &TypeWrite {
          organization_id: &organization_id,
          type_id: &type_id,
          confidence,
          classification_source: classification_source.as_deref(),
          at: &now,
        })?;
        tx.commit()?;
        Ok(changed)
      })
      .await?;
    Ok(changed)
  }

  async fn lineage(&self, organization_id: String) -> Result<Vec<OrganizationLineage>> {
    let raws: Vec<RawLineage> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT organization_id, source_id, extraction_run_id, extracted_at,
                  data_hash, version_number, is_current
             FROM organization_lineage
            WHERE organization_id = ?1
            ORDER BY lineage_id",
        )?;
        let rows = stmt
          .query_map(params![organization_id], |r| {
            Ok(RawLineage {
              organization_id:   r.get(0)?,
              source_id:         r.get(1)?,
              extraction_run_id: r.get(2)?,
              extracted_at:      r.get(3)?,
              data_hash:         r.get(4)?,
              version_number:    r.get(5)?,
              is_current:        r.get(6)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawLineage::into_lineage).collect()
  }

  async fn type_history(&self, organization_id: String) -> Result<Vec<TypeAssignment>> {
    let raws: Vec<RawTypeAssignment> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT organization_id, type_id, valid_from, valid_to, is_current,
                  classified_by, classification_source, confidence_score
             FROM organization_type_history
            WHERE organization_id = ?1
            ORDER BY history_id",
        )?;
        let rows = stmt
          .query_map(params![organization_id], |r| {
            Ok(RawTypeAssignment {
              organization_id:       r.get(0)?,
              type_id:               r.get(1)?,
              valid_from:            r.get(2)?,
              valid_to:              r.get(3)?,
              is_current:            r.get(4)?,
              classified_by:         r.get(5)?,
              classification_source: r.get(6)?,
              confidence_score:      r.get(7)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawTypeAssignment::into_assignment).collect()
  }

  // ── Post-load ─────────────────────────────────────────────────────────────

  async fn finalize(&self) -> Result<()> {
    let schema = Arc::clone(&self.schema);
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(&schema.indexes)?;
        conn.execute_batch(&schema.views)?;
        Ok(())
      })
      .await?;
    info!("indexes and views created");
    Ok(())
  }

  async fn summary(&self) -> Result<DirectorySummary> {
    let summary = self
      .conn
      .call(|conn| {
        let (total, complete, contact, average, states): (i64, i64, i64, f64, i64) = conn
          .query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(has_complete_address), 0),
                    COALESCE(SUM(has_contact_info), 0),
                    COALESCE(AVG(data_quality_score), 0.0),
                    COUNT(DISTINCT address_state)
               FROM organizations",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)),
          )?;

        let mut stmt = conn.prepare(
          "SELECT organization_type, COUNT(*) FROM organizations
            GROUP BY organization_type ORDER BY organization_type",
        )?;
        let counts_by_type: BTreeMap<String, u64> = stmt
          .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?
          .map(|row| row.map(|(type_id, n)| (type_id, to_count(n))))
          .collect::<rusqlite::Result<_>>()?;

        let lineage_rows: i64 =
          conn.query_row("SELECT COUNT(*) FROM organization_lineage", [], |r| r.get(0))?;
        let type_history_rows: i64 =
          conn.query_row("SELECT COUNT(*) FROM organization_type_history", [], |r| r.get(0))?;

        Ok(DirectorySummary {
          total_organizations: to_count(total),
          counts_by_type,
          complete_addresses: to_count(complete),
          with_contact_info: to_count(contact),
          average_quality_score: average,
          state_coverage: to_count(states),
          lineage_rows: to_count(lineage_rows),
          type_history_rows: to_count(type_history_rows),
        })
      })
      .await?;
    Ok(summary)
  }
}

fn to_count(n: i64) -> u64 { u64::try_from(n).unwrap_or(0) }

//! End-to-end engine tests against an in-memory store.

use std::path::PathBuf;

use haven_core::{
  catalog::Catalog,
  organization::Organization,
  source::{DataSource, RunStatus},
  store::DirectoryStore,
  taxonomy::SourceCategory,
};
use haven_store_sqlite::SqliteStore;
use serde_json::{Value, json};

use crate::{CancelFlag, Engine, Error, SourceSpec};

async fn engine() -> Engine<SqliteStore> {
  let store = SqliteStore::open_in_memory()
    .await
    .expect("in-memory store");
  let engine = Engine::new(store, Catalog::standard().unwrap())
    .unwrap()
    .with_batch_size(2);
  engine.prepare().await.unwrap();
  engine
}

fn source(engine: &Engine<SqliteStore>, source_id: &str) -> DataSource {
  engine.catalog().source(source_id).unwrap().clone()
}

async fn organizations(engine: &Engine<SqliteStore>) -> Vec<Organization> {
  engine.store().list_organizations().await.unwrap()
}

fn temp_dir() -> PathBuf {
  let dir = std::env::temp_dir().join(format!("haven-migrate-{}", uuid::Uuid::new_v4()));
  std::fs::create_dir_all(&dir).unwrap();
  dir
}

fn narr_document() -> Value {
  json!({
    "organizations_by_state": {
      "Texas": [
        {
          "name": "Hope House",
          "address": { "street": "100 Main St", "city": "Austin", "zip": "78701" },
          "certifications": ["NARR Level II"]
        },
        {
          "name": "Hope House - Austin",
          "address": { "street": "100 Main St", "city": "Austin", "state": "TX" },
          "phone": "512-555-0100"
        },
        { "name": "   ", "phone": "512-555-0199" },
        {
          "name": "Serenity Place",
          "address": { "street": "9 Oak Ave", "city": "Dallas", "state": "TX" },
          "services": "peer support; job training"
        }
      ]
    }
  })
}

// ─── Scenarios ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn near_duplicate_names_merge_into_one_organization() {
  let e = engine().await;
  let report = e
    .ingest_document(&source(&e, "narr_master"), narr_document())
    .await
    .unwrap();

  let stats = report.run.stats;
  assert_eq!(report.run.status, RunStatus::Completed);
  assert_eq!(stats.records_extracted, 4);
  assert_eq!(stats.records_rejected, 1);
  assert_eq!(stats.duplicates_merged, 1);
  assert_eq!(stats.records_added, 2);

  let orgs = organizations(&e).await;
  assert_eq!(orgs.len(), 2);
  let hope: Vec<_> = orgs.iter().filter(|o| o.name.starts_with("Hope House")).collect();
  assert_eq!(hope.len(), 1);
  let hope = hope[0];
  assert_eq!(hope.phone.as_deref(), Some("512-555-0100"));
  assert_eq!(hope.address.state.as_deref(), Some("TX"));
  assert_eq!(hope.organization_type, "narr_certified");
  assert!(hope.is_narr_certified);
  assert_eq!(hope.certification_type_id.as_deref(), Some("narr_level_2"));

  assert!(orgs.iter().all(|o| !o.name.trim().is_empty()));
}

#[tokio::test]
async fn flat_address_records_merge_and_reingest_cleanly() {
  let e = engine().await;
  let narr = source(&e, "narr_master");
  let doc = json!([
    { "name": "Hope House", "address": "12 Elm St", "state": "TX" },
    {
      "name": "Hope House - Austin",
      "address": "12 Elm St",
      "state": "TX",
      "phone": "555-1111"
    }
  ]);

  let first = e.ingest_document(&narr, doc.clone()).await.unwrap();
  assert_eq!(first.run.status, RunStatus::Completed);
  assert_eq!(first.run.stats.duplicates_merged, 1);
  let orgs = organizations(&e).await;
  assert_eq!(orgs.len(), 1);
  assert_eq!(orgs[0].phone.as_deref(), Some("555-1111"));
  assert_eq!(orgs[0].address.state.as_deref(), Some("TX"));

  let second = e.ingest_document(&narr, doc).await.unwrap();
  assert_eq!(second.run.stats.records_added, 0);
  assert_eq!(second.run.stats.records_updated, 0);
  assert_eq!(second.run.stats.records_unchanged, 1);
  assert_eq!(e.store().summary().await.unwrap().lineage_rows, 1);
}

#[tokio::test]
async fn punctuation_only_name_does_not_absorb_its_state() {
  let records = vec![
    json!({ "name": "***", "state": "TX" }),
    json!({ "name": "Hope House", "state": "TX", "phone": "555-1111" }),
    json!({ "name": "Serenity Place", "state": "TX", "phone": "555-2222" }),
  ];
  let mut reversed = records.clone();
  reversed.reverse();

  let mut results = Vec::new();
  for doc in [records, reversed] {
    let e = engine().await;
    let report = e
      .ingest_document(&source(&e, "narr_master"), Value::Array(doc))
      .await
      .unwrap();
    assert_eq!(report.run.stats.duplicates_merged, 0);
    results.push(organizations(&e).await);
  }

  assert_eq!(results[0], results[1]);
  let orgs = &results[0];
  assert_eq!(orgs.len(), 3);
  let hope = orgs.iter().find(|o| o.name == "Hope House").unwrap();
  assert_eq!(hope.phone.as_deref(), Some("555-1111"));
  let serenity = orgs.iter().find(|o| o.name == "Serenity Place").unwrap();
  assert_eq!(serenity.phone.as_deref(), Some("555-2222"));
}

#[tokio::test]
async fn reingesting_the_same_document_changes_nothing() {
  let e = engine().await;
  let narr = source(&e, "narr_master");
  e.ingest_document(&narr, narr_document()).await.unwrap();
  let before = organizations(&e).await;
  let summary_before = e.store().summary().await.unwrap();

  let second = e.ingest_document(&narr, narr_document()).await.unwrap();
  assert_eq!(second.run.status, RunStatus::Completed);
  assert_eq!(second.run.stats.records_added, 0);
  assert_eq!(second.run.stats.records_updated, 0);
  assert_eq!(second.run.stats.records_unchanged, 2);
  assert_eq!(second.load.lineage_versions, 0);
  assert_eq!(second.load.type_changes, 0);

  assert_eq!(organizations(&e).await, before);
  let summary_after = e.store().summary().await.unwrap();
  assert_eq!(summary_after.lineage_rows, summary_before.lineage_rows);
  assert_eq!(summary_after.type_history_rows, summary_before.type_history_rows);
}

#[tokio::test]
async fn changed_source_data_adds_a_lineage_version() {
  let e = engine().await;
  let narr = source(&e, "narr_master");
  e.ingest_document(&narr, narr_document()).await.unwrap();

  let mut changed = narr_document();
  changed["organizations_by_state"]["Texas"][3]["website"] = json!("https://serenity.example");
  let report = e.ingest_document(&narr, changed).await.unwrap();
  assert_eq!(report.run.stats.records_updated, 1);
  assert_eq!(report.run.stats.records_unchanged, 1);

  let serenity = organizations(&e)
    .await
    .into_iter()
    .find(|o| o.name == "Serenity Place")
    .unwrap();
  assert_eq!(serenity.website.as_deref(), Some("https://serenity.example"));

  let lineage = e.store().lineage(serenity.id.clone()).await.unwrap();
  assert_eq!(lineage.len(), 2);
  assert_eq!(lineage.iter().filter(|l| l.is_current).count(), 1);
  assert_eq!(lineage[1].version_number, 2);
}

#[tokio::test]
async fn merge_result_does_not_depend_on_record_order() {
  let center = json!({
    "name": "Bridge Recovery Center",
    "address": { "city": "Atlanta", "state": "GA" },
    "phone": "404-555-0101"
  });
  let short = json!({
    "name": "Bridge Recovery",
    "address": { "street": "5 Peachtree St", "state": "GA" },
    "website": "https://bridge.example"
  });

  let mut results = Vec::new();
  for records in [vec![center.clone(), short.clone()], vec![short, center]] {
    let e = engine().await;
    e.ingest_document(
      &source(&e, "samhsa_locator"),
      json!({ "recovery_community_centers": records }),
    )
    .await
    .unwrap();
    results.push(organizations(&e).await);
  }

  assert_eq!(results[0].len(), 1);
  assert_eq!(results[0], results[1]);
  let merged = &results[0][0];
  assert_eq!(merged.phone.as_deref(), Some("404-555-0101"));
  assert_eq!(merged.website.as_deref(), Some("https://bridge.example"));
  assert_eq!(merged.organization_type, "rcc");
}

#[tokio::test]
async fn oxford_houses_and_narr_tie_break() {
  let e = engine().await;
  let houses = json!({
    "houses": [
      { "name": "Oxford House Elm", "address": { "city": "Seattle", "state": "WA" } },
      {
        "name": "Oxford House Maple",
        "address": { "city": "Tacoma", "state": "WA" },
        "certifications": ["NARR Certified"]
      }
    ]
  });
  e.ingest_document(&source(&e, "oxford_vacancies"), houses)
    .await
    .unwrap();

  let orgs = organizations(&e).await;
  let elm = orgs.iter().find(|o| o.name == "Oxford House Elm").unwrap();
  assert_eq!(elm.organization_type, "oxford_house");
  assert_eq!(elm.certification_authority_id.as_deref(), Some("oxford_house_inc"));
  assert_eq!(elm.operator.as_deref(), Some("Oxford House Inc."));
  let history = e.store().type_history(elm.id.clone()).await.unwrap();
  assert_eq!(history.len(), 1);
  assert_eq!(history[0].confidence_score, 0.8);
  assert_eq!(history[0].classification_source.as_deref(), Some("oxford_vacancies"));

  let maple = orgs.iter().find(|o| o.name == "Oxford House Maple").unwrap();
  assert_eq!(maple.organization_type, "narr_certified");
  assert!(maple.is_narr_certified);
}

#[tokio::test]
async fn treatment_centers_follow_level_of_care() {
  let e = engine().await;
  let doc = json!({
    "facilities": [
      { "id": 7, "name": "Lakeside Detox", "level_of_care": "Inpatient", "state": "OH" },
      { "id": 8, "name": "Riverbend Clinic", "state": "OH" }
    ]
  });
  e.ingest_document(&source(&e, "samhsa_csv"), doc).await.unwrap();

  let detox = e
    .store()
    .get_organization("samhsa_csv:7".into())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(detox.organization_type, "inpatient");
  let clinic = e
    .store()
    .get_organization("samhsa_csv:8".into())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(clinic.organization_type, "outpatient");
}

// ─── Failures ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn unknown_shape_fails_the_run() {
  let e = engine().await;
  let report = e
    .ingest_document(&source(&e, "mash_api"), json!({ "unexpected": [1, 2] }))
    .await
    .unwrap();
  assert_eq!(report.run.status, RunStatus::Failed);
  assert!(report.failure.is_some());
  assert!(organizations(&e).await.is_empty());
}

#[tokio::test]
async fn invalid_json_file_fails_the_run() {
  let e = engine().await;
  let dir = temp_dir();
  let path = dir.join("broken.json");
  std::fs::write(&path, "{ not json").unwrap();

  let report = e.ingest_file(&source(&e, "garr_directory"), &path).await.unwrap();
  assert_eq!(report.run.status, RunStatus::Failed);

  let missing = e
    .ingest_file(&source(&e, "garr_directory"), &dir.join("absent.json"))
    .await
    .unwrap();
  assert_eq!(missing.run.status, RunStatus::Failed);

  std::fs::remove_dir_all(dir).unwrap();
}

#[tokio::test]
async fn cancelled_run_is_partial() {
  let cancel = CancelFlag::new();
  let e = engine().await.with_cancel_flag(cancel.clone());
  cancel.cancel();

  let report = e
    .ingest_document(&source(&e, "narr_master"), narr_document())
    .await
    .unwrap();
  assert!(report.cancelled);
  assert_eq!(report.run.status, RunStatus::Partial);
  assert!(organizations(&e).await.is_empty());
}

// ─── Migration ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn migrate_runs_every_source_and_summarises() {
  let e = engine().await;
  let dir = temp_dir();
  let narr = dir.join("narr.json");
  let county = dir.join("county.json");
  std::fs::write(&narr, narr_document().to_string()).unwrap();
  std::fs::write(
    &county,
    json!([{ "name": "Second Chance RCO", "state": "Ohio", "email": "hi@second.example" }])
      .to_string(),
  )
  .unwrap();

  let specs = vec![
    SourceSpec {
      source_id:   "narr_master".into(),
      path:        narr,
      category:    None,
      source_name: None,
      source_url:  None,
    },
    SourceSpec {
      source_id:   "county_list".into(),
      path:        county,
      category:    Some(SourceCategory::Rcos),
      source_name: Some("County RCO list".into()),
      source_url:  None,
    },
  ];

  let report = e.migrate(&specs).await.unwrap();
  assert_eq!(report.runs.len(), 2);
  assert!(report.runs.iter().all(|r| r.run.status == RunStatus::Completed));
  assert_eq!(report.summary.total_organizations, 3);
  assert_eq!(report.summary.counts_by_type.get("rco"), Some(&1));
  assert_eq!(report.summary.state_coverage, 2);

  let registered = e.store().get_source("county_list".into()).await.unwrap().unwrap();
  assert_eq!(registered.category, SourceCategory::Rcos);

  std::fs::remove_dir_all(dir).unwrap();
}

#[tokio::test]
async fn unknown_source_fails_before_any_run() {
  let e = engine().await;
  let specs = vec![SourceSpec {
    source_id:   "mystery".into(),
    path:        PathBuf::from("mystery.json"),
    category:    None,
    source_name: None,
    source_url:  None,
  }];
  let result = e.migrate(&specs).await;
  assert!(matches!(result, Err(Error::UnknownSource(id)) if id == "mystery"));
}

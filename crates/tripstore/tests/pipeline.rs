// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! End-to-end ingest, merge and query over real Parquet and DuckDB files.

mod common;

use common::TestPond;
use tripstore::merge::read_watermark;
use tripstore::query::execute;
use tripstore::store::{count_trips, open_read_only, open_read_write};
use tripstore::{
    CancelFlag, Error, FilterSpec, IngestOptions, LoadOutcome, LoadStatus, MergeConsolidator,
    PartitionRegistry, QueryTarget, ingest,
};

async fn ingest_all(pond: &TestPond, force: bool) -> anyhow::Result<tripstore::IngestReport> {
    let options = IngestOptions {
        force,
        jobs: 2,
        ..IngestOptions::default()
    };
    Ok(ingest(pond.layout.clone(), pond.registry.clone(), options).await?)
}

fn merge(pond: &TestPond) -> anyhow::Result<tripstore::MergeReport> {
    Ok(MergeConsolidator::new(pond.layout.clone(), pond.registry.clone()).merge(&CancelFlag::new())?)
}

fn unified_count(pond: &TestPond) -> anyhow::Result<u64> {
    let conn = open_read_only(&pond.layout.unified_store())?;
    Ok(count_trips(&conn, "main")?)
}

#[tokio::test]
async fn test_two_partitions_merge_to_union() -> anyhow::Result<()> {
    let pond = TestPond::new()?;
    pond.write_yellow("yellow_tripdata_2025-06", 100)?;
    pond.write_green("green_tripdata_2025-06", 50)?;

    let report = ingest_all(&pond, false).await?;
    assert!(!report.has_failures());
    assert_eq!(report.loaded_rows(), 150);

    let merged = merge(&pond)?;
    assert_eq!(merged.merged.len(), 2);
    assert_eq!(unified_count(&pond)?, 150);

    // A second pass is a no-op.
    let again = merge(&pond)?;
    assert!(again.merged.is_empty());
    assert_eq!(again.skipped.len(), 2);
    assert_eq!(unified_count(&pond)?, 150);

    let watermark = read_watermark(&pond.layout)?;
    assert_eq!(watermark.len(), 2);
    assert_eq!(watermark[0].partition, "green_tripdata_2025-06");
    assert_eq!(watermark[0].row_count, 50);
    Ok(())
}

#[tokio::test]
async fn test_loading_twice_keeps_row_count() -> anyhow::Result<()> {
    let pond = TestPond::new()?;
    pond.write_yellow("yellow_tripdata_2025-06", 100)?;

    let first = ingest_all(&pond, false).await?;
    assert_eq!(first.partitions[0].outcome.as_ref().ok(), Some(&LoadOutcome::Loaded { rows: 100 }));

    let second = ingest_all(&pond, false).await?;
    assert_eq!(second.partitions[0].outcome.as_ref().ok(), Some(&LoadOutcome::Skipped { rows: 100 }));

    let forced = ingest_all(&pond, true).await?;
    assert_eq!(forced.partitions[0].outcome.as_ref().ok(), Some(&LoadOutcome::Loaded { rows: 100 }));

    let store = pond.layout.partition_store("yellow_tripdata_2025-06");
    assert_eq!(count_trips(&open_read_only(&store)?, "main")?, 100);
    assert!(!pond.layout.partition_scratch("yellow_tripdata_2025-06").exists());
    Ok(())
}

#[tokio::test]
async fn test_changed_source_is_remerged() -> anyhow::Result<()> {
    let pond = TestPond::new()?;
    pond.write_yellow("yellow_tripdata_2025-06", 100)?;
    ingest_all(&pond, false).await?;
    merge(&pond)?;

    pond.write_yellow("yellow_tripdata_2025-06", 40)?;
    ingest_all(&pond, false).await?;
    let report = merge(&pond)?;
    assert_eq!(report.merged, vec![("yellow_tripdata_2025-06".to_string(), 40)]);
    assert_eq!(unified_count(&pond)?, 40);
    Ok(())
}

#[tokio::test]
async fn test_grouped_wildcard_query_sums_to_total() -> anyhow::Result<()> {
    let pond = TestPond::new()?;
    pond.write_yellow("yellow_tripdata_2025-06", 100)?;
    pond.write_green("green_tripdata_2025-06", 50)?;
    ingest_all(&pond, false).await?;
    merge(&pond)?;

    let spec = FilterSpec::parse(&["*", "*", "*", "*", "true", "*", "*"])?;
    let rows = execute(&pond.layout, &pond.registry, &spec, &QueryTarget::Unified)?;
    let payment_types: Vec<Option<i32>> = rows.iter().map(|r| r.payment_type).collect();
    assert_eq!(payment_types, vec![Some(1), Some(2), Some(3)]);
    assert_eq!(rows.iter().map(|r| r.trip_count).sum::<i64>(), 150);

    let green = FilterSpec::parse(&["*", "*", "*", "*", "false", "2", "green"])?;
    let rows = execute(&pond.layout, &pond.registry, &green, &QueryTarget::Unified)?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].trip_count, 50);
    assert_eq!(rows[0].total_toll_fare, Some(75.0));

    let partition = QueryTarget::Partition("yellow_tripdata_2025-06".into());
    let rows = execute(&pond.layout, &pond.registry, &spec, &partition)?;
    assert_eq!(rows.iter().map(|r| r.trip_count).sum::<i64>(), 100);
    Ok(())
}

#[tokio::test]
async fn test_non_matching_and_inverted_queries_are_empty() -> anyhow::Result<()> {
    let pond = TestPond::new()?;
    pond.write_yellow("yellow_tripdata_2025-06", 100)?;
    ingest_all(&pond, false).await?;
    merge(&pond)?;

    let spec = FilterSpec::parse(&[
        "2025-06-01 00:00:00",
        "2025-06-30 23:59:59",
        "1",
        "2",
        "true",
        "1",
        "yellow",
    ])?;
    let rows = execute(&pond.layout, &pond.registry, &spec, &QueryTarget::Unified)?;
    assert!(rows.is_empty());

    let inverted = FilterSpec::parse(&[
        "2025-06-30 00:00:00",
        "2025-06-01 00:00:00",
        "*",
        "*",
        "false",
        "*",
        "*",
    ])?;
    let rows = execute(&pond.layout, &pond.registry, &inverted, &QueryTarget::Unified)?;
    assert!(rows.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_schema_mismatch_isolated_to_partition() -> anyhow::Result<()> {
    let pond = TestPond::new()?;
    pond.write_yellow("yellow_tripdata_2025-06", 100)?;
    pond.write_without("yellow_tripdata_2025-07", 10, "PULocationID")?;

    let report = ingest_all(&pond, false).await?;
    assert!(report.has_failures());

    let bad = report
        .partitions
        .iter()
        .find(|p| p.partition == "yellow_tripdata_2025-07")
        .expect("reported");
    match &bad.outcome {
        Err(Error::SchemaMismatch { missing, .. }) => assert_eq!(missing, &vec!["PULocationID".to_string()]),
        other => panic!("expected SchemaMismatch, got {other:?}"),
    }
    assert_eq!(pond.registry.status("yellow_tripdata_2025-07")?, Some(LoadStatus::Failed));
    assert_eq!(pond.registry.status("yellow_tripdata_2025-06")?, Some(LoadStatus::Loaded));
    assert!(!pond.layout.partition_store("yellow_tripdata_2025-07").exists());

    merge(&pond)?;
    assert_eq!(unified_count(&pond)?, 100);
    Ok(())
}

#[tokio::test]
async fn test_missing_partition_store_is_unavailable() -> anyhow::Result<()> {
    let pond = TestPond::new()?;
    pond.write_yellow("yellow_tripdata_2025-06", 100)?;
    pond.write_green("green_tripdata_2025-06", 50)?;
    ingest_all(&pond, false).await?;

    std::fs::remove_file(pond.layout.partition_store("green_tripdata_2025-06"))?;

    let report = merge(&pond)?;
    assert!(report.has_failures());
    assert_eq!(report.merged, vec![("yellow_tripdata_2025-06".to_string(), 100)]);
    assert!(matches!(
        report.unavailable.as_slice(),
        [Error::PartitionUnavailable { partition, .. }] if partition == "green_tripdata_2025-06"
    ));
    assert_eq!(unified_count(&pond)?, 100);
    Ok(())
}

#[tokio::test]
async fn test_failed_reload_keeps_loaded_partition() -> anyhow::Result<()> {
    let pond = TestPond::new()?;
    pond.write_yellow("yellow_tripdata_2025-06", 100)?;
    pond.write_green("green_tripdata_2025-06", 50)?;
    ingest_all(&pond, false).await?;
    merge(&pond)?;
    assert_eq!(unified_count(&pond)?, 150);

    // A broken replacement source fails the reload but the previous load stands.
    std::fs::write(pond.source_path("green_tripdata_2025-06"), b"truncated")?;
    let report = ingest_all(&pond, false).await?;
    assert!(report.has_failures());
    assert_eq!(pond.registry.status("green_tripdata_2025-06")?, Some(LoadStatus::Loaded));
    let green = pond.registry.get("green_tripdata_2025-06")?;
    assert_eq!(green.and_then(|e| e.row_count), Some(50));
    assert!(pond.layout.partition_store("green_tripdata_2025-06").is_file());
    assert!(!pond.layout.partition_scratch("green_tripdata_2025-06").exists());

    let merged = merge(&pond)?;
    assert!(merged.pruned.is_empty());
    assert!(merged.merged.is_empty());
    assert_eq!(unified_count(&pond)?, 150);

    // A vanished source leaves its loaded store in place.
    std::fs::remove_file(pond.source_path("yellow_tripdata_2025-06"))?;
    let report = ingest_all(&pond, false).await?;
    let yellow = report
        .partitions
        .iter()
        .find(|p| p.partition == "yellow_tripdata_2025-06")
        .ok_or_else(|| anyhow::anyhow!("yellow partition missing from report"))?;
    assert_eq!(yellow.outcome.as_ref().ok(), Some(&LoadOutcome::Skipped { rows: 100 }));
    assert_eq!(pond.registry.status("yellow_tripdata_2025-06")?, Some(LoadStatus::Loaded));
    Ok(())
}

#[tokio::test]
async fn test_partition_removed_from_registry_is_pruned() -> anyhow::Result<()> {
    let pond = TestPond::new()?;
    pond.write_yellow("yellow_tripdata_2025-06", 100)?;
    pond.write_green("green_tripdata_2025-06", 50)?;
    ingest_all(&pond, false).await?;
    merge(&pond)?;
    assert_eq!(unified_count(&pond)?, 150);

    // Drop green from the persisted registry and reopen it.
    let path = pond.layout.registry_path();
    let mut file: serde_json::Value = serde_json::from_slice(&std::fs::read(&path)?)?;
    file["partitions"]
        .as_object_mut()
        .ok_or_else(|| anyhow::anyhow!("registry has no partitions map"))?
        .remove("green_tripdata_2025-06");
    std::fs::write(&path, serde_json::to_vec_pretty(&file)?)?;
    let registry = PartitionRegistry::open(&path)?;

    let merged = MergeConsolidator::new(pond.layout.clone(), registry).merge(&CancelFlag::new())?;
    assert_eq!(merged.pruned, vec!["green_tripdata_2025-06".to_string()]);
    assert_eq!(merged.skipped, vec!["yellow_tripdata_2025-06".to_string()]);
    assert_eq!(unified_count(&pond)?, 100);
    assert_eq!(read_watermark(&pond.layout)?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_merge_resumes_from_partial_watermark() -> anyhow::Result<()> {
    let pond = TestPond::new()?;
    pond.write_yellow("yellow_tripdata_2025-06", 100)?;
    pond.write_green("green_tripdata_2025-06", 50)?;
    ingest_all(&pond, false).await?;
    merge(&pond)?;

    // Leave the unified store as a pass interrupted before yellow would be.
    {
        let conn = open_read_write(&pond.layout.unified_store())?;
        conn.execute("DELETE FROM trips WHERE partition_id = ?", ["yellow_tripdata_2025-06"])?;
        conn.execute(
            "DELETE FROM merge_watermark WHERE partition_id = ?",
            ["yellow_tripdata_2025-06"],
        )?;
    }
    assert_eq!(unified_count(&pond)?, 50);

    let resumed = merge(&pond)?;
    assert_eq!(resumed.merged, vec![("yellow_tripdata_2025-06".to_string(), 100)]);
    assert_eq!(resumed.skipped, vec!["green_tripdata_2025-06".to_string()]);
    assert!(resumed.pruned.is_empty());
    assert_eq!(unified_count(&pond)?, 150);
    assert_eq!(read_watermark(&pond.layout)?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_cancelled_merge_then_rerun_reaches_union() -> anyhow::Result<()> {
    let pond = TestPond::new()?;
    pond.write_yellow("yellow_tripdata_2025-06", 100)?;
    pond.write_green("green_tripdata_2025-06", 50)?;
    ingest_all(&pond, false).await?;

    let cancel = CancelFlag::new();
    cancel.cancel();
    let consolidator = MergeConsolidator::new(pond.layout.clone(), pond.registry.clone());
    let cancelled = consolidator.merge(&cancel)?;
    assert!(cancelled.merged.is_empty());
    assert_eq!(cancelled.not_started.len(), 2);
    assert!(read_watermark(&pond.layout)?.is_empty());
    assert_eq!(unified_count(&pond)?, 0);

    let rerun = merge(&pond)?;
    assert_eq!(rerun.merged.len(), 2);
    assert!(rerun.not_started.is_empty());
    assert_eq!(unified_count(&pond)?, 150);
    Ok(())
}

#[tokio::test]
async fn test_cancelled_ingest_starts_nothing() -> anyhow::Result<()> {
    let pond = TestPond::new()?;
    pond.write_yellow("yellow_tripdata_2025-06", 10)?;

    let cancel = CancelFlag::new();
    cancel.cancel();
    let options = IngestOptions {
        cancel,
        ..IngestOptions::default()
    };
    let report = ingest(pond.layout.clone(), pond.registry.clone(), options).await?;
    assert!(report.partitions.is_empty());
    assert_eq!(report.not_started, vec!["yellow_tripdata_2025-06".to_string()]);
    assert_eq!(pond.registry.status("yellow_tripdata_2025-06")?, Some(LoadStatus::Pending));
    Ok(())
}

#[tokio::test]
async fn test_unknown_requested_partition_fails() -> anyhow::Result<()> {
    let pond = TestPond::new()?;
    let options = IngestOptions {
        partitions: vec!["nope".to_string()],
        ..IngestOptions::default()
    };
    let report = ingest(pond.layout.clone(), pond.registry.clone(), options).await?;
    assert!(matches!(
        report.partitions[0].outcome,
        Err(Error::UnknownPartition(_))
    ));
    Ok(())
}

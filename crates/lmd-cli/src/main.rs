use std::{collections::BTreeSet, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use lmd_core::{DetectorLayout, ModuleLayout, OverlapId, SensorId};
use lmd_pipeline::{
    comparator::{compare_alignment, compare_overlaps, expected_overlap_matrices, Comparison},
    io::{
        load_json_file, read_anchor_matrices, read_ideal_matrices, read_overlap_definitions,
        read_sensor_matrices, write_overlap_matrices, write_sensor_matrices, JsonPairStore,
    },
    run_alignment, AlignmentConfig, IdealGeometry, RunSummary,
};
use log::info;
use serde::Serialize;

/// Sensor alignment from overlap-region hit pairs.
#[derive(Debug, Parser)]
#[command(author, version, about = "Luminosity detector sensor alignment")]
struct Args {
    /// JSON file of ideal matrices keyed by geometry path.
    #[arg(long)]
    ideal: PathBuf,

    /// JSON file of overlap definitions. Defaults to the reference overlap
    /// layout of every module found in the ideal matrices.
    #[arg(long)]
    overlaps: Option<PathBuf>,

    /// Directory with one `pairs-<id>.json` file per overlap.
    #[arg(long)]
    pairs: PathBuf,

    /// JSON file of externally measured anchor matrices.
    #[arg(long)]
    anchors: PathBuf,

    /// Optional JSON AlignmentConfig. Defaults are used if omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Where to write the per-sensor misalignment matrices.
    #[arg(long)]
    alignment_out: Option<PathBuf>,

    /// Where to write the fitted overlap matrices.
    #[arg(long)]
    overlaps_out: Option<PathBuf>,

    /// Known misalignments (simulated data) to compare the results against.
    #[arg(long)]
    reference_misalignments: Option<PathBuf>,

    /// Fit overlaps sequentially and log at debug level unless RUST_LOG
    /// says otherwise.
    #[arg(long)]
    debug: bool,
}

#[derive(Debug, Serialize)]
struct ComparisonReport {
    overlaps: Comparison<OverlapId>,
    alignment: Comparison<SensorId>,
}

#[derive(Debug, Serialize)]
struct CliReport {
    summary: RunSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    comparison: Option<ComparisonReport>,
}

fn reference_layout(ideal: &IdealGeometry) -> Result<DetectorLayout> {
    let modules: BTreeSet<_> = ideal.iter().map(|(sensor, _)| sensor.module()).collect();
    let overlaps = modules
        .into_iter()
        .flat_map(|module| ModuleLayout::reference(module).overlaps);
    Ok(DetectorLayout::from_overlaps(overlaps)?)
}

fn run_alignment_from_files(args: &Args) -> Result<String> {
    let ideal = read_ideal_matrices(&args.ideal)?;
    let layout = match &args.overlaps {
        Some(path) => read_overlap_definitions(path)?,
        None => reference_layout(&ideal)?,
    };
    let anchors = read_anchor_matrices(&args.anchors)?;
    let mut config = match &args.config {
        Some(path) => load_json_file::<AlignmentConfig>(path)?,
        None => AlignmentConfig::default(),
    };
    if args.debug {
        config.pool.sequential = true;
    }
    info!(
        "{} modules, {} overlaps, {} ideal matrices, {} anchors",
        layout.modules().count(),
        layout.overlap_ids().len(),
        ideal.len(),
        anchors.len()
    );

    let store = JsonPairStore::new(&args.pairs);
    let report = run_alignment(&layout, &ideal, &store, &anchors, &config)?;
    let found_overlaps = report.overlaps.transforms();
    let found_alignment = report.alignment_matrices();

    if let Some(path) = &args.overlaps_out {
        write_overlap_matrices(path, &found_overlaps)?;
        info!("wrote {} overlap matrices to {}", found_overlaps.len(), path.display());
    }
    if let Some(path) = &args.alignment_out {
        write_sensor_matrices(path, &found_alignment)?;
        info!("wrote {} alignment matrices to {}", found_alignment.len(), path.display());
    }

    let comparison = match &args.reference_misalignments {
        Some(path) => {
            let injected = read_sensor_matrices(path)?;
            let expected = expected_overlap_matrices(&layout, &ideal, &injected);
            Some(ComparisonReport {
                overlaps: compare_overlaps(&found_overlaps, &expected),
                alignment: compare_alignment(&found_alignment, &injected),
            })
        }
        None => None,
    };

    let out = CliReport {
        summary: report.summary(),
        comparison,
    };
    serde_json::to_string_pretty(&out).context("serializing report")
}

fn main() {
    if let Err(err) = try_main() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let args = Args::parse();
    let level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let json = run_alignment_from_files(&args)?;
    println!("{}", json);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lmd_core::{
        synthetic::{
            geometry::{MisalignmentRange, SyntheticModule},
            hits::HitOptions,
        },
        ModuleId,
    };
    use lmd_pipeline::io::write_overlap_definitions;
    use std::collections::BTreeMap;
    use std::path::Path;
    use tempfile::tempdir;

    fn write_dataset(dir: &Path, module: &SyntheticModule) {
        write_sensor_matrices(&dir.join("ideal.json"), &module.ideal).unwrap();
        write_sensor_matrices(&dir.join("injected.json"), &module.misalignments).unwrap();

        let anchor = module.layout.module.sensor(0);
        let anchors = BTreeMap::from([(anchor, module.misalignment(anchor))]);
        write_sensor_matrices(&dir.join("anchors.json"), &anchors).unwrap();

        let store = JsonPairStore::new(dir.join("pairs"));
        for (id, pairs) in module.all_hit_pairs(&HitOptions::default()) {
            store.write(id, &pairs).unwrap();
        }
    }

    fn args_for(dir: &Path) -> Args {
        Args {
            ideal: dir.join("ideal.json"),
            overlaps: None,
            pairs: dir.join("pairs"),
            anchors: dir.join("anchors.json"),
            config: None,
            alignment_out: Some(dir.join("alignment.json")),
            overlaps_out: Some(dir.join("found-overlaps.json")),
            reference_misalignments: Some(dir.join("injected.json")),
            debug: false,
        }
    }

    #[test]
    fn helper_smoke_test() {
        let dir = tempdir().unwrap();
        let module =
            SyntheticModule::reference(ModuleId::new(0, 1, 2), &MisalignmentRange::default(), 9);
        write_dataset(dir.path(), &module);

        let json =
            run_alignment_from_files(&args_for(dir.path())).expect("cli helper should succeed");
        let report: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(report["summary"]["sensors_aligned"], 9);
        assert_eq!(report["summary"]["overlaps_fitted"], 9);
        assert_eq!(report["comparison"]["alignment"]["summary"]["count"], 9);

        let std_dx = report["comparison"]["alignment"]["summary"]["std_dx_um"]
            .as_f64()
            .unwrap();
        assert!(std_dx < 1e-3, "std dx too high: {std_dx}");

        let written = read_sensor_matrices(&dir.path().join("alignment.json")).unwrap();
        assert_eq!(written.len(), 9);
        assert!(dir.path().join("found-overlaps.json").exists());
    }

    #[test]
    fn explicit_overlap_file_and_config() {
        let dir = tempdir().unwrap();
        let module = SyntheticModule::aligned(ModuleId::new(1, 0, 3));
        write_dataset(dir.path(), &module);

        let layout = DetectorLayout::from_overlaps(module.layout.overlaps.iter().copied()).unwrap();
        write_overlap_definitions(&dir.path().join("overlaps.json"), &layout).unwrap();
        std::fs::write(
            dir.path().join("config.json"),
            r#"{ "pool": { "sequential": true }, "failure_policy": "abort" }"#,
        )
        .unwrap();

        let mut args = args_for(dir.path());
        args.overlaps = Some(dir.path().join("overlaps.json"));
        args.config = Some(dir.path().join("config.json"));
        args.reference_misalignments = None;

        let json = run_alignment_from_files(&args).unwrap();
        let report: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(report["summary"]["modules_aligned"], 1);
        assert!(report.get("comparison").is_none());
    }

    #[test]
    fn missing_pairs_directory_fails_under_abort() {
        let dir = tempdir().unwrap();
        let module = SyntheticModule::aligned(ModuleId::new(0, 0, 0));
        write_dataset(dir.path(), &module);
        std::fs::write(dir.path().join("config.json"), r#"{ "failure_policy": "abort" }"#).unwrap();

        let mut args = args_for(dir.path());
        args.pairs = dir.path().join("nowhere");
        args.config = Some(dir.path().join("config.json"));

        let err = run_alignment_from_files(&args).unwrap_err();
        assert!(format!("{err:#}").contains("overlaps failed"), "{err:#}");
    }
}

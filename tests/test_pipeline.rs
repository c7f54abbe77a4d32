#![cfg(unix)]

mod common;

use approx::assert_abs_diff_eq;
use common::*;
use gqa::core::correlation::{read_run_record, GVERIFY_RESULTS, RUN_RECORD_FILE};
use gqa::core::report::{read_report, NO_ERRORS};
use gqa::io::OceanTileList;
use gqa::types::{CorrelationMode, PathRow};
use gqa::GqaPipeline;
use std::fs;
use std::path::PathBuf;

fn pipeline(workspace: &Workspace, repos: &[&str], executable: PathBuf, ocean: &[&str]) -> GqaPipeline {
    let config = workspace.config(repos, executable);
    GqaPipeline::new(
        config,
        ocean.iter().copied().collect::<OceanTileList>(),
        Box::new(scene_index()),
        Box::new(FakeRaster::default()),
    )
    .expect("Failed to build pipeline")
}

fn write_fixture(workspace: &Workspace) -> PathBuf {
    let path = workspace.path("fixture.res");
    fs::write(&path, results_fixture()).expect("Failed to write fixture");
    path
}

#[test]
fn test_land_granule_end_to_end() {
    init_logging();
    let workspace = Workspace::new();
    let reference = workspace.add_reference("primary", PathRow::new(90, 81), "LC80900812016150LGN00_B4.TIF");
    let fixture = write_fixture(&workspace);
    let gverify = workspace.fake_gverify(&format!(
        "echo \"$@\" > args.txt\ncp {} {}",
        fixture.display(),
        GVERIFY_RESULTS
    ));

    let pipeline = pipeline(&workspace, &["primary"], gverify, &["52KGA"]);
    let report = pipeline
        .process_granule(&granule(LAND_GRANULE))
        .expect("Processing failed");

    assert_eq!(report.error_message, NO_ERRORS);
    assert_eq!(report.correlation_mode, Some(CorrelationMode::Grid));
    assert_eq!(report.final_gcp_count, 3);
    assert_abs_diff_eq!(report.residual.mean.x, 0.0, epsilon = 1e-9);
    assert_abs_diff_eq!(report.residual.stddev.x, 0.72, epsilon = 1e-9);
    assert_abs_diff_eq!(report.residual.iterative_stddev.x, 0.2, epsilon = 1e-9);
    assert_abs_diff_eq!(report.residual.abs.y, 0.4, epsilon = 1e-9);
    assert_eq!(report.colors.get("blue"), Some(&0.12));
    assert_eq!(report.ref_source_path, reference.display().to_string());
    assert_eq!(report.ref_source, workspace.path("primary").display().to_string());
    assert!(report.ref_date.starts_with("2016-05-29"));

    let workdir = fs::canonicalize(workspace.path("work").join(LAND_GRANULE).join("gverify")).unwrap();
    let args = fs::read_to_string(workdir.join("args.txt")).unwrap();
    assert!(args.contains(" -g 24"));
    assert!(!args.contains("FIXED_LOCATION"));

    let record = read_run_record(&workdir.join(RUN_RECORD_FILE)).unwrap();
    assert!(record.succeeded());
    assert_eq!(record.ref_resolution, vec![25.0, 25.0]);

    let written = read_report(&pipeline.report_path(LAND_GRANULE)).unwrap();
    assert_eq!(written.final_gcp_count, 3);
}

#[test]
fn test_ocean_granule_uses_fixed_locations() {
    init_logging();
    let workspace = Workspace::new();
    workspace.add_reference("primary", PathRow::new(90, 81), "LC80900812016150LGN00_B6.TIF");
    workspace.add_fixed_points(PathRow::new(90, 81), "146.5 -35.5\n");
    let fixture = write_fixture(&workspace);
    let gverify = workspace.fake_gverify(&format!(
        "echo \"$@\" > args.txt\ncp {} {}",
        fixture.display(),
        GVERIFY_RESULTS
    ));

    let pipeline = pipeline(&workspace, &["primary"], gverify, &["52KGA"]);
    let report = pipeline
        .process_granule(&granule(OCEAN_GRANULE))
        .expect("Processing failed");

    assert_eq!(report.correlation_mode, Some(CorrelationMode::FixedLocation));
    assert_eq!(report.error_message, NO_ERRORS);

    let workdir = fs::canonicalize(workspace.path("work").join(OCEAN_GRANULE).join("gverify")).unwrap();
    let args = fs::read_to_string(workdir.join("args.txt")).unwrap();
    assert!(args.contains("-t FIXED_LOCATION -t_file"));
    assert!(!args.contains(" -g "));

    let points = fs::read_to_string(workdir.join("points.txt")).unwrap();
    assert_eq!(points, "146.5 -35.5\n");
}

#[test]
fn test_timeout_produces_nan_report() {
    init_logging();
    let workspace = Workspace::new();
    workspace.add_reference("primary", PathRow::new(90, 81), "LC80900812016150LGN00_B4.TIF");
    let gverify = workspace.fake_gverify(&format!("echo partial > {}\nexec sleep 30", GVERIFY_RESULTS));

    let mut config = workspace.config(&["primary"], gverify);
    config.gverify.timeout = 1;
    let pipeline = GqaPipeline::new(
        config,
        OceanTileList::default(),
        Box::new(scene_index()),
        Box::new(FakeRaster::default()),
    )
    .unwrap();

    let report = pipeline.process_granule(&granule(LAND_GRANULE)).unwrap();

    assert!(report.error_message.contains("timed out"), "{}", report.error_message);
    assert!(report.residual.is_nan());
    assert_eq!(report.final_gcp_count, 0);
    assert!(report.colors.is_empty());

    let workdir = workspace.path("work").join(LAND_GRANULE).join("gverify");
    assert!(!workdir.join(GVERIFY_RESULTS).exists());
    let record = read_run_record(&workdir.join(RUN_RECORD_FILE)).unwrap();
    assert!(!record.succeeded());
}

#[test]
fn test_missing_reference_produces_nan_report() {
    init_logging();
    let workspace = Workspace::new();
    fs::create_dir_all(workspace.path("primary")).unwrap();
    let gverify = workspace.fake_gverify("exit 0");

    let pipeline = pipeline(&workspace, &["primary"], gverify, &[]);
    let report = pipeline.process_granule(&granule(LAND_GRANULE)).unwrap();

    assert!(report.error_message.contains("no reference found"), "{}", report.error_message);
    assert!(report.residual.is_nan());
    assert!(pipeline.report_path(LAND_GRANULE).exists());
}

#[test]
fn test_no_points_produces_nan_report() {
    init_logging();
    let workspace = Workspace::new();
    workspace.add_reference("primary", PathRow::new(90, 81), "LC80900812016150LGN00_B4.TIF");
    // Exits cleanly without writing results
    let gverify = workspace.fake_gverify("exit 0");

    let pipeline = pipeline(&workspace, &["primary"], gverify, &[]);
    let report = pipeline.process_granule(&granule(LAND_GRANULE)).unwrap();

    assert!(report.error_message.contains("no ground control points"), "{}", report.error_message);
    assert!(report.residual.is_nan());
    assert!(!report.ref_source_path.is_empty());
}

#[test]
fn test_batch_processes_every_granule() {
    init_logging();
    let workspace = Workspace::new();
    workspace.add_reference("primary", PathRow::new(90, 81), "LC80900812016150LGN00_B4.TIF");
    let fixture = write_fixture(&workspace);
    let gverify = workspace.fake_gverify(&format!("cp {} {}", fixture.display(), GVERIFY_RESULTS));

    let pipeline = pipeline(&workspace, &["primary"], gverify, &[]);
    let granules = vec![granule(LAND_GRANULE), granule("S2A_OPER_MSI_L1C_TL_SGS__20160522T014532_A004620_T55HCU_N02.02")];
    let outcomes = pipeline.process_granules(&granules);

    assert_eq!(outcomes.len(), 2);
    for outcome in &outcomes {
        let report = outcome.report.as_ref().expect("Granule failed");
        assert_eq!(report.granule, outcome.granule);
        assert_eq!(report.final_gcp_count, 3);
        assert!(pipeline.report_path(&outcome.granule).exists());
    }
}

#[test]
fn test_cleanup_removes_work_directory() {
    init_logging();
    let workspace = Workspace::new();
    workspace.add_reference("primary", PathRow::new(90, 81), "LC80900812016150LGN00_B4.TIF");
    let fixture = write_fixture(&workspace);
    let gverify = workspace.fake_gverify(&format!("cp {} {}", fixture.display(), GVERIFY_RESULTS));

    let mut config = workspace.config(&["primary"], gverify);
    config.output.cleanup = true;
    let pipeline = GqaPipeline::new(
        config,
        OceanTileList::default(),
        Box::new(scene_index()),
        Box::new(FakeRaster::default()),
    )
    .unwrap();

    pipeline.process_granule(&granule(LAND_GRANULE)).unwrap();

    assert!(!workspace.path("work").join(LAND_GRANULE).join("gverify").exists());
    assert!(pipeline.report_path(LAND_GRANULE).exists());
}

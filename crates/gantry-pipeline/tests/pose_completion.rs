use std::fs;

use gantry_core::synthetic::sweep::{SweepSpec, strip_poses, sweep};
use gantry_core::{ImageRecord, Pt2, SequenceSet, Status, wrap_180};
use gantry_pipeline::io::{
    EXPORT_HEADER, load_calibration_table, load_records, load_visual_matches, save_export_csv,
    save_records,
};
use gantry_pipeline::pose_completion::{
    PoseCompletionInput, PoseCompletionProblem, run_pipeline, step_ingest,
};
use gantry_pipeline::session::CalibrationSession;
use gantry_pipeline::stages::ingest::CalibrationRow;
use gantry_pipeline::stages::visual::{ImageRef, MatchTarget, VisualMatch, VisualMatchTable};
use gantry_pipeline::stages::Stage;

const CENTER: (f64, f64) = (44.21328905, -29.13029399);

/// Three sweeps around one pivot, every `keep`-th image measured.
struct Site {
    truth: SequenceSet,
    records: SequenceSet,
    rows: Vec<CalibrationRow>,
}

fn site() -> Site {
    let specs = [
        ("Step01", 49.464486, 20.0, 37, 4100, 4),
        ("Step02", 47.513978, 100.0, 31, 5100, 5),
        ("Step03", 42.515425, 200.0, 21, 6100, 4),
    ];
    let mut truth = SequenceSet::new();
    let mut records = SequenceSet::new();
    let mut rows = Vec::new();
    for (id, radius, start_angle, num_images, first_image, keep) in specs {
        let seq = sweep(&SweepSpec {
            sequence_id: id.to_string(),
            center: Pt2::new(CENTER.0, CENTER.1),
            radius,
            start_angle,
            num_images,
            first_image,
            ..SweepSpec::default()
        });
        for r in seq.items.iter().step_by(keep) {
            let (Some(p), Some(o)) = (r.position, r.orientation) else {
                panic!("synthetic record without pose");
            };
            rows.push(CalibrationRow::from_pose(
                r.filename.clone(),
                p,
                [o.omega, o.phi, o.kappa],
            ));
        }
        records.insert(strip_poses(&seq));
        truth.insert(seq);
    }
    Site {
        truth,
        records,
        rows,
    }
}

fn truth_of<'a>(truth: &'a SequenceSet, record: &ImageRecord) -> &'a ImageRecord {
    truth
        .get(&record.sequence_id)
        .and_then(|s| s.items.iter().find(|t| t.id == record.id))
        .unwrap_or_else(|| panic!("no truth for image {}", record.id))
}

fn assert_pose_close(truth: &ImageRecord, record: &ImageRecord, tol: f64) {
    let p = record.position.expect("position");
    let q = truth.position.expect("truth position");
    let err = (p - q).norm();
    assert!(err < tol, "image {}: position error {err:.3e}", record.id);

    let o = record.orientation.expect("orientation");
    let t = truth.orientation.expect("truth orientation");
    for (name, a, b) in [
        ("omega", o.omega, t.omega),
        ("phi", o.phi, t.phi),
        ("kappa", o.kappa, t.kappa),
    ] {
        let d = wrap_180(a - b).abs();
        assert!(d < tol, "image {}: {name} off by {d:.3e}", record.id);
    }
}

/// Landmark pinning image 5112 (unmeasured) of Step02 at its true angle.
fn landmark(truth: &SequenceSet) -> VisualMatchTable {
    let Some(angle) = truth
        .get("Step02")
        .and_then(|s| s.items.iter().find(|r| r.id == 5112))
        .and_then(|r| r.angular_position)
    else {
        panic!("image 5112 missing from truth");
    };
    VisualMatchTable {
        matches: vec![VisualMatch {
            landmark: Some("mast".into()),
            angle,
            target: MatchTarget::PerSequence(
                [("Step02".to_string(), ImageRef::Number(5112))].into(),
            ),
        }],
    }
}

type Session = CalibrationSession<PoseCompletionProblem>;

#[test]
fn completes_stripped_sweeps() {
    let site = site();
    let input =
        PoseCompletionInput::new(site.records, site.rows).with_visual(landmark(&site.truth));
    let mut session = Session::with_input(input).unwrap();
    run_pipeline(&mut session).unwrap();

    assert!(
        session.state.diagnostics.is_empty(),
        "unexpected diagnostics: {:?}",
        session.state.diagnostics
    );
    assert_eq!(session.state.completed, Stage::ALL.to_vec());

    let circles = session.state.circles.as_ref().unwrap();
    assert_eq!(circles.len(), 3);
    for c in circles {
        let d = (c.center - Pt2::new(CENTER.0, CENTER.1)).norm();
        assert!(d < 1e-6, "{}: center off by {d:.3e}", c.sequence);
    }

    let output = session.require_output().unwrap();
    let total = output.summary.total;
    assert_eq!(total.get(Status::Original), 10 + 7 + 6);
    assert_eq!(total.get(Status::VisuallyCalibrated), 1);
    assert_eq!(total.get(Status::Uncalibrated), 0);
    assert_eq!(total.total(), 37 + 31 + 21);

    for record in output.sequences.records() {
        assert_pose_close(truth_of(&site.truth, record), record, 1e-5);
    }

    let export = session.export().unwrap();
    assert_eq!(export.rows.len(), total.get(Status::Estimated) + 1);
    assert!(export.rows.iter().all(|r| r.status != Status::Original));
}

#[test]
fn without_calibration_everything_stays_uncalibrated() {
    let site = site();
    let mut session =
        Session::with_input(PoseCompletionInput::new(site.records, Vec::new())).unwrap();
    run_pipeline(&mut session).unwrap();

    let output = session.require_output().unwrap();
    let total = output.summary.total;
    assert_eq!(total.get(Status::Uncalibrated), total.total());
    assert!(output.sequences.records().all(|r| r.position.is_none()));
    assert!(session.export().unwrap().rows.is_empty());

    // one dataset-wide circle failure, then every sequence is skipped
    assert_eq!(session.state.diagnostics_for(Stage::FitCircles).count(), 1);
    for stage in [Stage::Interpolate, Stage::Orientation] {
        assert_eq!(session.state.diagnostics_for(stage).count(), 3, "{stage}");
    }
}

#[test]
fn statuses_never_drop_and_reruns_are_stable() {
    let site = site();
    let input =
        PoseCompletionInput::new(site.records, site.rows).with_visual(landmark(&site.truth));
    let mut session = Session::with_input(input).unwrap();

    step_ingest(&mut session).unwrap();
    let after_ingest: Vec<(u64, Status)> = session
        .state
        .working
        .as_ref()
        .unwrap()
        .records()
        .map(|r| (r.id, r.status))
        .collect();

    run_pipeline(&mut session).unwrap();
    let first = session.require_output().unwrap().clone();
    for (id, before) in &after_ingest {
        let Some(after) = first.sequences.records().find(|r| r.id == *id) else {
            panic!("image {id} disappeared");
        };
        assert!(after.status >= *before, "image {id}: {before} -> {}", after.status);
    }

    run_pipeline(&mut session).unwrap();
    assert_eq!(session.require_output().unwrap(), &first);
}

#[test]
fn file_contracts_round_trip() {
    let site = site();
    let dir = tempfile::tempdir().unwrap();
    let records_path = dir.path().join("records.json");
    let table_path = dir.path().join("calibration.txt");
    let visual_path = dir.path().join("matches.csv");
    let output_path = dir.path().join("completed.json");
    let export_path = dir.path().join("export.csv");

    save_records(&records_path, &site.records).unwrap();
    let table: String = std::iter::once("Image X Y Z Omega Phi Kappa".to_string())
        .chain(
            site.rows
                .iter()
                .map(|r| format!("{} {}", r.key, r.fields.join(" "))),
        )
        .collect::<Vec<_>>()
        .join("\n");
    fs::write(&table_path, table).unwrap();
    let visual = landmark(&site.truth);
    fs::write(
        &visual_path,
        format!("Landmark,Angle,Step02\nmast,{},5112\n", visual.matches[0].angle),
    )
    .unwrap();

    let from_files = PoseCompletionInput::new(
        load_records(&records_path).unwrap(),
        load_calibration_table(&table_path).unwrap(),
    )
    .with_visual(load_visual_matches(&visual_path).unwrap());
    let in_memory = PoseCompletionInput::new(site.records, site.rows).with_visual(visual);

    let mut a = Session::with_input(from_files).unwrap();
    let mut b = Session::with_input(in_memory).unwrap();
    run_pipeline(&mut a).unwrap();
    run_pipeline(&mut b).unwrap();
    let completed = &a.require_output().unwrap().sequences;
    assert_eq!(completed, &b.require_output().unwrap().sequences);

    save_records(&output_path, completed).unwrap();
    assert_eq!(&load_records(&output_path).unwrap(), completed);

    let export = a.export().unwrap();
    save_export_csv(&export_path, &export.rows).unwrap();
    let text = fs::read_to_string(&export_path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], EXPORT_HEADER);
    assert_eq!(lines.len(), export.rows.len() + 1);
}

#[test]
fn session_file_resumes() {
    let site = site();
    let mut session =
        Session::with_input(PoseCompletionInput::new(site.records, site.rows)).unwrap();
    step_ingest(&mut session).unwrap();

    let mut resumed = Session::from_json(&session.to_json().unwrap()).unwrap();
    assert_eq!(resumed.state.completed, vec![Stage::Ingest]);
    for stage in &Stage::ALL[1..] {
        gantry_pipeline::run_stage(&mut resumed, *stage).unwrap();
    }
    run_pipeline(&mut session).unwrap();
    assert_eq!(
        resumed.require_output().unwrap().sequences,
        session.require_output().unwrap().sequences
    );
}

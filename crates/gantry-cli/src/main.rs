use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use flexi_logger::{Logger, LoggerHandle};
use gantry_core::SequenceSet;
use gantry_pipeline::io::{
    load_calibration_table, load_records, load_visual_matches, save_export_csv, save_records,
};
use gantry_pipeline::pose_completion::{
    PoseCompletionConfig, PoseCompletionInput, PoseCompletionProblem, RunSummary, run_pipeline,
    run_stage,
};
use gantry_pipeline::session::CalibrationSession;
use gantry_pipeline::stages::Stage;
use serde::de::DeserializeOwned;

type Session = CalibrationSession<PoseCompletionProblem>;

/// Pose completion for gantry camera sweeps.
#[derive(Debug, Parser)]
#[command(author, version, about = "Complete camera poses of gantry sweeps")]
struct Cli {
    /// Log filter such as `debug` or `gantry_pipeline=debug`.
    /// Falls back to RUST_LOG, then `info`.
    #[arg(long, global = true)]
    log: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run every stage and write the completed records.
    Run {
        #[command(flatten)]
        input: InputArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Run one stage on the given records and write the result.
    Stage {
        /// ingest, fit_circles, assign_angles, visual_calibration, cluster,
        /// interpolate, orientation or finalize.
        name: Stage,
        #[command(flatten)]
        input: InputArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Debug, Clone, Args)]
struct InputArgs {
    /// Record JSON: ground truth, or the output of an earlier stage.
    #[arg(long)]
    records: PathBuf,

    /// External calibration table.
    #[arg(long)]
    calibration: Option<PathBuf>,

    /// Visual-match CSV.
    #[arg(long)]
    visual: Option<PathBuf>,

    /// JSON PoseCompletionConfig. Defaults are used if omitted.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct OutputArgs {
    /// Where to write the resulting record JSON.
    #[arg(long)]
    output: PathBuf,

    /// Also write the export CSV.
    #[arg(long)]
    export_csv: Option<PathBuf>,

    /// Also write the session (config, state, log) as JSON.
    #[arg(long)]
    session: Option<PathBuf>,
}

fn load_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let data =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("invalid JSON in {}", path.display()))
}

fn build_session(input: &InputArgs) -> Result<Session> {
    let records = load_records(&input.records)?;
    let calibration = match &input.calibration {
        Some(path) => load_calibration_table(path)?,
        None => Vec::new(),
    };
    let mut data = PoseCompletionInput::new(records, calibration);
    if let Some(path) = &input.visual {
        data = data.with_visual(load_visual_matches(path)?);
    }

    let mut session = Session::with_input(data)?;
    if let Some(path) = &input.config {
        let config: PoseCompletionConfig = load_json_file(path)?;
        session
            .set_config(config)
            .with_context(|| format!("invalid config in {}", path.display()))?;
    }
    Ok(session)
}

fn write_outputs(session: &mut Session, records: &SequenceSet, output: &OutputArgs) -> Result<()> {
    save_records(&output.output, records)?;
    log::info!("wrote {}", output.output.display());

    if let Some(path) = &output.export_csv {
        if session.has_output() {
            let export = session.export()?;
            save_export_csv(path, &export.rows)?;
        } else {
            log::warn!(
                "no export written to {}: run the finalize stage first",
                path.display()
            );
        }
    }
    if let Some(path) = &output.session {
        fs::write(path, session.to_json()?)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    Ok(())
}

fn run_from_files(input: &InputArgs, output: &OutputArgs) -> Result<RunSummary> {
    let mut session = build_session(input)?;
    if input.calibration.is_none() {
        log::warn!("no calibration table given, every record will stay uncalibrated");
    }
    run_pipeline(&mut session)?;

    let completed = session.require_output()?.clone();
    write_outputs(&mut session, &completed.sequences, output)?;
    Ok(completed.summary)
}

fn stage_from_files(stage: Stage, input: &InputArgs, output: &OutputArgs) -> Result<RunSummary> {
    let mut session = build_session(input)?;
    run_stage(&mut session, stage)?;

    let records = session
        .state
        .working
        .clone()
        .context("stage produced no records")?;
    write_outputs(&mut session, &records, output)?;
    Ok(RunSummary::from_set(&records))
}

fn init_logging(spec: Option<&str>) -> Result<LoggerHandle> {
    let logger = match spec {
        Some(spec) => Logger::try_with_str(spec)?,
        None => Logger::try_with_env_or_str("info")?,
    };
    Ok(logger
        .log_to_stderr()
        .format(flexi_logger::default_format)
        .start()?)
}

fn main() {
    if let Err(err) = try_main() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();
    let _logger = init_logging(cli.log.as_deref())?;

    let summary = match &cli.command {
        Command::Run { input, output } => run_from_files(input, output)?,
        Command::Stage {
            name,
            input,
            output,
        } => stage_from_files(*name, input, output)?,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use gantry_core::Status;
    use gantry_core::synthetic::sweep::{SweepSpec, strip_poses, sweep};
    use gantry_pipeline::io::EXPORT_HEADER;
    use tempfile::TempDir;

    /// Records and a calibration table measuring every other image.
    fn write_fixture(dir: &TempDir) -> InputArgs {
        let truth = sweep(&SweepSpec {
            num_images: 11,
            ..SweepSpec::default()
        });
        let mut table = String::from("# image x y z omega phi kappa\n");
        for r in truth.items.iter().step_by(2) {
            let (Some(p), Some(o)) = (r.position, r.orientation) else {
                panic!("synthetic record without pose");
            };
            table.push_str(&format!(
                "{} {} {} {} {} {} {}\n",
                r.filename, p.x, p.y, p.z, o.omega, o.phi, o.kappa
            ));
        }

        let records = dir.path().join("records.json");
        let calibration = dir.path().join("calibration.txt");
        let mut set = SequenceSet::new();
        set.insert(strip_poses(&truth));
        save_records(&records, &set).unwrap();
        fs::write(&calibration, table).unwrap();

        InputArgs {
            records,
            calibration: Some(calibration),
            visual: None,
            config: None,
        }
    }

    fn outputs(dir: &TempDir) -> OutputArgs {
        OutputArgs {
            output: dir.path().join("completed.json"),
            export_csv: Some(dir.path().join("export.csv")),
            session: Some(dir.path().join("session.json")),
        }
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
        let cli = Cli::try_parse_from([
            "gantry",
            "stage",
            "fit-circles",
            "--records",
            "r.json",
            "--output",
            "o.json",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::Stage {
                name: Stage::FitCircles,
                ..
            }
        ));
    }

    #[test]
    fn helper_smoke_test() {
        let dir = TempDir::new().unwrap();
        let input = write_fixture(&dir);
        let output = outputs(&dir);

        let summary = run_from_files(&input, &output).expect("cli helper should succeed");
        assert_eq!(summary.total.get(Status::Original), 6);
        assert_eq!(summary.total.get(Status::Estimated), 5);

        let completed = load_records(&output.output).unwrap();
        assert!(completed.records().all(|r| r.orientation.is_some()));

        let csv = fs::read_to_string(output.export_csv.as_ref().unwrap()).unwrap();
        assert!(csv.starts_with(EXPORT_HEADER));
        assert_eq!(csv.lines().count(), 1 + 5);

        let session = fs::read_to_string(output.session.as_ref().unwrap()).unwrap();
        let session = Session::from_json(&session).unwrap();
        assert_eq!(session.log.len(), Stage::ALL.len());
    }

    #[test]
    fn single_stage_writes_intermediate_records() {
        let dir = TempDir::new().unwrap();
        let input = write_fixture(&dir);
        let output = outputs(&dir);

        let summary = stage_from_files(Stage::Ingest, &input, &output).unwrap();
        assert_eq!(summary.total.get(Status::Original), 6);
        assert!(!output.export_csv.as_ref().unwrap().exists());

        // resume from the ingested file
        let resumed = InputArgs {
            records: output.output.clone(),
            calibration: None,
            ..input
        };
        let next = OutputArgs {
            output: dir.path().join("circles.json"),
            export_csv: None,
            session: None,
        };
        stage_from_files(Stage::FitCircles, &resumed, &next).unwrap();
        let set = load_records(&next.output).unwrap();
        let seq = set.get("Step01").unwrap();
        let (center, radius) = seq.circle().expect("circle written to record JSON");
        assert!((radius - 47.5).abs() < 1e-6, "radius {radius}");
        assert!((center.x - 44.213).abs() < 1e-6);
    }

    #[test]
    fn missing_records_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let input = InputArgs {
            records: dir.path().join("nope.json"),
            calibration: None,
            visual: None,
            config: None,
        };
        let err = run_from_files(&input, &outputs(&dir)).unwrap_err();
        assert!(format!("{err:#}").contains("nope.json"), "{err:#}");
    }
}

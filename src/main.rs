use anyhow::{Context, Result, bail};
use clap::Parser;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use kira_segqc::atlas::{self, build_atlas, load_atlas, load_reference_case, write_atlas};
use kira_segqc::batch::{BatchController, BatchSummary};
use kira_segqc::cancel::CancelToken;
use kira_segqc::cli::{
    AtlasBuildArgs, AtlasCommand, Cli, Commands, LabelsCommand, LabelsShowArgs, RunArgs,
};
use kira_segqc::convert::Dcm2niix;
use kira_segqc::ctx::{RunConfig, RunEnv};
use kira_segqc::modality::Modality;
use kira_segqc::qc::QcParams;
use kira_segqc::qc::distance::DistanceMetric;
use kira_segqc::segment::CommandPredictor;
use kira_segqc::subject::SubjectStatus;
use kira_segqc::taxonomy::ClassTaxonomy;

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => handle_run(args),
        Commands::Atlas(args) => {
            match args.command {
                AtlasCommand::Build(build) => handle_atlas_build(build)?,
                AtlasCommand::Validate(validate) => {
                    let atlas = load_atlas(&validate.atlas)?;
                    println!("kira-segqc atlas ok");
                    println!("metric: {}", atlas.metric.as_str());
                    println!("classes: {}", atlas.len());
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Labels(args) => {
            match args.command {
                LabelsCommand::Show(show) => handle_labels_show(show)?,
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn handle_run(args: RunArgs) -> Result<ExitCode> {
    if !args.k.is_finite() || args.k < 0.0 {
        bail!("--k must be a finite value >= 0, got {}", args.k);
    }
    if args.max_concurrent_subjects == 0 {
        bail!("--max-concurrent-subjects must be at least 1");
    }
    if !args.main.is_dir() {
        bail!("main folder {} does not exist", args.main.display());
    }

    let taxonomy = ClassTaxonomy::builtin()?;
    let atlas = match load_atlas(&args.atlas) {
        Ok(atlas) => atlas,
        Err(err) => {
            error!(error = %err, "atlas rejected; no subject was processed");
            return Err(err.into());
        }
    };
    info!(
        path = %args.atlas.display(),
        classes = atlas.len(),
        metric = atlas.metric.as_str(),
        "atlas loaded"
    );

    let metric_override = args.metric.map(DistanceMetric::from);
    if let Some(metric) = metric_override.filter(|m| *m != atlas.metric) {
        warn!(
            atlas_metric = atlas.metric.as_str(),
            run_metric = metric.as_str(),
            "metric differs from the one the atlas statistics were built with"
        );
    }

    let converter = Dcm2niix::new(args.dcm2niix.clone());
    if !converter.is_available() {
        warn!(binary = %args.dcm2niix.display(), "converter not found; conversions will fail");
    }
    let predictor = CommandPredictor::from_template(
        &args.predictor_cmd,
        &args.model,
        Duration::from_secs(args.predictor_timeout),
    )
    .context("invalid --predictor-cmd")?;

    let config = RunConfig {
        qc: QcParams {
            k: args.k,
            metric_override,
        },
        max_concurrent_subjects: args.max_concurrent_subjects,
        force: args.force,
        ..RunConfig::default()
    };
    let cancel = CancelToken::new();
    let env = RunEnv {
        taxonomy: &taxonomy,
        atlas: &atlas,
        converter: &converter,
        predictor: &predictor,
        config: &config,
        cancel: &cancel,
    };

    let summary = BatchController::new(env).run(&args.main)?;
    print_summary(&summary);
    if summary.has_failures() {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn print_summary(summary: &BatchSummary) {
    println!("kira-segqc v{}", env!("CARGO_PKG_VERSION"));
    println!(
        "Subjects: {} completed, {} failed, {} flagged",
        summary.completed(),
        summary.failed(),
        summary.flagged()
    );
    for outcome in &summary.outcomes {
        match (outcome.status, &outcome.failure) {
            (SubjectStatus::Failed, Some(failure)) => println!(
                "- {}: Failed ({} in {})",
                outcome.subject, failure.kind, failure.stage
            ),
            (status, _) => println!(
                "- {}: {} at_risk={}",
                outcome.subject,
                status,
                outcome.at_risk_count.unwrap_or(0)
            ),
        }
    }
}

fn handle_atlas_build(args: AtlasBuildArgs) -> Result<()> {
    let taxonomy = ClassTaxonomy::builtin()?;
    let cases = args
        .reference
        .iter()
        .map(|dir| load_reference_case(dir, &taxonomy))
        .collect::<Result<Vec<_>>>()?;
    let (doc, warnings) = build_atlas(&cases, args.metric.into())?;
    let atlas = atlas::validate_document(&doc)
        .map_err(|reason| anyhow::anyhow!("built atlas is invalid: {}", reason))?;
    write_atlas(&args.out, &doc)?;

    println!("kira-segqc atlas build");
    println!("cases: {}", cases.len());
    println!("classes: {}", atlas.len());
    println!("out: {}", args.out.display());
    if !warnings.is_empty() {
        println!("warnings:");
        for warning in &warnings {
            println!("- {}", warning);
        }
    }
    Ok(())
}

fn handle_labels_show(args: LabelsShowArgs) -> Result<()> {
    let taxonomy = ClassTaxonomy::builtin()?;
    let modality: Modality = args.modality.into();
    println!("# taxonomy {} {} ({} classes)", taxonomy.version, modality, taxonomy.size(modality));
    for id in taxonomy.ids(modality) {
        if let Some(label) = taxonomy.get(id) {
            println!("{}\t{}\t{}", label.id, label.name, label.group.as_str());
        }
    }
    Ok(())
}

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::modality::Modality;
use crate::qc::distance::DistanceMetric;

#[derive(Debug, Parser)]
#[command(
    name = "kira-segqc",
    version,
    about = "Whole-body PET/CT segmentation with similarity-space QC"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Convert, segment and QC every subject of a main folder.
    Run(RunArgs),
    /// Build or validate a reference atlas.
    Atlas(AtlasArgs),
    /// Inspect the label taxonomy.
    Labels(LabelsArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    #[arg(long, help = "Main folder with one subdirectory per subject")]
    pub main: PathBuf,

    #[arg(long, help = "Reference atlas (.json or .json.gz)")]
    pub atlas: PathBuf,

    #[arg(
        long,
        help = "Predictor command template; placeholders {ct} {pet} {out} {modality} {model}"
    )]
    pub predictor_cmd: String,

    #[arg(long, default_value = "kira_wholebody", help = "Value substituted for {model}")]
    pub model: String,

    #[arg(long, default_value_t = 3600, help = "Predictor timeout in seconds")]
    pub predictor_timeout: u64,

    #[arg(long, default_value_t = 3.0, help = "Threshold = distance mean + k * distance std")]
    pub k: f64,

    #[arg(long, value_enum, help = "Override the metric recorded in the atlas")]
    pub metric: Option<MetricArg>,

    #[arg(long, default_value_t = 1)]
    pub max_concurrent_subjects: usize,

    #[arg(long, default_value = "dcm2niix", help = "DICOM to NIfTI converter binary")]
    pub dcm2niix: PathBuf,

    #[arg(
        long,
        default_value_t = false,
        help = "Reprocess subjects already marked QCComplete"
    )]
    pub force: bool,
}

#[derive(Debug, Args)]
pub struct AtlasArgs {
    #[command(subcommand)]
    pub command: AtlasCommand,
}

#[derive(Debug, Subcommand)]
pub enum AtlasCommand {
    /// Build an atlas from completed subject output folders.
    Build(AtlasBuildArgs),
    /// Load and validate an atlas file.
    Validate(AtlasValidateArgs),
}

#[derive(Debug, Args)]
pub struct AtlasBuildArgs {
    #[arg(
        long,
        num_args = 1..,
        required = true,
        help = "Subject output folder (<subject>/kira-segqc) of a known-good case (repeatable)"
    )]
    pub reference: Vec<PathBuf>,

    #[arg(long)]
    pub out: PathBuf,

    #[arg(long, value_enum, default_value_t = MetricArg::Mahalanobis)]
    pub metric: MetricArg,
}

#[derive(Debug, Args)]
pub struct AtlasValidateArgs {
    #[arg(long)]
    pub atlas: PathBuf,
}

#[derive(Debug, Args)]
pub struct LabelsArgs {
    #[command(subcommand)]
    pub command: LabelsCommand,
}

#[derive(Debug, Subcommand)]
pub enum LabelsCommand {
    /// Print label id, region and group.
    Show(LabelsShowArgs),
}

#[derive(Debug, Args)]
pub struct LabelsShowArgs {
    #[arg(long, value_enum, default_value_t = ModalityArg::PetCt)]
    pub modality: ModalityArg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MetricArg {
    Mahalanobis,
    Rms,
    Chebyshev,
}

impl From<MetricArg> for DistanceMetric {
    fn from(arg: MetricArg) -> Self {
        match arg {
            MetricArg::Mahalanobis => DistanceMetric::Mahalanobis,
            MetricArg::Rms => DistanceMetric::Rms,
            MetricArg::Chebyshev => DistanceMetric::Chebyshev,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModalityArg {
    Ct,
    PetCt,
}

impl From<ModalityArg> for Modality {
    fn from(arg: ModalityArg) -> Self {
        match arg {
            ModalityArg::Ct => Modality::CtOnly,
            ModalityArg::PetCt => Modality::PetCt,
        }
    }
}

use std::path::PathBuf;

use clap::parser::ValueSource;
use clap::{ArgAction, ArgMatches, CommandFactory, FromArgMatches, Parser};
use degrid_aligner::AlignerConfig;

use crate::settings::{
    BackgroundMode, FallbackPolicy, MissingTextPolicy, OutputFrame, default_workers,
};

#[derive(Debug, Default)]
pub struct CliSources {
    pub bright_threshold_from_cli: bool,
    pub max_angle_from_cli: bool,
    pub angle_step_from_cli: bool,
    pub max_shift_from_cli: bool,
    pub workers_from_cli: bool,
    pub recenter_from_cli: bool,
    pub write_debug_from_cli: bool,
}

impl CliSources {
    fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            bright_threshold_from_cli: value_from_cli(matches, "bright_threshold"),
            max_angle_from_cli: value_from_cli(matches, "max_angle"),
            angle_step_from_cli: value_from_cli(matches, "angle_step"),
            max_shift_from_cli: value_from_cli(matches, "max_shift"),
            workers_from_cli: value_from_cli(matches, "workers"),
            recenter_from_cli: value_from_cli(matches, "recenter"),
            write_debug_from_cli: value_from_cli(matches, "write_debug"),
        }
    }
}

fn value_from_cli(matches: &ArgMatches, id: &str) -> bool {
    matches
        .value_source(id)
        .is_some_and(|source| matches!(source, ValueSource::CommandLine))
}

pub fn parse_cli() -> (CliArgs, CliSources) {
    parse_cli_from(std::env::args_os())
}

pub fn parse_cli_from<I, T>(args: I) -> (CliArgs, CliSources)
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let command = CliArgs::command();
    let matches = command.get_matches_from(args);
    let args = match CliArgs::from_arg_matches(&matches) {
        Ok(args) => args,
        Err(err) => err.exit(),
    };
    let sources = CliSources::from_matches(&matches);
    (args, sources)
}

#[derive(Debug, Parser)]
#[command(
    name = "degrid",
    about = "Remove the reference grid from scanned satellite film frames",
    disable_help_subcommand = true
)]
pub struct CliArgs {
    /// Override the configuration file path
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// Print the list of available inpainting engines
    #[arg(long = "list-backends")]
    pub list_backends: bool,

    /// Output directory for per-frame results
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Directory for the numbered output sequence (defaults to <output>/sequence)
    #[arg(long = "sequence-dir")]
    pub sequence_dir: Option<PathBuf>,

    /// Directory holding mask.<LABEL>.png grid templates
    #[arg(short = 't', long = "templates")]
    pub templates: Option<PathBuf>,

    /// Preferred satellite id
    #[arg(long = "satellite")]
    pub satellite: Option<String>,

    /// Satellite whose frames fill gaps left by the preferred one
    #[arg(long = "alt-satellite")]
    pub alternate_satellite: Option<String>,

    /// First day of year to process (inclusive)
    #[arg(long = "start-day", value_parser = parse_day)]
    pub start_day: Option<u16>,

    /// Last day of year to process (inclusive)
    #[arg(long = "end-day", value_parser = parse_day)]
    pub end_day: Option<u16>,

    /// Spectral band to process (e.g. vi, ir)
    #[arg(long = "band")]
    pub band: Option<String>,

    /// Gray level a pixel must exceed to count as a grid feature (0-255)
    #[arg(
        long = "bright-threshold",
        id = "bright_threshold",
        default_value_t = AlignerConfig::default().bright_threshold,
        value_parser = parse_u8_byte
    )]
    pub bright_threshold: u8,

    /// Rotation search bound in degrees
    #[arg(
        long = "max-angle",
        id = "max_angle",
        default_value_t = AlignerConfig::default().max_angle,
        value_parser = parse_non_negative_f32
    )]
    pub max_angle: f32,

    /// Rotation search step in degrees
    #[arg(
        long = "angle-step",
        id = "angle_step",
        default_value_t = AlignerConfig::default().angle_step,
        value_parser = parse_positive_f32
    )]
    pub angle_step: f32,

    /// Per-axis translation clamp in pixels
    #[arg(
        long = "max-shift",
        id = "max_shift",
        default_value_t = AlignerConfig::default().max_shift,
        value_parser = parse_non_negative_f32
    )]
    pub max_shift: f32,

    /// Fraction of rows at the top ignored during alignment
    #[arg(long = "header-crop")]
    pub header_crop: Option<f32>,

    /// Scores below this are reported as low confidence
    #[arg(long = "min-score")]
    pub min_confident_score: Option<u64>,

    /// Recenter the imaged disk after alignment
    #[arg(long = "recenter", id = "recenter", action = ArgAction::SetTrue)]
    pub recenter: bool,

    /// Inpainting engines to run, comma separated (neighbor-fill, telea)
    #[arg(long = "inpaint", value_delimiter = ',')]
    pub inpaint: Option<Vec<String>>,

    /// Neighborhood radius for the fast-marching engine
    #[arg(long = "radius", value_parser = parse_positive_u32)]
    pub radius: Option<u32>,

    /// Side of the square used to dilate the grid mask
    #[arg(long = "dilate")]
    pub dilate: Option<u32>,

    /// What to do when an engine is unavailable or fails
    #[arg(long = "fallback", value_enum)]
    pub fallback: Option<FallbackPolicy>,

    /// Geometry of the written images
    #[arg(long = "frame", value_enum)]
    pub frame: Option<OutputFrame>,

    /// Frames processed concurrently
    #[arg(
        short = 'j',
        long = "workers",
        id = "workers",
        default_value_t = default_workers(),
        value_parser = parse_positive_usize
    )]
    pub workers: usize,

    /// Abandon a frame whose alignment takes longer than this many seconds
    #[arg(long = "frame-timeout", value_parser = parse_positive_u64)]
    pub frame_timeout_secs: Option<u64>,

    /// Handling of frames without recognized text
    #[arg(long = "missing-text", value_enum)]
    pub missing_text: Option<MissingTextPolicy>,

    /// Background removal applied to produce the _nobg variants
    #[arg(long = "background", value_enum)]
    pub background: Option<BackgroundMode>,

    /// Gray level at or below which luma-key treats a pixel as background
    #[arg(long = "key-threshold", value_parser = parse_u8_byte)]
    pub key_threshold: Option<u8>,

    /// Also write the thresholded frame mask and the dilated artifact mask
    #[arg(long = "debug", id = "write_debug", action = ArgAction::SetTrue)]
    pub write_debug: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    /// Directory of scanned frames and their OCR sidecars
    pub input: Option<PathBuf>,
}

fn parse_u8_byte(value: &str) -> Result<u8, String> {
    value
        .parse::<u8>()
        .map_err(|_| format!("'{value}' is not a valid 0-255 value"))
}

fn parse_positive_u32(value: &str) -> Result<u32, String> {
    let parsed = value
        .parse::<u32>()
        .map_err(|_| format!("'{value}' is not a valid number"))?;
    if parsed == 0 {
        return Err("value must be at least 1".into());
    }
    Ok(parsed)
}

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|_| format!("'{value}' is not a valid number"))?;
    if parsed == 0 {
        return Err("value must be at least 1".into());
    }
    Ok(parsed)
}

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|_| format!("'{value}' is not a valid number"))?;
    if parsed == 0 {
        return Err("value must be at least 1".into());
    }
    Ok(parsed)
}

fn parse_non_negative_f32(value: &str) -> Result<f32, String> {
    let parsed = value
        .parse::<f32>()
        .map_err(|_| format!("'{value}' is not a valid number"))?;
    if !parsed.is_finite() || parsed < 0.0 {
        return Err("value must be a non-negative number".into());
    }
    Ok(parsed)
}

fn parse_positive_f32(value: &str) -> Result<f32, String> {
    let parsed = parse_non_negative_f32(value)?;
    if parsed == 0.0 {
        return Err("value must be greater than zero".into());
    }
    Ok(parsed)
}

fn parse_day(value: &str) -> Result<u16, String> {
    let parsed = value
        .parse::<u16>()
        .map_err(|_| format!("'{value}' is not a valid day of year"))?;
    if !(1..=366).contains(&parsed) {
        return Err("day of year must be within 1-366".into());
    }
    Ok(parsed)
}

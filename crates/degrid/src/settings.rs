use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::thread;
use std::time::Duration;

use clap::ValueEnum;
use degrid_aligner::{AlignError, AlignerConfig};
use degrid_classifier::ClassifierTable;
use degrid_inpaint::{Backend, DEFAULT_RADIUS};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::cli::{CliArgs, CliSources};

pub const DEFAULT_DILATE: u32 = 5;
pub const DEFAULT_KEY_THRESHOLD: u8 = 10;
pub const DEFAULT_OUTPUT_DIR: &str = "degrid-out";
pub const DEFAULT_TEMPLATE_DIR: &str = "templates";
const DEFAULT_BACKENDS: [Backend; 2] = [Backend::NeighborFill, Backend::Telea];

pub fn default_workers() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(8)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum FallbackPolicy {
    /// Substitute the iterative neighbor fill for the failed engine.
    #[default]
    NeighborFill,
    /// Drop the failed variant.
    Omit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFrame {
    /// Move the imagery into the template's reference frame.
    #[default]
    Template,
    /// Keep the scan geometry and move the template instead.
    Scan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum MissingTextPolicy {
    /// Skip frames without a sidecar or without any text.
    #[default]
    Skip,
    /// Align such frames against every template.
    Exhaustive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum BackgroundMode {
    #[default]
    None,
    LumaKey,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub(crate) struct FileConfig {
    pub(crate) alignment: Option<AlignmentFileConfig>,
    pub(crate) inpaint: Option<InpaintFileConfig>,
    pub(crate) templates: Option<TemplatesFileConfig>,
    pub(crate) classifier: Option<ClassifierTable>,
    pub(crate) input: Option<InputFileConfig>,
    pub(crate) output: Option<OutputFileConfig>,
    pub(crate) pipeline: Option<PipelineFileConfig>,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone)]
#[serde(default)]
pub(crate) struct AlignmentFileConfig {
    pub(crate) bright_threshold: Option<u8>,
    pub(crate) max_angle: Option<f32>,
    pub(crate) angle_step: Option<f32>,
    pub(crate) max_shift: Option<f32>,
    pub(crate) header_crop_fraction: Option<f32>,
    pub(crate) min_confident_score: Option<u64>,
    pub(crate) recenter_disk: Option<bool>,
    pub(crate) disk_threshold: Option<u8>,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone)]
#[serde(default)]
pub(crate) struct InpaintFileConfig {
    pub(crate) backends: Option<Vec<String>>,
    pub(crate) radius: Option<u32>,
    pub(crate) dilate: Option<u32>,
    pub(crate) fallback: Option<FallbackPolicy>,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone)]
#[serde(default)]
pub(crate) struct TemplatesFileConfig {
    pub(crate) dir: Option<PathBuf>,
    pub(crate) labels: Option<BTreeMap<String, PathBuf>>,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone)]
#[serde(default)]
pub(crate) struct InputFileConfig {
    pub(crate) dir: Option<PathBuf>,
    pub(crate) satellite: Option<String>,
    pub(crate) alternate_satellite: Option<String>,
    pub(crate) start_day: Option<u16>,
    pub(crate) end_day: Option<u16>,
    pub(crate) band: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone)]
#[serde(default)]
pub(crate) struct OutputFileConfig {
    pub(crate) dir: Option<PathBuf>,
    pub(crate) sequence_dir: Option<PathBuf>,
    pub(crate) write_debug: Option<bool>,
    pub(crate) frame: Option<OutputFrame>,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone)]
#[serde(default)]
pub(crate) struct PipelineFileConfig {
    pub(crate) workers: Option<usize>,
    pub(crate) frame_timeout_secs: Option<u64>,
    pub(crate) missing_text: Option<MissingTextPolicy>,
    pub(crate) background: Option<BackgroundMode>,
    pub(crate) key_threshold: Option<u8>,
}

#[derive(Debug, Clone)]
pub struct EffectiveSettings {
    pub alignment: AlignerConfig,
    pub inpaint: InpaintSettings,
    pub templates: TemplateSource,
    pub classifier: ClassifierTable,
    pub input: InputSettings,
    pub output: OutputSettings,
    pub pipeline: PipelineSettings,
}

#[derive(Debug, Clone)]
pub struct InpaintSettings {
    pub backends: Vec<Backend>,
    pub radius: u32,
    pub dilate: u32,
    pub fallback: FallbackPolicy,
}

/// Where grid templates come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    /// Every `mask.<LABEL>.png` in the directory.
    Dir(PathBuf),
    /// Explicit label to file table.
    Table(BTreeMap<String, PathBuf>),
}

#[derive(Debug, Clone, Default)]
pub struct InputSettings {
    pub dir: Option<PathBuf>,
    pub satellite: Option<String>,
    pub alternate_satellite: Option<String>,
    pub start_day: Option<u16>,
    pub end_day: Option<u16>,
    pub band: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OutputSettings {
    pub dir: PathBuf,
    pub sequence_dir: PathBuf,
    pub write_debug: bool,
    pub frame: OutputFrame,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub workers: usize,
    pub frame_timeout: Option<Duration>,
    pub missing_text: MissingTextPolicy,
    pub background: BackgroundMode,
    pub key_threshold: u8,
}

#[derive(Debug)]
pub struct ResolvedSettings {
    pub settings: EffectiveSettings,
    pub config_path: Option<PathBuf>,
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    InvalidValue {
        path: Option<PathBuf>,
        field: &'static str,
        value: String,
    },
    NotFound {
        path: PathBuf,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(
                    f,
                    "failed to read config file {}: {}",
                    path.display(),
                    source
                )
            }
            ConfigError::Parse { path, source } => {
                write!(
                    f,
                    "failed to parse config file {}: {}",
                    path.display(),
                    source
                )
            }
            ConfigError::InvalidValue { path, field, value } => {
                if let Some(path) = path {
                    write!(
                        f,
                        "invalid value '{}' for '{}' in {}",
                        value,
                        field,
                        path.display()
                    )
                } else {
                    write!(f, "invalid value '{}' for '{}'", value, field)
                }
            }
            ConfigError::NotFound { path } => {
                write!(f, "config file {} does not exist", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::InvalidValue { .. } => None,
            ConfigError::NotFound { .. } => None,
        }
    }
}

pub fn resolve_settings(
    cli: &CliArgs,
    sources: &CliSources,
) -> Result<ResolvedSettings, ConfigError> {
    let (file, config_path) = load_config(cli.config.as_deref())?;
    merge(cli, sources, file, config_path)
}

fn load_config(path_override: Option<&Path>) -> Result<(FileConfig, Option<PathBuf>), ConfigError> {
    if let Some(path) = path_override {
        let path = path.to_path_buf();
        if !path.exists() {
            return Err(ConfigError::NotFound { path });
        }
        let config = load_file_config(&path)?;
        return Ok((config, Some(path)));
    }

    if let Some(project_path) = project_config_path()
        && project_path.exists()
    {
        let config = load_file_config(&project_path)?;
        return Ok((config, Some(project_path)));
    }

    let Some(default_path) = default_config_path() else {
        return Ok((FileConfig::default(), None));
    };
    if !default_path.exists() {
        return Ok((FileConfig::default(), None));
    }
    let config = load_file_config(&default_path)?;
    Ok((config, Some(default_path)))
}

pub(crate) fn load_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_file_config(&contents, path)
}

fn parse_file_config(contents: &str, path: &Path) -> Result<FileConfig, ConfigError> {
    toml::from_str(contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("rs", "degrid", "degrid").map(|dirs| dirs.config_dir().join("config.toml"))
}

fn project_config_path() -> Option<PathBuf> {
    env::current_dir().ok().map(|dir| dir.join("config.toml"))
}

fn merge(
    cli: &CliArgs,
    sources: &CliSources,
    file: FileConfig,
    config_path: Option<PathBuf>,
) -> Result<ResolvedSettings, ConfigError> {
    let FileConfig {
        alignment: file_alignment,
        inpaint: file_inpaint,
        templates: file_templates,
        classifier: file_classifier,
        input: file_input,
        output: file_output,
        pipeline: file_pipeline,
    } = file;

    let alignment_cfg = file_alignment.unwrap_or_default();
    let inpaint_cfg = file_inpaint.unwrap_or_default();
    let templates_cfg = file_templates.unwrap_or_default();
    let input_cfg = file_input.unwrap_or_default();
    let output_cfg = file_output.unwrap_or_default();
    let pipeline_cfg = file_pipeline.unwrap_or_default();
    let path = config_path.as_ref();

    let defaults = AlignerConfig::default();
    let alignment = AlignerConfig {
        bright_threshold: prefer_cli(
            cli.bright_threshold,
            alignment_cfg.bright_threshold,
            !sources.bright_threshold_from_cli,
        ),
        max_angle: prefer_cli(
            cli.max_angle,
            alignment_cfg.max_angle,
            !sources.max_angle_from_cli,
        ),
        angle_step: prefer_cli(
            cli.angle_step,
            alignment_cfg.angle_step,
            !sources.angle_step_from_cli,
        ),
        max_shift: prefer_cli(
            cli.max_shift,
            alignment_cfg.max_shift,
            !sources.max_shift_from_cli,
        ),
        header_crop_fraction: cli
            .header_crop
            .or(alignment_cfg.header_crop_fraction)
            .unwrap_or(defaults.header_crop_fraction),
        min_confident_score: cli
            .min_confident_score
            .or(alignment_cfg.min_confident_score)
            .unwrap_or(defaults.min_confident_score),
        recenter_disk: prefer_cli(
            cli.recenter,
            alignment_cfg.recenter_disk,
            !sources.recenter_from_cli,
        ),
        disk_threshold: alignment_cfg
            .disk_threshold
            .unwrap_or(defaults.disk_threshold),
    };
    alignment
        .validate()
        .map_err(|err| align_error_to_config(err, path))?;

    let inpaint = InpaintSettings {
        backends: resolve_backends(cli.inpaint.clone(), inpaint_cfg.backends, path)?,
        radius: positive_u32(
            cli.radius.or(inpaint_cfg.radius),
            DEFAULT_RADIUS,
            "inpaint.radius",
            path,
        )?,
        dilate: cli
            .dilate
            .or(inpaint_cfg.dilate)
            .unwrap_or(DEFAULT_DILATE),
        fallback: cli.fallback.or(inpaint_cfg.fallback).unwrap_or_default(),
    };

    let templates = match (cli.templates.clone(), templates_cfg) {
        (Some(dir), _) => TemplateSource::Dir(dir),
        (None, TemplatesFileConfig { labels: Some(labels), .. }) if !labels.is_empty() => {
            TemplateSource::Table(labels)
        }
        (None, TemplatesFileConfig { dir, .. }) => {
            TemplateSource::Dir(dir.unwrap_or_else(|| PathBuf::from(DEFAULT_TEMPLATE_DIR)))
        }
    };

    let input = InputSettings {
        dir: cli.input.clone().or(input_cfg.dir),
        satellite: normalize_string(cli.satellite.clone())
            .or_else(|| normalize_string(input_cfg.satellite)),
        alternate_satellite: normalize_string(cli.alternate_satellite.clone())
            .or_else(|| normalize_string(input_cfg.alternate_satellite)),
        start_day: cli.start_day.or(input_cfg.start_day),
        end_day: cli.end_day.or(input_cfg.end_day),
        band: normalize_string(cli.band.clone()).or_else(|| normalize_string(input_cfg.band)),
    };
    validate_day_range(&input, path)?;

    let output_dir = cli
        .output
        .clone()
        .or(output_cfg.dir)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));
    let output = OutputSettings {
        sequence_dir: cli
            .sequence_dir
            .clone()
            .or(output_cfg.sequence_dir)
            .unwrap_or_else(|| output_dir.join("sequence")),
        dir: output_dir,
        write_debug: prefer_cli(
            cli.write_debug,
            output_cfg.write_debug,
            !sources.write_debug_from_cli,
        ),
        frame: cli.frame.or(output_cfg.frame).unwrap_or_default(),
    };

    let pipeline = PipelineSettings {
        workers: resolve_workers(
            cli.workers,
            pipeline_cfg.workers,
            !sources.workers_from_cli,
            path,
        )?,
        frame_timeout: cli
            .frame_timeout_secs
            .or(pipeline_cfg.frame_timeout_secs)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs),
        missing_text: cli
            .missing_text
            .or(pipeline_cfg.missing_text)
            .unwrap_or_default(),
        background: cli.background.or(pipeline_cfg.background).unwrap_or_default(),
        key_threshold: cli
            .key_threshold
            .or(pipeline_cfg.key_threshold)
            .unwrap_or(DEFAULT_KEY_THRESHOLD),
    };

    let settings = EffectiveSettings {
        alignment,
        inpaint,
        templates,
        classifier: file_classifier.unwrap_or_default(),
        input,
        output,
        pipeline,
    };

    Ok(ResolvedSettings {
        settings,
        config_path,
    })
}

/// The CLI value wins when it was given explicitly or the file is silent.
fn prefer_cli<T>(cli_value: T, file_value: Option<T>, use_file: bool) -> T {
    if use_file && let Some(value) = file_value {
        return value;
    }
    cli_value
}

fn normalize_string(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn align_error_to_config(err: AlignError, config_path: Option<&PathBuf>) -> ConfigError {
    match err {
        AlignError::InvalidConfig { field, value } => ConfigError::InvalidValue {
            path: config_path.cloned(),
            field,
            value,
        },
        other => ConfigError::InvalidValue {
            path: config_path.cloned(),
            field: "alignment",
            value: other.to_string(),
        },
    }
}

fn resolve_backends(
    cli_value: Option<Vec<String>>,
    file_value: Option<Vec<String>>,
    config_path: Option<&PathBuf>,
) -> Result<Vec<Backend>, ConfigError> {
    let Some(names) = cli_value.or(file_value) else {
        return Ok(DEFAULT_BACKENDS.to_vec());
    };
    let mut backends = Vec::new();
    for name in names.iter().filter_map(|name| normalize_string(Some(name.clone()))) {
        let backend = Backend::from_str(&name).map_err(|_| ConfigError::InvalidValue {
            path: config_path.cloned(),
            field: "inpaint.backends",
            value: name.clone(),
        })?;
        if !backends.contains(&backend) {
            backends.push(backend);
        }
    }
    if backends.is_empty() {
        return Err(ConfigError::InvalidValue {
            path: config_path.cloned(),
            field: "inpaint.backends",
            value: "[]".into(),
        });
    }
    Ok(backends)
}

fn positive_u32(
    value: Option<u32>,
    default: u32,
    field: &'static str,
    config_path: Option<&PathBuf>,
) -> Result<u32, ConfigError> {
    match value {
        Some(0) => Err(ConfigError::InvalidValue {
            path: config_path.cloned(),
            field,
            value: "0".into(),
        }),
        Some(value) => Ok(value),
        None => Ok(default),
    }
}

fn resolve_workers(
    cli_value: usize,
    file_value: Option<usize>,
    use_file: bool,
    config_path: Option<&PathBuf>,
) -> Result<usize, ConfigError> {
    if use_file && let Some(value) = file_value {
        if value == 0 {
            return Err(ConfigError::InvalidValue {
                path: config_path.cloned(),
                field: "pipeline.workers",
                value: value.to_string(),
            });
        }
        return Ok(value);
    }
    Ok(cli_value)
}

fn validate_day_range(
    input: &InputSettings,
    config_path: Option<&PathBuf>,
) -> Result<(), ConfigError> {
    for (field, day) in [("input.start_day", input.start_day), ("input.end_day", input.end_day)] {
        if let Some(day) = day
            && !(1..=366).contains(&day)
        {
            return Err(ConfigError::InvalidValue {
                path: config_path.cloned(),
                field,
                value: day.to_string(),
            });
        }
    }
    if let (Some(start), Some(end)) = (input.start_day, input.end_day)
        && start > end
    {
        return Err(ConfigError::InvalidValue {
            path: config_path.cloned(),
            field: "input.end_day",
            value: format!("{end} (before start day {start})"),
        });
    }
    Ok(())
}

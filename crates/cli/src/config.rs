//! Run configuration: a TOML file, command-line flags, or both.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::Args;
use serde::Deserialize;

use bmptrace_algorithms::cancel::CancelToken;
use bmptrace_algorithms::hydrology::{StepBudget, TraceParams};
use bmptrace_algorithms::strategy::ProcessingMode;
use bmptrace_core::io::{GridSource, InlineGrid};

/// One tracing run.
///
/// ```toml
/// output_destination = "out/unmitigated.tif"
///
/// [flow_direction_source]
/// path = "data/flowdir.tif"
///
/// [effectiveness_source]
/// path = "data/bmp.tif"
///
/// [trace]
/// mode = "parallel"
/// step_budget = { perimeter_multiple = 4 }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub output_destination: PathBuf,
    pub flow_direction_source: GridSource,
    pub effectiveness_source: GridSource,
    #[serde(default)]
    pub trace: TraceSection,
}

/// Optional `[trace]` table
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TraceSection {
    pub mode: ModeSetting,
    /// Worker threads, parallel mode only
    pub threads: Option<usize>,
    pub step_budget: BudgetSetting,
    pub abort_on_divergence: bool,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeSetting {
    Sequential,
    #[default]
    Parallel,
}

/// `"cells"`, `{ perimeter_multiple = k }` or `{ fixed = n }` in TOML;
/// `cells`, `perimeter:<k>` or `fixed:<n>` on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetSetting {
    #[default]
    Cells,
    PerimeterMultiple(usize),
    Fixed(usize),
}

impl FromStr for BudgetSetting {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        if s == "cells" {
            return Ok(BudgetSetting::Cells);
        }
        let (kind, n) = s
            .split_once(':')
            .ok_or_else(|| format!("Unknown step budget: {}. Use cells, perimeter:<k> or fixed:<n>.", s))?;
        let n: usize = n
            .trim()
            .parse()
            .map_err(|_| format!("Invalid step count: {}", n))?;
        match kind.trim() {
            "perimeter" | "perimeter_multiple" => Ok(BudgetSetting::PerimeterMultiple(n)),
            "fixed" => Ok(BudgetSetting::Fixed(n)),
            other => Err(format!("Unknown step budget: {}. Use cells, perimeter:<k> or fixed:<n>.", other)),
        }
    }
}

impl From<BudgetSetting> for StepBudget {
    fn from(setting: BudgetSetting) -> Self {
        match setting {
            BudgetSetting::Cells => StepBudget::Cells,
            BudgetSetting::PerimeterMultiple(k) => StepBudget::PerimeterMultiple(k),
            BudgetSetting::Fixed(n) => StepBudget::Fixed(n),
        }
    }
}

impl RunConfig {
    /// Read and validate a TOML run configuration
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let config = Self::parse(&contents).with_context(|| format!("parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("parse run configuration")
    }

    pub fn validate(&self) -> Result<()> {
        if self.output_destination.as_os_str().is_empty() {
            return Err(anyhow!("output_destination must not be empty"));
        }
        for (name, source) in [
            ("flow_direction_source", &self.flow_direction_source),
            ("effectiveness_source", &self.effectiveness_source),
        ] {
            match source {
                GridSource::GeoTiff { path } if path.as_os_str().is_empty() => {
                    bail!("{}.path must not be empty", name)
                }
                GridSource::GeoTiff { .. } => {}
                GridSource::Inline(grid) => validate_inline(name, grid)?,
            }
        }

        let trace = &self.trace;
        if trace.threads == Some(0) {
            bail!("trace.threads must be > 0");
        }
        if trace.threads.is_some() && trace.mode == ModeSetting::Sequential {
            bail!("trace.threads only applies to parallel mode");
        }
        match trace.step_budget {
            BudgetSetting::PerimeterMultiple(0) | BudgetSetting::Fixed(0) => {
                bail!("trace.step_budget must allow at least one step")
            }
            _ => {}
        }
        if trace.timeout_secs == Some(0) {
            bail!("trace.timeout_secs must be > 0");
        }
        Ok(())
    }

    /// Tracing parameters for this run. The timeout, if any, starts now.
    pub fn to_params(&self) -> TraceParams {
        let trace = &self.trace;
        let mode = match (trace.mode, trace.threads) {
            (ModeSetting::Sequential, _) => ProcessingMode::Sequential,
            (ModeSetting::Parallel, None) => ProcessingMode::Parallel,
            (ModeSetting::Parallel, Some(n)) => ProcessingMode::ParallelWith(n),
        };
        let cancel = match trace.timeout_secs {
            Some(secs) => CancelToken::with_timeout(Duration::from_secs(secs)),
            None => CancelToken::new(),
        };

        TraceParams {
            mode,
            step_budget: trace.step_budget.into(),
            abort_on_divergence: trace.abort_on_divergence,
            cancel,
        }
    }
}

fn validate_inline(name: &str, grid: &InlineGrid) -> Result<()> {
    if grid.rows == 0 || grid.cols == 0 {
        bail!("{}: rows and cols must be > 0", name);
    }
    if grid.values.len() != grid.rows * grid.cols {
        bail!(
            "{}: expected {} values for a {} x {} grid, got {}",
            name,
            grid.rows * grid.cols,
            grid.rows,
            grid.cols,
            grid.values.len()
        );
    }
    if !(grid.cell_size.is_finite() && grid.cell_size > 0.0) {
        bail!("{}: cell_size must be a positive number", name);
    }
    if !grid.lower_left.iter().all(|v| v.is_finite()) {
        bail!("{}: lower_left must be finite", name);
    }
    Ok(())
}

/// Inputs, output and tracing flags shared by `run` and `check`
#[derive(Debug, Clone, Default, Args)]
pub struct RunArgs {
    /// TOML run configuration
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Flow direction GeoTIFF (D8 codes 1, 2, 4, ..., 128)
    #[arg(long)]
    pub flow_direction: Option<PathBuf>,
    /// BMP effectiveness GeoTIFF (0 = no removal, 1 = full removal)
    #[arg(long)]
    pub effectiveness: Option<PathBuf>,
    /// Output GeoTIFF
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Trace on a single thread
    #[arg(long, conflicts_with = "threads")]
    pub sequential: bool,
    /// Worker threads for parallel tracing
    #[arg(short, long)]
    pub threads: Option<usize>,
    /// Step budget per trace: cells, perimeter:<k> or fixed:<n>
    #[arg(long)]
    pub step_budget: Option<BudgetSetting>,
    /// Fail on the first trace that never leaves the grid
    #[arg(long)]
    pub abort_on_divergence: bool,
    /// Give up after this many seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

impl RunArgs {
    /// The configuration file, if given, with command-line flags on top
    pub fn resolve(&self) -> Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::load(path)?,
            None => {
                let (Some(flow_direction), Some(effectiveness), Some(output)) =
                    (&self.flow_direction, &self.effectiveness, &self.output)
                else {
                    bail!("--flow-direction, --effectiveness and --output are required without --config");
                };
                RunConfig {
                    output_destination: output.clone(),
                    flow_direction_source: GridSource::geotiff(flow_direction),
                    effectiveness_source: GridSource::geotiff(effectiveness),
                    trace: TraceSection::default(),
                }
            }
        };

        if let Some(path) = &self.flow_direction {
            config.flow_direction_source = GridSource::geotiff(path);
        }
        if let Some(path) = &self.effectiveness {
            config.effectiveness_source = GridSource::geotiff(path);
        }
        if let Some(path) = &self.output {
            config.output_destination = path.clone();
        }

        let trace = &mut config.trace;
        if self.sequential {
            trace.mode = ModeSetting::Sequential;
            trace.threads = None;
        }
        if let Some(threads) = self.threads {
            trace.mode = ModeSetting::Parallel;
            trace.threads = Some(threads);
        }
        if let Some(budget) = self.step_budget {
            trace.step_budget = budget;
        }
        trace.abort_on_divergence |= self.abort_on_divergence;
        if let Some(secs) = self.timeout_secs {
            trace.timeout_secs = Some(secs);
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"
output_destination = "out/unmitigated.tif"

[flow_direction_source]
path = "data/flowdir.tif"

[effectiveness_source]
rows = 3
cols = 3
lower_left = [0.0, 0.0]
cell_size = 10.0
values = [0.0, 0.5, 0.0,  0.0, 1.0, 0.0,  0.0, 0.0, 0.0]
nodata = -9999.0

[trace]
mode = "parallel"
threads = 4
step_budget = "cells"
abort_on_divergence = false
timeout_secs = 600
"#;

    const MINIMAL: &str = r#"
output_destination = "out.tif"
flow_direction_source = { path = "fd.tif" }
effectiveness_source = { path = "bmp.tif" }
"#;

    #[test]
    fn parses_full_example() {
        let config = RunConfig::parse(EXAMPLE).expect("parse");
        config.validate().expect("valid");

        assert_eq!(config.output_destination, PathBuf::from("out/unmitigated.tif"));
        assert_eq!(config.flow_direction_source, GridSource::geotiff("data/flowdir.tif"));
        match &config.effectiveness_source {
            GridSource::Inline(grid) => {
                assert_eq!((grid.rows, grid.cols), (3, 3));
                assert_eq!(grid.values[4], 1.0);
                assert_eq!(grid.nodata, Some(-9999.0));
            }
            other => panic!("expected inline grid, got {:?}", other),
        }
        assert_eq!(config.trace.threads, Some(4));
        assert_eq!(config.trace.timeout_secs, Some(600));

        let params = config.to_params();
        assert_eq!(params.mode, ProcessingMode::ParallelWith(4));
        assert_eq!(params.step_budget, StepBudget::Cells);
        assert!(params.cancel.deadline().is_some());
    }

    #[test]
    fn trace_table_is_optional() {
        let config = RunConfig::parse(MINIMAL).expect("parse");
        assert_eq!(config.trace, TraceSection::default());

        let params = config.to_params();
        assert_eq!(params.mode, ProcessingMode::Parallel);
        assert!(!params.abort_on_divergence);
        assert!(params.cancel.deadline().is_none());
    }

    #[test]
    fn step_budget_forms() {
        for (toml_value, expected) in [
            ("\"cells\"", StepBudget::Cells),
            ("{ perimeter_multiple = 4 }", StepBudget::PerimeterMultiple(4)),
            ("{ fixed = 1000 }", StepBudget::Fixed(1000)),
        ] {
            let doc = format!("{}\n[trace]\nstep_budget = {}\n", MINIMAL, toml_value);
            let config = RunConfig::parse(&doc).expect("parse");
            assert_eq!(config.to_params().step_budget, expected, "{}", toml_value);
        }
    }

    #[test]
    fn budget_from_command_line() {
        assert_eq!("cells".parse::<BudgetSetting>(), Ok(BudgetSetting::Cells));
        assert_eq!(
            "perimeter:3".parse::<BudgetSetting>(),
            Ok(BudgetSetting::PerimeterMultiple(3))
        );
        assert_eq!("fixed:50".parse::<BudgetSetting>(), Ok(BudgetSetting::Fixed(50)));
        assert!("fixed".parse::<BudgetSetting>().is_err());
        assert!("forever:1".parse::<BudgetSetting>().is_err());
        assert!("fixed:x".parse::<BudgetSetting>().is_err());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let doc = format!("{}\nout_path = \"x.tif\"\n", MINIMAL);
        assert!(RunConfig::parse(&doc).is_err());

        let doc = format!("{}\n[trace]\nworkers = 2\n", MINIMAL);
        assert!(RunConfig::parse(&doc).is_err());
    }

    #[test]
    fn validate_rejects_bad_inline_grids() {
        let mut config = RunConfig::parse(EXAMPLE).expect("parse");
        if let GridSource::Inline(grid) = &mut config.effectiveness_source {
            grid.values.pop();
        }
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("expected 9 values"), "{}", err);

        let mut config = RunConfig::parse(EXAMPLE).expect("parse");
        if let GridSource::Inline(grid) = &mut config.effectiveness_source {
            grid.cell_size = 0.0;
        }
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_trace_settings() {
        let base = RunConfig::parse(MINIMAL).expect("parse");
        let settings = [
            TraceSection {
                threads: Some(0),
                ..Default::default()
            },
            TraceSection {
                mode: ModeSetting::Sequential,
                threads: Some(2),
                ..Default::default()
            },
            TraceSection {
                step_budget: BudgetSetting::Fixed(0),
                ..Default::default()
            },
            TraceSection {
                timeout_secs: Some(0),
                ..Default::default()
            },
        ];
        for trace in settings {
            let config = RunConfig {
                trace: trace.clone(),
                ..base.clone()
            };
            assert!(config.validate().is_err(), "{:?}", trace);
        }
    }

    #[test]
    fn flags_without_config_file() {
        let args = RunArgs {
            flow_direction: Some("fd.tif".into()),
            effectiveness: Some("bmp.tif".into()),
            output: Some("out.tif".into()),
            sequential: true,
            step_budget: Some(BudgetSetting::PerimeterMultiple(2)),
            ..Default::default()
        };
        let config = args.resolve().expect("resolve");
        assert_eq!(config.effectiveness_source, GridSource::geotiff("bmp.tif"));
        assert_eq!(config.trace.mode, ModeSetting::Sequential);
        assert_eq!(config.to_params().step_budget, StepBudget::PerimeterMultiple(2));

        let missing_output = RunArgs {
            output: None,
            ..args
        };
        assert!(missing_output.resolve().is_err());
    }

    #[test]
    fn flags_override_config_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("run.toml");
        fs::write(&path, EXAMPLE).expect("write");

        let args = RunArgs {
            config: Some(path),
            output: Some("elsewhere.tif".into()),
            sequential: true,
            abort_on_divergence: true,
            timeout_secs: Some(5),
            ..Default::default()
        };
        let config = args.resolve().expect("resolve");

        assert_eq!(config.output_destination, PathBuf::from("elsewhere.tif"));
        assert_eq!(config.flow_direction_source, GridSource::geotiff("data/flowdir.tif"));
        assert_eq!(config.trace.mode, ModeSetting::Sequential);
        assert_eq!(config.trace.threads, None);
        assert!(config.trace.abort_on_divergence);
        assert_eq!(config.trace.timeout_secs, Some(5));
    }

    #[test]
    fn missing_config_file_is_reported() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = RunConfig::load(&temp.path().join("missing.toml")).unwrap_err();
        assert!(err.to_string().starts_with("read "), "{}", err);
    }
}

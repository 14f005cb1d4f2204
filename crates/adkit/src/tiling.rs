use std::path::PathBuf;

use adkit_vis::{discover_sample_names, plot_qualitative_results, CropWindow, TilingConfig};
use anyhow::{bail, Context, Result};

/// CLI arguments for the tile subcommand.
#[derive(Debug, Default)]
pub struct TileCliArgs {
    /// JSON tiling configuration; the flags below are ignored when set.
    pub config_path: Option<PathBuf>,
    pub root_dir: Option<PathBuf>,
    pub method_dirs: Vec<PathBuf>,
    /// Empty means every complete sample of the first method directory.
    pub image_names: Vec<String>,
    pub save_dir: Option<PathBuf>,
    pub save_name: Option<String>,
    pub border_ratio: f64,
    pub gap_ratio: Option<f64>,
    pub image_size: Option<u32>,
    pub crop_windows: Vec<CropWindow>,
    pub reverse: bool,
}

/// Parses `top,left,bottom,right`.
///
/// # Errors
///
/// Returns a message suitable for clap if the value is not four
/// comma-separated integers.
pub fn parse_crop_window(value: &str) -> Result<CropWindow, String> {
    let parts = value
        .split(',')
        .map(|part| part.trim().parse::<u32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| format!("invalid crop window '{value}': {err}"))?;
    match parts.as_slice() {
        &[top, left, bottom, right] => Ok(CropWindow::new(top, left, bottom, right)),
        _ => Err(format!(
            "crop window '{value}' needs four values: top,left,bottom,right"
        )),
    }
}

/// Turns CLI arguments into a tiling configuration, discovering sample
/// names when none are given.
///
/// # Errors
///
/// Returns an error if the configuration file cannot be loaded, no root or
/// method directory is given, or discovery finds no samples.
pub fn resolve_config(args: TileCliArgs) -> Result<TilingConfig> {
    let mut config = match &args.config_path {
        Some(path) => TilingConfig::load(path)
            .with_context(|| format!("failed to load tiling configuration from {}", path.display()))?,
        None => {
            let Some(root_dir) = args.root_dir else {
                bail!("either --config or --root is required");
            };
            let mut config = TilingConfig::new(root_dir, args.image_names, args.method_dirs);
            config.save_dir = args.save_dir;
            if let Some(name) = args.save_name {
                config.save_name = name;
            }
            config.border_ratio = args.border_ratio;
            if let Some(gap) = args.gap_ratio {
                config.gap_ratio = gap;
            }
            if let Some(size) = args.image_size {
                config.image_size = size;
            }
            config.crop_windows = args.crop_windows;
            config.reverse = args.reverse;
            config
        }
    };

    if config.image_names.is_empty() {
        let Some(first) = config.method_dirs.first() else {
            bail!("at least one method directory is required");
        };
        let dir = config.root_dir.join(first);
        config.image_names = discover_sample_names(&dir)
            .with_context(|| format!("failed to scan {}", dir.display()))?;
        tracing::info!(
            dir = %dir.display(),
            samples = config.image_names.len(),
            "discovered sample names"
        );
        if config.image_names.is_empty() {
            bail!("no complete image triplets found in {}", dir.display());
        }
    }
    Ok(config)
}

/// Resolves the configuration and renders the canvas.
///
/// # Errors
///
/// Returns an error if the configuration cannot be resolved or tiling
/// fails.
pub fn run_tiling(args: TileCliArgs) -> Result<PathBuf> {
    let config = resolve_config(args)?;
    plot_qualitative_results(&config).context("failed to render comparison canvas")
}

use std::path::PathBuf;

use adkit::{
    backend::{create_device, get_backend_name},
    loaders::{run_loaders, LoadersCliArgs},
    tiling::{parse_crop_window, run_tiling, TileCliArgs},
};
use adkit_vis::CropWindow;
use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "adkit")]
#[command(about = "Anomaly detection data loaders and qualitative result tiling")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Tile per-method anomaly maps into one comparison image
    Tile {
        /// JSON tiling configuration (overrides the other flags)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory containing the method directories
        #[arg(short, long)]
        root: Option<PathBuf>,

        /// Method directory relative to the root; repeat for each method
        #[arg(short, long = "method")]
        methods: Vec<PathBuf>,

        /// Sample name; repeat for each sample. Discovered when omitted
        #[arg(short, long = "name")]
        names: Vec<String>,

        /// Output directory
        #[arg(short = 'o', long)]
        save_dir: Option<PathBuf>,

        /// Output file name without extension
        #[arg(long)]
        save_name: Option<String>,

        /// Black frame width as a fraction of the tile size
        #[arg(long, default_value_t = 0.0)]
        border_ratio: f64,

        /// Gap between tiles as a fraction of the tile size
        #[arg(long)]
        gap_ratio: Option<f64>,

        /// Tile size in pixels
        #[arg(long)]
        image_size: Option<u32>,

        /// Crop window top,left,bottom,right; one per sample
        #[arg(long = "crop", value_parser = parse_crop_window)]
        crops: Vec<CropWindow>,

        /// One row per sample instead of one row per image role
        #[arg(long)]
        reverse: bool,
    },

    /// Build the loaders described by a data configuration and report them
    Loaders {
        /// Data configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Also build the subset loaders
        #[arg(long)]
        split: bool,

        /// Training batches to load as a smoke test
        #[arg(long, default_value_t = 0)]
        batches: usize,
    },

    /// Show backend information
    Info,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Tile {
            config,
            root,
            methods,
            names,
            save_dir,
            save_name,
            border_ratio,
            gap_ratio,
            image_size,
            crops,
            reverse,
        } => {
            let path = run_tiling(TileCliArgs {
                config_path: config,
                root_dir: root,
                method_dirs: methods,
                image_names: names,
                save_dir,
                save_name,
                border_ratio,
                gap_ratio,
                image_size,
                crop_windows: crops,
                reverse,
            })?;
            println!("{}", path.display());
            Ok(())
        }

        Commands::Loaders {
            config,
            split,
            batches,
        } => {
            let lines = run_loaders(&LoadersCliArgs {
                config_path: config,
                split,
                preview_batches: batches,
            })?;
            for line in lines {
                println!("{line}");
            }
            Ok(())
        }

        Commands::Info => {
            println!("adkit Information:");
            println!("  Backend: {}", get_backend_name());
            println!("  Device: {:?}", create_device());
            println!(
                "  Datasets: {}",
                adkit_data::DatasetRegistry::builtin().names().join(", ")
            );
            println!(
                "  Samplers: {}",
                adkit_data::SamplerKind::names().join(", ")
            );
            Ok(())
        }
    }
}

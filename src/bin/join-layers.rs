use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use join_layers::{Config, GenerateOpts};

#[derive(Parser, Debug)]
#[command(
    name = "join-layers",
    version,
    about = "Build generative image collections from trait layers"
)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a starter config file.
    Init(InitArgs),
    /// Generate images and metadata for the configured collection.
    Generate(GenerateArgs),
}

#[derive(Parser, Debug)]
struct InitArgs {
    /// Path of the config file to create.
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Overwrite the config file if it already exists.
    #[arg(long, default_value_t = false)]
    force: bool,
}

#[derive(Parser, Debug)]
struct GenerateArgs {
    /// Path to the config file.
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Folder holding one sub-folder per layer.
    #[arg(short, long, default_value = "layers")]
    layers: PathBuf,

    /// Output folder; `json/` and `images/` are created inside it.
    #[arg(short, long, default_value = "output")]
    output: PathBuf,

    /// Number of render workers. Defaults to the number of CPUs.
    #[arg(short = 'p', long)]
    concurrency: Option<usize>,

    /// Hide the live status line.
    #[arg(long, default_value_t = false)]
    quiet: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Init(args) => cmd_init(args),
        Command::Generate(args) => cmd_generate(args),
    }
}

fn cmd_init(args: InitArgs) -> anyhow::Result<()> {
    if args.config.exists() && !args.force {
        anyhow::bail!(
            "'{}' already exists (use --force to overwrite)",
            args.config.display()
        );
    }
    if let Some(parent) = args.config.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create config dir '{}'", parent.display()))?;
    }
    Config::template().save(&args.config)?;
    eprintln!("wrote {}", args.config.display());
    Ok(())
}

fn cmd_generate(args: GenerateArgs) -> anyhow::Result<()> {
    let config = Config::load(&args.config)?;
    let defaults = GenerateOpts::default();
    let opts = GenerateOpts {
        layers_dir: args.layers,
        output_dir: args.output,
        workers: args.concurrency.unwrap_or(defaults.workers),
        show_progress: !args.quiet,
        ..defaults
    };
    let report = join_layers::generate(&config, &opts)?;
    tracing::debug!(?report, "done");
    Ok(())
}

mod commands;
mod config;
mod error;
mod naming;
mod records;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

use config::{ConfigFile, MalformedPolicy, SplitOverrides};

#[derive(Parser)]
#[command(name = "gsplit")]
#[command(about = "Split a delimited text file into one file per value of a key column")]
#[command(version)]
struct Cli {
    /// Config file (default: ./gsplit.toml, then ~/.config/groupsplit/config.toml)
    #[arg(long = "config", global = true)]
    config: Option<PathBuf>,

    /// More log output on stderr (-v info, -vv debug)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress the summary on stdout
    #[arg(short = 'q', long = "quiet", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Default)]
struct InputArgs {
    /// Input file
    input: Option<PathBuf>,

    /// Column whose value selects the output file [default: vehicle]
    #[arg(short, long)]
    column: Option<String>,

    /// Field delimiter, a single character or 'tab' [default: ;]
    #[arg(short, long)]
    delimiter: Option<String>,

    /// Extension of the output files [default: csv]
    #[arg(short, long)]
    extension: Option<String>,

    /// Rows with the wrong field count: 'fail' or 'skip' [default: fail]
    #[arg(long = "on-malformed")]
    on_malformed: Option<MalformedPolicy>,
}

impl InputArgs {
    fn into_overrides(self, output_dir: Option<PathBuf>) -> SplitOverrides {
        SplitOverrides {
            input: self.input,
            output_dir,
            column: self.column,
            delimiter: self.delimiter,
            extension: self.extension,
            on_malformed: self.on_malformed,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Write one file per group key into the output directory
    Split {
        #[command(flatten)]
        args: InputArgs,

        /// Output directory (created if missing)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// List the groups and their planned file names without writing
    Groups {
        #[command(flatten)]
        args: InputArgs,

        /// Print the listing as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the resolved settings and config search paths
    Config {
        #[command(flatten)]
        args: InputArgs,

        /// Output directory
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let (file_config, config_path) = ConfigFile::discover(cli.config.as_deref())?;
    if let Some(path) = &config_path {
        tracing::info!(path = %path.display(), "using config file");
    }

    match cli.command {
        Command::Split { args, output_dir } => {
            let settings = file_config
                .split
                .merge(args.into_overrides(output_dir))
                .resolve(true)?;

            let summary = commands::run(&settings)?;
            if !cli.quiet {
                commands::print_run_summary(&summary, &settings.output_dir);
                println!("Splitting finished.");
            }
        }
        Command::Groups { args, json } => {
            let settings = file_config
                .split
                .merge(args.into_overrides(None))
                .resolve(false)?;

            let table = records::load(&settings)?;
            if json {
                let summaries = commands::summarize_groups(&table, &settings.extension);
                let out = serde_json::to_string_pretty(&summaries)
                    .context("failed to serialize group listing")?;
                println!("{}", out);
            } else if !cli.quiet {
                commands::group_listing(&table, &settings);
            }
        }
        Command::Config { args, output_dir } => {
            show_config(file_config, config_path, args.into_overrides(output_dir))?;
        }
    }

    Ok(())
}

/// Print the effective settings as a config file would spell them
fn show_config(
    file_config: ConfigFile,
    config_path: Option<PathBuf>,
    cli: SplitOverrides,
) -> Result<()> {
    let rendered = ConfigFile::effective(file_config.split.merge(cli))?;

    match &config_path {
        Some(path) => println!("# loaded from {}", path.display()),
        None => println!("# no config file found"),
    }
    print!(
        "{}",
        toml::to_string_pretty(&rendered).context("failed to render config")?
    );

    println!("\n# search paths:");
    for path in config::search_paths() {
        println!("#   {}", path.display());
    }
    Ok(())
}

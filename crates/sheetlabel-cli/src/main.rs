//! sheetlabel CLI - write a spreadsheet and stamp a sensitivity label on it

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use sheetlabel::{sample, Config, Workflow};
use sheetlabel_mip::{metadata, AssignmentMethod, GraphClient};
use sheetlabel_table::XlsxTableWriter;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "sheetlabel.toml";

#[derive(Parser)]
#[command(name = "sheetlabel")]
#[command(
    author,
    version,
    about = "Write a spreadsheet and apply a sensitivity label to it"
)]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, env = "SHEETLABEL_CONFIG", default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// More logging (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the employee spreadsheet and label it
    Run {
        /// Label id to apply
        #[arg(short, long, env = "SHEETLABEL_LABEL_ID")]
        label: Option<String>,

        /// User the label is applied for
        #[arg(short, long, env = "SHEETLABEL_USER")]
        user: Option<String>,

        /// Directory to write the spreadsheet to
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Spreadsheet file name
        #[arg(short, long)]
        file_name: Option<String>,

        /// How the label is assigned
        #[arg(short, long, value_enum)]
        method: Option<Method>,

        /// Reason for lowering an existing label
        #[arg(short, long)]
        justification: Option<String>,
    },

    /// Show the sensitivity label stamped on a spreadsheet
    Inspect {
        /// Spreadsheet file
        input: PathBuf,
    },

    /// List the labels available to the configured user
    Labels,

    /// Print a default configuration file
    InitConfig,
}

#[derive(Clone, Copy, ValueEnum)]
enum Method {
    Standard,
    Privileged,
    Auto,
}

impl From<Method> for AssignmentMethod {
    fn from(method: Method) -> Self {
        match method {
            Method::Standard => AssignmentMethod::Standard,
            Method::Privileged => AssignmentMethod::Privileged,
            Method::Auto => AssignmentMethod::Auto,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::InitConfig = cli.command {
        return init_config();
    }

    let mut config = load_config(&cli.config)?;
    init_logging(cli.verbose, &config.profile.log_level);

    match cli.command {
        Commands::Run {
            label,
            user,
            output_dir,
            file_name,
            method,
            justification,
        } => {
            if let Some(label) = label {
                config.label.id = label;
            }
            if let Some(user) = user {
                config.user.identity = user;
            }
            if let Some(dir) = output_dir {
                config.output.directory = dir;
            }
            if let Some(name) = file_name {
                config.output.file_name = name;
            }
            if let Some(method) = method {
                config.label.method = method.into();
            }
            if justification.is_some() {
                config.label.justification = justification;
            }
            run(config)
        }
        Commands::Inspect { input } => inspect(&input),
        Commands::Labels => list_labels(config),
        Commands::InitConfig => init_config(),
    }
}

/// Read the config file, then apply environment overrides. A missing
/// default file means "all defaults".
fn load_config(path: &Path) -> Result<Config> {
    let mut config = if path.exists() {
        Config::load(path).with_context(|| format!("Failed to load '{}'", path.display()))?
    } else if path == Path::new(DEFAULT_CONFIG) {
        Config::default()
    } else {
        bail!("Config file '{}' not found", path.display());
    };
    config.apply_env();
    Ok(config)
}

fn init_logging(verbose: u8, default_level: &str) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run(config: Config) -> Result<()> {
    config.validate().context("Incomplete configuration")?;

    let mut client = GraphClient::new(config.endpoints.to_graph_endpoints())
        .context("Failed to create HTTP client")?;
    let workflow = Workflow::new(config);
    let table = sample::employees().context("Failed to build the employee table")?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let report = workflow
        .run(&table, &XlsxTableWriter::default(), &mut client, &mut out)
        .context("Labeling run failed")?;

    if !report.changed {
        eprintln!("Note: the file already carried this label");
    }
    tracing::debug!(method = %report.assignment_method, "run complete");
    Ok(())
}

fn inspect(input: &Path) -> Result<()> {
    let label = metadata::read_label(input)
        .with_context(|| format!("Failed to read '{}'", input.display()))?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "File: {}", input.display())?;

    let Some(label) = label else {
        writeln!(out, "No sensitivity label")?;
        return Ok(());
    };

    writeln!(out, "Label: {} ({})", label.name, label.label_id)?;
    writeln!(out, "Enabled: {}", label.enabled)?;
    if let Some(method) = &label.method {
        writeln!(out, "Method: {}", method)?;
    }
    if let Some(date) = &label.set_date {
        writeln!(out, "Set: {}", date)?;
    }
    if let Some(site) = &label.site_id {
        writeln!(out, "Tenant: {}", site)?;
    }
    if let Some(action) = &label.action_id {
        writeln!(out, "Action: {}", action)?;
    }
    Ok(())
}

fn list_labels(config: Config) -> Result<()> {
    config
        .validate_credentials()
        .context("Incomplete configuration")?;

    let mut client = GraphClient::new(config.endpoints.to_graph_endpoints())
        .context("Failed to create HTTP client")?;
    let workflow = Workflow::new(config);
    let labels = workflow
        .catalog(&mut client)
        .context("Failed to fetch labels")?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for label in &labels {
        let indent = if label.parent_id().is_some() { "  " } else { "" };
        let marker = if label.is_appliable { "" } else { " (container)" };
        writeln!(
            out,
            "{}{}\t{}\t{}{}",
            indent, label.id, label.sensitivity, label.name, marker
        )?;
    }
    if labels.is_empty() {
        eprintln!("No labels published for this user");
    }
    Ok(())
}

fn init_config() -> Result<()> {
    let text = Config::default()
        .to_toml()
        .context("Failed to render default configuration")?;
    print!("{}", text);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_flags() {
        let cli = Cli::try_parse_from([
            "sheetlabel",
            "-v",
            "run",
            "--label",
            "L2",
            "--method",
            "privileged",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Run { label, method, .. } => {
                assert_eq!(label.as_deref(), Some("L2"));
                assert!(matches!(method, Some(Method::Privileged)));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_missing_explicit_config_is_an_error() {
        let dir = std::env::temp_dir().join("sheetlabel-cli-no-such-dir");
        assert!(load_config(&dir.join("custom.toml")).is_err());
    }
}

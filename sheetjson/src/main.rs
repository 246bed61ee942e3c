use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use sheetjson_core::{Converter, ConverterConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod formatter;

#[derive(Parser)]
#[command(name = "sheetjson")]
#[command(about = "Convert Excel workbooks into linked JSON collections", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the Excel file to convert
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// 1-based sheet numbers to convert (default: all sheets)
    #[arg(short, long, value_name = "N", value_delimiter = ',')]
    sheets: Vec<usize>,

    /// Path to configuration file (TOML)
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Directory to write one <collection>.json per collection
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Indent JSON output
    #[arg(long)]
    pretty: bool,

    /// Log debug details to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// JSON document with collections and unresolved records
    Json,
    /// Human-readable colored summary
    Human,
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // Load configuration
    let mut config = if let Some(config_path) = &cli.config {
        ConverterConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?
    } else {
        // Try to load default config from current directory if it exists
        ConverterConfig::discover(".").context("Failed to load sheetjson.toml")?
    };
    if !cli.sheets.is_empty() {
        config.sheets = cli.sheets.clone();
    }

    // Validate configuration
    config.validate().context("Invalid configuration")?;

    // Create converter and run
    let converter = Converter::with_config(config);

    let conversion = converter
        .convert_file(&cli.file)
        .with_context(|| format!("Failed to convert file: {}", cli.file.display()))?;

    if let Some(dir) = &cli.output {
        formatter::write_collections(dir, &conversion, cli.pretty)?;
    }

    // Output results
    match cli.format {
        OutputFormat::Human => {
            formatter::print_human(&cli.file, &conversion);
        }
        OutputFormat::Json => {
            formatter::print_json(&conversion, cli.pretty)?;
        }
    }

    // Exit with appropriate code
    let exit_code = if conversion.is_clean() { 0 } else { 1 };

    std::process::exit(exit_code);
}

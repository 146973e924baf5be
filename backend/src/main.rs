//! Chartdata CLI - run chart data pipelines from the command line
//!
//! # Main Commands
//!
//! ```bash
//! chartdata run chart.json                  # Run a chart spec, print rows as JSON
//! chartdata run chart.json --format csv     # ... or as CSV
//! chartdata serve                           # Start HTTP server (port 3000)
//! ```
//!
//! # Debug Commands
//!
//! ```bash
//! chartdata parse data.csv                  # Raw CSV rows as JSON
//! chartdata infer data.csv                  # Inferred field types
//! ```

use chartdata::config::Config;
use chartdata::loader::decode_json_rows;
use chartdata::models::format_datetime;
use chartdata::{
    decode_bytes_auto, infer_types, load_chart_data, parse_csv, ChartData, ChartSpec, FieldValue, LoadOptions,
    SourceMode, ValueRef, Variables,
};
use clap::{Parser, Subcommand, ValueEnum};
use reqwest::Url;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "chartdata")]
#[command(about = "Load, type and transform chart data from CSV/JSON resources", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a chart specification and output the resulting rows
    Run {
        /// Chart specification (JSON)
        chart: PathBuf,

        /// Base URL for relative resource URLs (default: the chart file's directory)
        #[arg(long)]
        base_url: Option<String>,

        /// Variable override as name=<json value>, e.g. min='{"number": 3}'
        #[arg(long = "var", value_name = "NAME=JSON")]
        vars: Vec<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "json")]
        format: OutputFormat,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Parse a CSV file and output raw rows as JSON
    Parse {
        /// Input CSV file
        input: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Infer field types of a CSV or JSON file
    Infer {
        /// Input file
        input: PathBuf,

        /// Read the input as a JSON array of rows (default for .json files)
        #[arg(long)]
        json: bool,
    },

    /// Start HTTP server
    Serve {
        /// Port to listen on (default: CHARTDATA_PORT or 3000)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Csv,
}

#[tokio::main]
async fn main() {
    let result = match Config::from_env() {
        Ok(config) => dispatch(Cli::parse().command, config).await,
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

async fn dispatch(command: Commands, config: Config) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Run {
            chart,
            base_url,
            vars,
            format,
            output,
        } => cmd_run(&chart, base_url.as_deref(), &vars, format, output.as_deref(), &config).await,

        Commands::Parse { input, output } => cmd_parse(&input, output.as_deref()),

        Commands::Infer { input, json } => cmd_infer(&input, json),

        Commands::Serve { port } => cmd_serve(port, config).await,
    }
}

async fn cmd_run(
    chart_path: &Path,
    base_url: Option<&str>,
    vars: &[String],
    format: OutputFormat,
    output: Option<&Path>,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Chart: {}", chart_path.display());

    let spec = ChartSpec::from_json(&fs::read_to_string(chart_path)?)?;

    let base_url = match base_url {
        Some(raw) => Url::parse(raw)?,
        None => match &config.base_url {
            Some(url) => url.clone(),
            None => chart_directory_url(chart_path)?,
        },
    };
    eprintln!("   Base URL: {}", base_url);

    let options = LoadOptions::default()
        .with_base_url(base_url)
        .with_variables(parse_vars(vars)?)
        .with_fetcher(Arc::new(config.fetcher()?));

    let chart = load_chart_data(&spec, options).await?;

    let content = match format {
        OutputFormat::Json => serde_json::to_string_pretty(&chart)?,
        OutputFormat::Csv => to_csv(&chart)?,
    };
    write_output(&content, output)?;

    eprintln!("✨ Done!");
    Ok(())
}

/// `file://` URL of the directory holding the chart file.
fn chart_directory_url(chart_path: &Path) -> Result<Url, Box<dyn std::error::Error>> {
    let absolute = fs::canonicalize(chart_path)?;
    let dir = absolute.parent().unwrap_or(&absolute);
    Url::from_directory_path(dir).map_err(|_| format!("Cannot build a URL for {}", dir.display()).into())
}

/// Parse `name=<json>` pairs into variables.
fn parse_vars(vars: &[String]) -> Result<Variables, Box<dyn std::error::Error>> {
    let mut parsed = Variables::new();
    for var in vars {
        let (name, json) = var
            .split_once('=')
            .ok_or_else(|| format!("Invalid --var '{}': expected NAME=JSON", var))?;
        let value: ValueRef =
            serde_json::from_str(json).map_err(|e| format!("Invalid value for variable '{}': {}", name, e))?;
        parsed.insert(name.trim().to_string(), value);
    }
    Ok(parsed)
}

/// Render rows as CSV with one column per typed field.
fn to_csv(chart: &ChartData) -> Result<String, Box<dyn std::error::Error>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(chart.types.keys())?;

    for row in &chart.data {
        writer.write_record(chart.types.keys().map(|field| csv_cell(row.get(field))))?;
    }

    writer.flush()?;
    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    Ok(String::from_utf8(bytes)?)
}

fn csv_cell(value: Option<&FieldValue>) -> String {
    match value {
        None | Some(FieldValue::Null) => String::new(),
        Some(FieldValue::String(s)) => s.clone(),
        Some(FieldValue::Datetime(d)) => format_datetime(d),
        Some(number) => serde_json::to_string(number).unwrap_or_default(),
    }
}

fn cmd_parse(input: &Path, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Parsing CSV: {}", input.display());

    let text = decode_bytes_auto(&fs::read(input)?);
    let rows = parse_csv(&text);
    eprintln!("✅ Parsed {} rows", rows.len());

    let json = serde_json::to_string_pretty(&rows)?;
    write_output(&json, output)?;

    Ok(())
}

fn cmd_infer(input: &Path, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("🔎 Inferring types: {}", input.display());

    let text = decode_bytes_auto(&fs::read(input)?);
    let is_json = json || input.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let (rows, mode) = if is_json {
        (decode_json_rows(&input.display().to_string(), &text)?, SourceMode::Json)
    } else {
        (parse_csv(&text), SourceMode::Csv)
    };
    eprintln!("   {} rows", rows.len());

    let types = infer_types(&rows, mode);
    println!("{}", serde_json::to_string_pretty(&types)?);
    Ok(())
}

async fn cmd_serve(port: Option<u16>, mut config: Config) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(port) = port {
        config.port = port;
    }
    chartdata::server::start_server(config).await
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Ingest quiz exports into SQLite and report on student performance",
    long_about = None
)]
pub struct Cli {
    /// SQLite database file (overrides the config file)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,
    /// YAML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Clean and normalize quiz exports, storing raw, cleaned, and formatted snapshots
    Ingest(IngestArgs),
    /// List the tables stored in the database
    Tables,
    /// Print a stored table
    Show(ShowArgs),
    /// Write a stored table back out as CSV
    Export(ExportArgs),
    /// Compare one student's per-question scores with the class average
    Analyse(AnalyseArgs),
    /// Flag students whose summative score falls below a threshold
    Report(ReportArgs),
    /// Find every stored row for one student
    Lookup(LookupArgs),
}

#[derive(Debug, Args)]
pub struct IngestArgs {
    /// Input CSV/TSV files (`-` reads stdin)
    #[arg(short = 'i', long = "input", required = true, num_args = 1..)]
    pub inputs: Vec<PathBuf>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input files (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    /// Stored table name
    pub table: String,
    /// Maximum number of rows to print
    #[arg(long, default_value_t = 20)]
    pub rows: usize,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Stored table name
    pub table: String,
    /// Output file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Output delimiter (defaults to ',' or tab for .tsv outputs)
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding for the output (defaults to utf-8)
    #[arg(long = "output-encoding")]
    pub output_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct AnalyseArgs {
    /// Student identifier
    pub identity: String,
    /// Table to analyse (defaults to the most recent formatted table)
    #[arg(long)]
    pub table: Option<String>,
    /// Write chart descriptions as JSON to this file
    #[arg(long)]
    pub chart: Option<PathBuf>,
    /// Print the report as JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ReportArgs {
    /// Summative table (detected by keyword when omitted)
    #[arg(long)]
    pub summative: Option<String>,
    /// Percentage below which a summative score is flagged
    #[arg(long)]
    pub threshold: Option<f64>,
    /// Print flagged students only
    #[arg(long = "only-flagged")]
    pub only_flagged: bool,
    /// Write chart descriptions as JSON to this file
    #[arg(long)]
    pub chart: Option<PathBuf>,
    /// Print the report as JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct LookupArgs {
    /// Student identifier
    pub identity: String,
    /// Write a chart description as JSON to this file
    #[arg(long)]
    pub chart: Option<PathBuf>,
    /// Print the matches as JSON instead of tables
    #[arg(long)]
    pub json: bool,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" | "\\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "pipe" | "|" => Ok(b'|'),
        "semicolon" | ";" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

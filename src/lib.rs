pub mod chart;
pub mod classify;
pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod io_utils;
pub mod lookup;
pub mod normalize;
pub mod performance;
pub mod pipeline;
pub mod store;
pub mod table;
pub mod underperformance;

use std::{env, path::Path, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug, info};

use crate::{
    chart::ChartSpec,
    cli::{Cli, Commands},
    config::LedgerConfig,
    io_utils::CsvReadOptions,
    lookup::StudentLookup,
    performance::{PerformanceAnalyzer, PerformanceReport},
    pipeline::IngestionPipeline,
    store::TableStore,
    table::TextTable,
    underperformance::{UnderperformanceReport, UnderperformanceReporter},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("quiz_ledger", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let config = LedgerConfig::resolve(cli.config.as_deref(), cli.db.as_deref())
        .context("Loading configuration")?;
    debug!("Using database {:?}", config.database);
    match cli.command {
        Commands::Ingest(args) => handle_ingest(&config, &args),
        Commands::Tables => handle_tables(&config),
        Commands::Show(args) => handle_show(&config, &args),
        Commands::Export(args) => handle_export(&config, &args),
        Commands::Analyse(args) => handle_analyse(&config, &args),
        Commands::Report(args) => handle_report(&config, &args),
        Commands::Lookup(args) => handle_lookup(&config, &args),
    }
}

fn open_store(config: &LedgerConfig) -> Result<TableStore> {
    TableStore::open_existing(&config.database)
        .with_context(|| format!("Opening database {:?}", config.database))
}

fn handle_ingest(config: &LedgerConfig, args: &cli::IngestArgs) -> Result<()> {
    let store = TableStore::open(&config.database)
        .with_context(|| format!("Opening database {:?}", config.database))?;
    let options = CsvReadOptions {
        delimiter: args.delimiter,
        encoding: args.input_encoding.clone(),
    };
    for input in &args.inputs {
        let run_id = store.next_run_id()?;
        info!(
            "Ingesting {:?} as run {run_id} with delimiter '{}'",
            input,
            printable_delimiter(io_utils::resolve_input_delimiter(input, args.delimiter))
        );
        let mut pipeline = IngestionPipeline::starting_at(run_id);
        let written = pipeline
            .convert(input, &options, &store)
            .with_context(|| format!("Ingesting {input:?}"))?;
        for name in written {
            println!("{name}");
        }
    }
    Ok(())
}

fn handle_tables(config: &LedgerConfig) -> Result<()> {
    let store = open_store(config)?;
    let tables = store.list_tables().context("Listing tables")?;
    if tables.is_empty() {
        info!("No tables stored in {:?}", config.database);
    }
    for name in tables {
        println!("{name}");
    }
    Ok(())
}

fn handle_show(config: &LedgerConfig, args: &cli::ShowArgs) -> Result<()> {
    let store = open_store(config)?;
    let table = store
        .load_table(&args.table)
        .with_context(|| format!("Loading table '{}'", args.table))?;
    print!("{}", table::render_data_table(&table, Some(args.rows)));
    Ok(())
}

fn handle_export(config: &LedgerConfig, args: &cli::ExportArgs) -> Result<()> {
    let store = open_store(config)?;
    let table = store
        .load_table(&args.table)
        .with_context(|| format!("Loading table '{}'", args.table))?;
    let delimiter = io_utils::resolve_output_delimiter(args.output.as_deref(), args.delimiter);
    let encoding = io_utils::resolve_encoding(args.output_encoding.as_deref())?;
    io_utils::write_table(&table, args.output.as_deref(), delimiter, encoding)
        .with_context(|| format!("Exporting table '{}'", args.table))?;
    if let Some(path) = &args.output {
        info!("Exported {} row(s) to {:?}", table.row_count(), path);
    }
    Ok(())
}

fn handle_analyse(config: &LedgerConfig, args: &cli::AnalyseArgs) -> Result<()> {
    let store = open_store(config)?;
    let report = PerformanceAnalyzer::new(&store)
        .analyse(&args.identity, args.table.as_deref())
        .with_context(|| format!("Analysing '{}'", args.identity))?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "Student {} in {} (identity column '{}')",
            report.identity, report.table, report.identity_column
        );
        table::print_table(&PerformanceReport::headers(), &report.render_rows());
    }
    if let Some(path) = &args.chart {
        save_charts(path, &chart::performance_charts(&report))?;
    }
    Ok(())
}

fn handle_report(config: &LedgerConfig, args: &cli::ReportArgs) -> Result<()> {
    let store = open_store(config)?;
    let threshold = args.threshold.unwrap_or(config.threshold);
    let report = UnderperformanceReporter::new(&store)
        .with_keywords(config.summative_keywords.clone())
        .build_report(args.summative.as_deref(), threshold)
        .context("Building underperformance report")?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "Summative table: {} (threshold < {})",
            report.summative_table, report.threshold
        );
        table::print_table(
            &UnderperformanceReport::headers(),
            &report.render_rows(args.only_flagged),
        );
    }
    if let Some(path) = &args.chart {
        let charts = chart::underperformer_charts(&report);
        if charts.is_empty() {
            info!("No underperforming students; no chart written");
        } else {
            save_charts(path, &charts)?;
        }
    }
    Ok(())
}

fn handle_lookup(config: &LedgerConfig, args: &cli::LookupArgs) -> Result<()> {
    let store = open_store(config)?;
    let report = StudentLookup::new(&store)
        .find(&args.identity)
        .with_context(|| format!("Looking up '{}'", args.identity))?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for name in report.tables() {
            let matches = report
                .matches
                .iter()
                .filter(|m| m.table == name)
                .collect::<Vec<_>>();
            let mut rendered = TextTable::new(matches[0].columns.clone());
            for m in &matches {
                rendered.push_row(m.row.iter().map(data::Value::as_display).collect());
            }
            println!("== {name} ({} row(s))", rendered.row_count());
            print!("{}", rendered.render());
        }
    }
    if let Some(path) = &args.chart {
        match chart::lookup_chart(&report) {
            Some(spec) => save_charts(path, &[spec])?,
            None => info!("No score columns matched; no chart written"),
        }
    }
    Ok(())
}

fn save_charts(path: &Path, charts: &[ChartSpec]) -> Result<()> {
    chart::write_charts(path, charts).with_context(|| format!("Writing charts to {path:?}"))?;
    info!("Wrote {} chart(s) to {:?}", charts.len(), path);
    Ok(())
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        other => (other as char).to_string(),
    }
}

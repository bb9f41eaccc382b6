pub mod apply;
pub mod classify;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod dates;
pub mod error;
pub mod io_utils;
pub mod pipeline;
pub mod reader;
pub mod schema;
pub mod table;
pub mod yaml_provider;

use std::{env, path::Path, sync::OnceLock};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{LevelFilter, debug, info, warn};

use crate::{
    cli::{Cli, Commands, SourceArgs},
    config::IngestConfig,
    dataset::Dataset,
    pipeline::{DatasetLoader, LoadedDataset, SidecarState},
    reader::{ReadOptions, SheetSelector, SourceFormat},
    schema::{SchemaStore, SidecarFileStore, sidecar_path},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("dataset_ingest", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Load(args) => handle_load(&args),
        Commands::Dates(args) => handle_dates(&args),
        Commands::SetType(args) => handle_set_type(&args),
        Commands::Standardize(args) => handle_standardize(&args),
        Commands::Rename(args) => handle_rename(&args),
        Commands::Sidecar(args) => handle_sidecar(&args),
    }
}

fn load_config(source: &SourceArgs) -> Result<IngestConfig> {
    match &source.config {
        Some(path) => IngestConfig::load(path),
        None => Ok(IngestConfig::default()),
    }
}

fn read_options(source: &SourceArgs, row_limit: Option<usize>) -> ReadOptions {
    ReadOptions {
        encoding: source.input_encoding.clone(),
        sheet: source.sheet.as_deref().map(SheetSelector::parse),
        row_limit,
    }
}

fn load_dataset(
    loader: &DatasetLoader,
    source: &SourceArgs,
    row_limit: Option<usize>,
) -> Result<LoadedDataset> {
    let loaded = loader
        .load(&source.input, &read_options(source, row_limit))
        .with_context(|| format!("Loading dataset from {:?}", source.input))?;
    debug!("Read {:?} as {}", source.input, loaded.source);
    Ok(loaded)
}

fn handle_load(args: &cli::LoadArgs) -> Result<()> {
    let mut config = load_config(&args.source)?;
    if let Some(sample_rows) = args.sample_rows {
        config.sample_rows = if sample_rows == 0 {
            usize::MAX
        } else {
            sample_rows
        };
    }
    if let Some(threshold) = args.date_threshold {
        config.date_threshold = threshold;
    }
    config.validate()?;
    debug!("Ingest configuration: {config:?}");

    let loader = DatasetLoader::new(config);
    let loaded = load_dataset(&loader, &args.source, args.rows)?;
    report_sidecar_state(&loaded);
    for failure in &loaded.apply_report.failures {
        warn!("{failure}");
    }
    for (column, dropped) in &loaded.apply_report.out_of_order_values {
        warn!("{dropped} value(s) in '{column}' are outside its level order and are now missing");
    }
    print!("{}", render_types(&loaded));
    if args.preview > 0 {
        println!();
        print!("{}", table::render_preview(&loaded.dataset, args.preview));
    }
    for column in &loaded.ambiguous_dates {
        let names = loaded
            .dates
            .get(column)
            .map(|decision| {
                decision
                    .candidates
                    .iter()
                    .take(3)
                    .map(|c| c.display_name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default();
        println!(
            "\nAmbiguous date column '{column}' ({names}); confirm with `standardize --original`"
        );
    }

    if let Some(output) = &args.output {
        write_dataset(&loaded.dataset, output, io_utils::DEFAULT_CSV_DELIMITER)
            .with_context(|| format!("Writing typed table to {output:?}"))?;
        info!("Typed table written to {output:?}");
    }
    Ok(())
}

fn render_types(loaded: &LoadedDataset) -> String {
    let headers = ["column", "type", "storage", "details"]
        .iter()
        .map(|h| h.to_string())
        .collect::<Vec<_>>();
    let rows = loaded
        .dataset
        .columns()
        .iter()
        .map(|column| {
            let semantic_type = loaded
                .types
                .get(&column.name)
                .map(|t| t.to_string())
                .unwrap_or_else(|| "-".to_string());
            let details = match loaded.orders.get(&column.name) {
                Some(order) => order.join(" < "),
                None => loaded
                    .dates
                    .get(&column.name)
                    .filter(|decision| decision.is_date)
                    .and_then(|decision| decision.best())
                    .map(|best| best.display_name.clone())
                    .unwrap_or_default(),
            };
            vec![
                column.name.clone(),
                semantic_type,
                column.data.kind().to_string(),
                details,
            ]
        })
        .collect::<Vec<_>>();
    table::render_table(&headers, &rows)
}

fn report_sidecar_state(loaded: &LoadedDataset) {
    let path = sidecar_path(&loaded.path);
    match loaded.sidecar_state {
        SidecarState::Seeded => info!("Schema sidecar created at {path:?}"),
        SidecarState::Present => info!("Schema sidecar {path:?} applied"),
        SidecarState::Unavailable => {
            warn!("Schema sidecar {path:?} unavailable; using inferred types only")
        }
    }
}

fn handle_dates(args: &cli::DatesArgs) -> Result<()> {
    let mut config = load_config(&args.source)?;
    if let Some(sample) = args.sample {
        config.date_sample_size = sample;
    }
    config.validate()?;
    let outcome = reader::read_dataset(&args.source.input, &read_options(&args.source, None))
        .with_context(|| format!("Reading {:?}", args.source.input))?;
    let column = outcome.dataset.require_column(&args.column)?;
    let decision = dates::detect_column(&column.data.to_values(), &config.date_detection());

    if decision.candidates.is_empty() {
        println!("No date format matches column '{}'", args.column);
        return Ok(());
    }
    let headers = ["format", "pattern", "matches", "percent", "examples"]
        .iter()
        .map(|h| h.to_string())
        .collect::<Vec<_>>();
    let rows = decision
        .candidates
        .iter()
        .map(|candidate| {
            vec![
                candidate.display_name.clone(),
                candidate.pattern.clone(),
                candidate.match_count.to_string(),
                format!("{:.1}", candidate.match_percentage),
                candidate.sample_values.join(" | "),
            ]
        })
        .collect::<Vec<_>>();
    print!("{}", table::render_table(&headers, &rows));
    let verdict = match (decision.is_date, decision.ambiguous) {
        (true, true) => "date column (ambiguous format)",
        (true, false) => "date column",
        (false, _) => "not a date column",
    };
    println!("\n'{}': {verdict}", args.column);
    Ok(())
}

fn handle_set_type(args: &cli::SetTypeArgs) -> Result<()> {
    let outcome = reader::read_dataset(&args.source.input, &read_options(&args.source, None))
        .with_context(|| format!("Reading {:?}", args.source.input))?;
    outcome.dataset.require_column(&args.column)?;
    let loader = DatasetLoader::new(load_config(&args.source)?);
    let sidecar = loader
        .set_column_type(
            &args.source.input,
            &args.column,
            args.semantic_type,
            args.order_levels(),
        )
        .with_context(|| format!("Updating schema sidecar for {:?}", args.source.input))?;
    match sidecar.types.get(&args.column) {
        Some(semantic_type) => println!("'{}' is now {semantic_type}", args.column),
        None => println!("'{}' is inferred automatically", args.column),
    }
    Ok(())
}

fn handle_standardize(args: &cli::StandardizeArgs) -> Result<()> {
    let loader = DatasetLoader::new(load_config(&args.source)?);
    let mut loaded = load_dataset(&loader, &args.source, None)?;
    let failed = loader
        .standardize_dates(
            &mut loaded,
            &args.column,
            &args.target,
            args.original.as_deref(),
        )
        .with_context(|| format!("Standardizing column '{}'", args.column))?;
    let converted = loaded.dataset.row_count();
    println!(
        "Standardized '{}' ({} row(s), {failed} unreadable)",
        args.column, converted
    );
    Ok(())
}

fn handle_rename(args: &cli::RenameArgs) -> Result<()> {
    let loader = DatasetLoader::new(load_config(&args.source)?);
    let mut loaded = load_dataset(&loader, &args.source, None)?;
    let SourceFormat::Delimited {
        encoding,
        delimiter,
        ..
    } = loaded.source
    else {
        bail!(
            "Renaming rewrites the file in place and is only supported for delimited text, not {}",
            loaded.source
        );
    };

    let mut raw = reader::read_dataset(
        &args.source.input,
        &ReadOptions {
            encoding: Some(encoding.to_string()),
            ..read_options(&args.source, None)
        },
    )
    .with_context(|| format!("Re-reading {:?}", args.source.input))?
    .dataset;
    raw.rename_column(&args.from, &args.to)?;
    warn!(
        "Rewriting {:?} in place; missing tokens become empty fields and title lines are dropped",
        args.source.input
    );
    write_dataset(&raw, &args.source.input, delimiter)
        .with_context(|| format!("Rewriting {:?}", args.source.input))?;

    loader.rename_column(&mut loaded, &args.from, &args.to)?;
    println!("Renamed '{}' to '{}'", args.from, args.to);
    Ok(())
}

fn handle_sidecar(args: &cli::SidecarArgs) -> Result<()> {
    let store = SidecarFileStore::new();
    match store.load(&args.input)? {
        Some(sidecar) => print!("{}", sidecar.to_yaml_string()?),
        None => println!("No schema sidecar for {:?}", args.input),
    }
    Ok(())
}

/// Writes every row of `dataset`; missing cells become empty fields.
pub fn write_dataset(dataset: &Dataset, path: &Path, delimiter: u8) -> Result<()> {
    let mut writer = io_utils::open_csv_writer(path, delimiter)?;
    writer.write_record(dataset.column_names())?;
    for row in 0..dataset.row_count() {
        let record = dataset
            .columns()
            .iter()
            .map(|column| column.data.cell_text(row).unwrap_or_default())
            .collect::<Vec<_>>();
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}

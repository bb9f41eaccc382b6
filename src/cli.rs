use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::schema::{SemanticType, split_order};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Load messy tabular files and infer a persistent column schema",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Load a dataset, infer column types and apply the stored schema
    Load(LoadArgs),
    /// Rank candidate date formats for one column
    Dates(DatesArgs),
    /// Override the semantic type of a column in the schema sidecar
    SetType(SetTypeArgs),
    /// Convert a date column to a target format and remember the conversion
    Standardize(StandardizeArgs),
    /// Rename a column in the dataset and its schema sidecar
    ///
    /// The input file is rewritten in place with its detected delimiter, as UTF-8.
    /// The rewrite is normalized: missing tokens such as N/A or null become empty
    /// fields, surrounding cell whitespace is trimmed, and title lines above the
    /// header are dropped. Keep a copy of the original if those details matter.
    Rename(RenameArgs),
    /// Print the persisted schema sidecar for a dataset
    Sidecar(SidecarArgs),
}

#[derive(Debug, Args, Clone, Default)]
pub struct SourceArgs {
    /// Input dataset (.csv, .tsv, .txt, .xlsx, .xls, .ods, .json, .jsonl)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Worksheet name or zero-based index for spreadsheet inputs
    #[arg(long)]
    pub sheet: Option<String>,
    /// Character encoding to try before auto-detection (e.g. windows-1252)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// YAML file with ingestion settings
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct LoadArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    /// Keep only the first N rows of the dataset
    #[arg(long)]
    pub rows: Option<usize>,
    /// Number of rows sampled by the type classifier (0 means every row)
    #[arg(long = "sample-rows")]
    pub sample_rows: Option<usize>,
    /// Minimum percentage of sampled values a date format must match
    #[arg(long = "date-threshold")]
    pub date_threshold: Option<f64>,
    /// Number of rows to show in the preview table
    #[arg(long, default_value_t = 10)]
    pub preview: usize,
    /// Write the typed table to this CSV file
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct DatesArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    /// Column to inspect
    #[arg(short = 'C', long = "column")]
    pub column: String,
    /// Number of non-missing values to sample
    #[arg(long)]
    pub sample: Option<usize>,
}

#[derive(Debug, Args)]
pub struct SetTypeArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    /// Column to override
    #[arg(short = 'C', long = "column")]
    pub column: String,
    /// Semantic type (auto, numeric, count, binary, categorical, ordinal, date, string)
    #[arg(short = 't', long = "type", value_parser = parse_semantic_type)]
    pub semantic_type: SemanticType,
    /// Comma-separated level order for ordinal columns
    #[arg(long)]
    pub order: Option<String>,
}

impl SetTypeArgs {
    pub fn order_levels(&self) -> Option<Vec<String>> {
        self.order
            .as_deref()
            .map(split_order)
            .filter(|levels| !levels.is_empty())
    }
}

#[derive(Debug, Args)]
pub struct StandardizeArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    /// Date column to convert
    #[arg(short = 'C', long = "column")]
    pub column: String,
    /// Target format: a strftime pattern or a catalogue display name
    #[arg(long)]
    pub target: String,
    /// Format the values are currently in; defaults to the best detected format
    #[arg(long)]
    pub original: Option<String>,
}

#[derive(Debug, Args)]
pub struct RenameArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    /// Current column name
    #[arg(long)]
    pub from: String,
    /// New column name
    #[arg(long)]
    pub to: String,
}

#[derive(Debug, Args)]
pub struct SidecarArgs {
    /// Dataset whose sidecar should be printed
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
}

fn parse_semantic_type(value: &str) -> Result<SemanticType, String> {
    value.parse::<SemanticType>().map_err(|err| err.to_string())
}

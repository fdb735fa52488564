//! Stream Model CLI
//!
//! Command-line interface for resolving paths of large JSON documents against a
//! schema definition without decoding the whole document.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use stream_model::{
    load_schema_auto, open_document_auto, stream_model, ConstructionError, ResolveError,
    StreamOptions,
};
use tracing::Level;

#[derive(Parser)]
#[command(name = "stream-model")]
#[command(about = "Lazily resolve schema-shaped paths of streamed JSON documents")]
#[command(version)]
struct Cli {
    /// Log rewinds, default fallbacks and resolutions to stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve one or more paths of a document
    Get {
        /// Document source: file path, URL (http:// or https://), or - for stdin
        document: String,

        /// Schema definition: file path or URL
        #[arg(long, short)]
        schema: String,

        /// Logical JSON Pointer to resolve (repeatable; whole document if omitted)
        #[arg(long, short)]
        path: Vec<String>,

        /// Never rewind the document; fail on access behind the cursor
        #[arg(long)]
        no_rewind: bool,

        /// Output file (stdout if not specified)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Print the JSON Schema equivalent of a schema definition
    Schema {
        /// Schema definition: file path or URL
        schema: String,

        /// Output file (stdout if not specified)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Get {
            document,
            schema,
            path,
            no_rewind,
            output,
            pretty,
        } => run_get(&document, &schema, &path, !no_rewind, output, pretty),

        Commands::Schema {
            schema,
            output,
            pretty,
        } => run_schema(&schema, output, pretty),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run_get(
    document: &str,
    schema_source: &str,
    paths: &[String],
    allow_rewind: bool,
    output: Option<PathBuf>,
    pretty: bool,
) -> Result<(), u8> {
    let schema = load_schema_auto(schema_source).map_err(|e| {
        eprintln!("Error loading schema: {}", e);
        e.exit_code() as u8
    })?;

    let source = open_document_auto(document).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    let options = StreamOptions::new().allow_rewind(allow_rewind);
    let root = stream_model(Arc::new(schema), source, &options).map_err(report_resolve_error)?;

    let resolved = match paths {
        [] => root.resolve().map_err(report_resolve_error)?.to_json(),
        [pointer] => root
            .pointer(pointer)
            .and_then(|node| node.resolve())
            .map_err(report_resolve_error)?
            .to_json(),
        pointers => {
            let mut results = Map::new();
            for pointer in pointers {
                let value = root
                    .pointer(pointer)
                    .and_then(|node| node.resolve())
                    .map_err(report_resolve_error)?;
                results.insert(pointer.clone(), value.to_json());
            }
            Value::Object(results)
        }
    };

    write_output(&resolved, output, pretty)
}

fn run_schema(schema_source: &str, output: Option<PathBuf>, pretty: bool) -> Result<(), u8> {
    let schema = load_schema_auto(schema_source).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    write_output(&schema.json_schema(), output, pretty)
}

/// Print a resolve error, listing every violation for construction failures.
fn report_resolve_error(e: ResolveError) -> u8 {
    eprintln!("Error: {}", e);
    if let ResolveError::Construction {
        source: ConstructionError::Invalid { violations },
        ..
    } = &e
    {
        for violation in violations {
            eprintln!("  {}", violation);
        }
    }
    e.exit_code() as u8
}

fn write_output(value: &Value, output: Option<PathBuf>, pretty: bool) -> Result<(), u8> {
    let json_output = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })?;

    match output {
        Some(path) => {
            std::fs::write(&path, &json_output).map_err(|e| {
                eprintln!("Error writing to {}: {}", path.display(), e);
                3u8
            })?;
        }
        None => {
            println!("{}", json_output);
        }
    }

    Ok(())
}

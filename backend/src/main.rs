//! fieldmap CLI - map CSV exports to typed JSON records
//!
//! # Main Commands
//!
//! ```bash
//! fieldmap serve                          # Start HTTP server (FIELDMAP_PORT, default 3000)
//! fieldmap apply export.csv -m set.json   # Apply a mapping set to a CSV
//! fieldmap mapping list                   # Manage saved mapping sets
//! ```
//!
//! # Inspection Commands
//!
//! ```bash
//! fieldmap parse export.csv               # Just parse CSV to JSON
//! fieldmap validate records.json          # Validate JSON records against a schema
//! fieldmap types                          # List registered typeIds
//! fieldmap example-mapping                # Print the example mapping set
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use fieldmap::{
    apply_mapping_set, decode_content, detect_encoding, example_mapping_set, parse_csv_file_auto, parse_str,
    registry, transform_file, Cancellation, EngineConfig, MappingStore, RecordValidator, TransformOptions,
    INVOICE_SCHEMA,
};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

type CliResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "fieldmap")]
#[command(about = "Map CSV columns to typed records through rule and transformation pipelines", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a CSV file and output JSON
    Parse {
        /// Input CSV file
        input: PathBuf,

        /// CSV delimiter (auto-detect if not specified)
        #[arg(short, long)]
        delimiter: Option<char>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Full pipeline: CSV → mapping set → validated JSON records
    Apply {
        /// Input CSV file
        input: PathBuf,

        /// Mapping set file (default: saved sets, then schema defaults)
        #[arg(short, long)]
        mapping: Option<PathBuf>,

        /// Target JSON schema
        #[arg(short, long)]
        schema: Option<PathBuf>,

        /// Output file for records (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Save the mapping set that was used to a file
        #[arg(long)]
        save_mapping: Option<PathBuf>,

        /// Rows resolved concurrently (default: FIELDMAP_ROW_CONCURRENCY)
        #[arg(long)]
        concurrency: Option<usize>,

        /// Skip validation
        #[arg(long)]
        no_validate: bool,

        /// Don't look for saved mapping sets
        #[arg(long)]
        no_cache: bool,

        /// Don't save a generated default mapping set
        #[arg(long)]
        no_save: bool,
    },

    /// Validate JSON records against a target schema
    Validate {
        /// Input JSON file (array of records)
        input: PathBuf,

        /// JSON schema (default: bundled invoice schema)
        #[arg(short, long)]
        schema: Option<PathBuf>,
    },

    /// List registered transformations, rules and comparisons
    Types {
        /// Only one family
        #[arg(short, long, value_enum)]
        family: Option<FamilyArg>,
    },

    /// Show the example mapping set
    ExampleMapping,

    /// Start HTTP server
    Serve {
        /// Port to listen on (default: FIELDMAP_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Manage saved mapping sets
    Mapping {
        #[command(subcommand)]
        action: MappingAction,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum FamilyArg {
    Transformation,
    Rule,
    Comparison,
}

#[derive(Subcommand)]
enum MappingAction {
    /// List all saved mapping sets
    List,

    /// Import a mapping set JSON file
    Import {
        /// Mapping set file to import
        file: PathBuf,
        /// Name for the saved set
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Show details of a saved mapping set
    Show {
        /// Mapping set ID
        id: String,
    },

    /// Delete a saved mapping set
    Delete {
        /// Mapping set ID
        id: String,
    },

    /// Use a saved mapping set to transform a CSV
    Use {
        /// Mapping set ID
        id: String,
        /// Input CSV file
        input: PathBuf,
        /// Target JSON schema (default: built from the target fields)
        #[arg(short, long)]
        schema: Option<PathBuf>,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let config = EngineConfig::load();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Parse {
            input,
            delimiter,
            output,
        } => cmd_parse(&input, delimiter, output.as_deref()),

        Commands::Apply {
            input,
            mapping,
            schema,
            output,
            save_mapping,
            concurrency,
            no_validate,
            no_cache,
            no_save,
        } => {
            let options = TransformOptions {
                mapping_path: mapping,
                schema_path: schema,
                row_concurrency: concurrency.unwrap_or(config.row_concurrency).max(1),
                skip_validation: no_validate,
                no_cache,
                no_save,
                ..TransformOptions::from_config(&config)
            };
            cmd_apply(&input, options, output.as_deref(), save_mapping.as_deref()).await
        }

        Commands::Validate { input, schema } => cmd_validate(&input, schema.as_deref()),

        Commands::Types { family } => cmd_types(family),

        Commands::ExampleMapping => cmd_example_mapping(),

        Commands::Serve { port } => {
            let config = EngineConfig {
                port: port.unwrap_or(config.port),
                ..config
            };
            fieldmap::server::start_server(config).await.map_err(Into::into)
        }

        Commands::Mapping { action } => cmd_mapping(action, &config).await,
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_parse(input: &Path, delimiter: Option<char>, output: Option<&Path>) -> CliResult {
    eprintln!("📄 Parsing CSV: {}", input.display());

    let (table, encoding, used_delimiter) = match delimiter {
        Some(d) => {
            let bytes = fs::read(input)?;
            let encoding = detect_encoding(&bytes);
            let content = decode_content(&bytes, &encoding);
            let name = input.file_stem().and_then(|s| s.to_str()).unwrap_or("input");
            (parse_str(&content, d, name)?, encoding, d)
        }
        None => {
            let parsed = parse_csv_file_auto(input)?;
            (parsed.table, parsed.encoding, parsed.delimiter)
        }
    };

    eprintln!("   Encoding: {}", encoding);
    eprintln!(
        "   Delimiter: '{}'{}",
        format_delimiter(used_delimiter),
        if delimiter.is_none() { " (auto-detected)" } else { "" }
    );
    eprintln!("   Columns: {}", table.definition.field_names().join(", "));
    for field in &table.definition.fields {
        eprintln!("     {} ({:?}, {} distinct)", field.name, field.value_type, field.value_set.len());
    }
    eprintln!("✅ Parsed {} records", table.len());

    let rows: Vec<&Map<String, Value>> = table.rows.iter().map(|r| &r.values).collect();
    write_output(&serde_json::to_string_pretty(&rows)?, output)
}

async fn cmd_apply(input: &Path, options: TransformOptions, output: Option<&Path>, save_mapping: Option<&Path>) -> CliResult {
    eprintln!("📄 Processing: {}", input.display());
    let no_validate = options.skip_validation;

    let report = transform_file(input, options).await?;

    if let Some(ref id) = report.mapping_id {
        eprintln!("   Mapping set: {} ({})", report.mapping.name, id);
    }
    eprintln!("\n⚙️  Generated: {} records", report.records.len());

    if !report.issues.is_empty() {
        eprintln!("   ⚠️  {} optional fields left out", report.issues.len());
    }

    if let (false, Some(validation)) = (no_validate, &report.validation) {
        eprintln!("\n✔️  Validation:");
        if validation.is_valid() {
            eprintln!("   ✅ All {} records valid!", validation.valid_count);
        } else {
            eprintln!("   ✅ Valid: {}", validation.valid_count);
            eprintln!("   ❌ Invalid: {}", validation.invalid_count);
            for (i, errors) in validation.errors.iter().take(5) {
                eprintln!("\n   Record {}:", i);
                for err in errors.iter().take(3) {
                    eprintln!("     - {}", err);
                }
            }
        }
    }

    if let Some(path) = save_mapping {
        fs::write(path, report.mapping.to_json()?)?;
        eprintln!("   💾 Mapping set saved to: {}", path.display());
    }

    write_output(&serde_json::to_string_pretty(&report.records)?, output)?;

    eprintln!("\n✨ Done!");
    Ok(())
}

fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}

fn cmd_validate(input: &Path, schema: Option<&Path>) -> CliResult {
    eprintln!("✔️  Validating: {}", input.display());

    let schema: Value = match schema {
        Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
        None => serde_json::from_str(INVOICE_SCHEMA)?,
    };
    let validator = RecordValidator::new(&schema)?;

    let records: Vec<Value> = serde_json::from_str(&fs::read_to_string(input)?)?;
    let report = validator.validate_records(&records);

    for (i, errors) in report.errors.iter().take(5) {
        eprintln!("\n❌ Record {} invalid:", i);
        for err in errors.iter().take(3) {
            eprintln!("   - {}", err);
        }
    }

    eprintln!("\n📊 Results: {} valid, {} invalid", report.valid_count, report.invalid_count);

    if !report.is_valid() {
        return Err(format!("{} invalid records", report.invalid_count).into());
    }
    Ok(())
}

fn cmd_types(family: Option<FamilyArg>) -> CliResult {
    let descriptors = match family {
        None => registry::all_descriptors(),
        Some(FamilyArg::Transformation) => registry::transformations().descriptors(),
        Some(FamilyArg::Rule) => registry::rules().descriptors(),
        Some(FamilyArg::Comparison) => registry::comparisons().descriptors(),
    };

    let mut current = None;
    for d in descriptors {
        if current != Some(d.family) {
            println!("\n{}s:", d.family.label());
            current = Some(d.family);
        }
        println!("  {:<20} {:<28} {}", d.type_id, d.display_name, d.description);
    }
    Ok(())
}

fn cmd_example_mapping() -> CliResult {
    println!("{}", example_mapping_set().to_json()?);
    Ok(())
}

fn write_output(content: &str, path: Option<&Path>) -> CliResult {
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

async fn cmd_mapping(action: MappingAction, config: &EngineConfig) -> CliResult {
    let mut store = MappingStore::open(&config.store_dir);

    match action {
        MappingAction::List => {
            let saved = store.list();
            if saved.is_empty() {
                eprintln!("📋 No mapping sets saved yet in {}.", store.dir().display());
                eprintln!("   Use 'fieldmap mapping import <file>' to add one.");
                return Ok(());
            }

            eprintln!("📋 Saved mapping sets ({}):\n", saved.len());
            for m in saved {
                println!("  📄 {} ({})", m.name, m.id);
                println!("     Columns: {}", m.source_columns.join(", "));
                println!("     Targets: {}", m.mapping.target_fields().join(", "));
                println!("     Success rate: {:.0}%", m.success_rate * 100.0);
                println!("     Uses: {}", m.use_count);
                if let Some(ref last) = m.last_used {
                    println!("     Last used: {}", last);
                }
                println!();
            }
        }

        MappingAction::Import { file, name } => {
            eprintln!("📥 Importing mapping set from: {}", file.display());
            let id = store.import(&file, name.as_deref())?;
            eprintln!("✅ Mapping set saved with ID: {}", id);
        }

        MappingAction::Show { id } => {
            let m = store.get(&id)?;
            println!("📄 Mapping set: {} ({})\n", m.name, m.id);
            println!("Source columns: {}", m.source_columns.join(", "));
            println!("Created: {}", m.created_at);
            println!("Success rate: {:.0}%", m.success_rate * 100.0);
            println!("Uses: {}", m.use_count);
            println!("\nMapping:");
            println!("{}", m.mapping.to_json()?);
        }

        MappingAction::Delete { id } => {
            store.delete(&id)?;
            eprintln!("🗑️  Mapping set deleted: {}", id);
        }

        MappingAction::Use {
            id,
            input,
            schema,
            output,
        } => {
            let stored = store.get(&id)?;
            let mapping = stored.mapping.clone();
            eprintln!("📄 Using mapping set: {} ({})", stored.name, stored.id);

            let schema: Option<Value> = match schema {
                Some(path) => Some(serde_json::from_str(&fs::read_to_string(path)?)?),
                None => None,
            };

            let parsed = parse_csv_file_auto(&input)?;
            eprintln!("   Found {} rows", parsed.row_count());

            let applied = apply_mapping_set(
                &mapping,
                &parsed.table,
                schema.as_ref(),
                true,
                config.row_concurrency,
                &Cancellation::new(),
            )
            .await?;
            store.record_use(&id, applied.is_usable())?;

            eprintln!("   Generated: {} records", applied.output.records.len());
            if let Some(validation) = &applied.validation {
                if validation.is_valid() {
                    eprintln!("   ✅ All {} records valid!", validation.valid_count);
                } else {
                    eprintln!("   ⚠️  {} valid, {} invalid", validation.valid_count, validation.invalid_count);
                }
            }

            write_output(&serde_json::to_string_pretty(&applied.output.records)?, output.as_deref())?;
        }
    }

    Ok(())
}

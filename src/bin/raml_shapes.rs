//! RAML Shapes CLI
//!
//! Loads RAML fragments and prints the resolved shape graph.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use raml_shapes::{Fragment, LoaderConfig, Registry, ShapeView};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "raml-shapes")]
#[command(about = "Load RAML 1.0 libraries and data types into a typed shape graph")]
struct Cli {
    /// Configuration file (layered over raml.toml and RAML_* variables)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load fragments and print a summary of each
    Load {
        /// Library or DataType files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Print diagnostics after loading
        #[arg(short, long)]
        diagnostics: bool,
    },

    /// Print one resolved type as JSON
    Show {
        /// Fragment declaring the type
        file: PathBuf,
        /// Declared type name
        name: String,

        /// Compact output
        #[arg(long)]
        compact: bool,
    },

    /// Load every fragment under a directory into one registry
    Scan {
        /// Directory to walk
        #[arg(default_value = ".")]
        dir: PathBuf,
    },

    /// Print the active configuration as TOML
    Config,
}

fn main() {
    let cli = Cli::parse();

    let config = match LoaderConfig::load_from(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli.command, config) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(command: Commands, config: LoaderConfig) -> Result<()> {
    match command {
        Commands::Load { files, diagnostics } => {
            let mut registry = Registry::new().with_settings(config.loader);
            for file in &files {
                let fragment = registry
                    .load(file)
                    .map_err(|e| anyhow::anyhow!(e.trace()))
                    .with_context(|| format!("loading {}", file.display()))?;
                print_summary(&registry, &fragment);
            }
            println!();
            println!(
                "{} fragment(s), {} shape(s), {} resolved",
                registry.fragments().count(),
                registry.arena().len(),
                registry.resolved().len()
            );
            if diagnostics && !registry.diagnostics().is_empty() {
                println!();
                print!("{}", registry.diagnostics());
            }
            Ok(())
        }

        Commands::Show { file, name, compact } => {
            let mut registry = Registry::new().with_settings(config.loader);
            registry
                .load(&file)
                .map_err(|e| anyhow::anyhow!(e.trace()))
                .with_context(|| format!("loading {}", file.display()))?;
            let id = registry
                .resolve_named(&file, &name)
                .with_context(|| format!("resolving {}", name))?;

            let view = ShapeView::render(&registry, id);
            let output = if compact {
                serde_json::to_string(&view)?
            } else {
                serde_json::to_string_pretty(&view)?
            };
            println!("{}", output);
            Ok(())
        }

        Commands::Scan { dir } => {
            if !dir.is_dir() {
                bail!("{} is not a directory", dir.display());
            }
            let settings = config.loader;
            let files: Vec<PathBuf> = WalkDir::new(&dir)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().is_file())
                .map(|entry| entry.into_path())
                .filter(|path| settings.is_fragment_file(path))
                .collect();

            let mut registry = Registry::new().with_settings(settings);
            let mut failed = 0;
            for file in &files {
                match registry.load(file) {
                    Ok(fragment) => print_summary(&registry, &fragment),
                    Err(e) => {
                        failed += 1;
                        println!("❌ {}", file.display());
                        for line in e.trace().lines() {
                            println!("   {}", line);
                        }
                    }
                }
            }

            println!();
            println!(
                "{} file(s) scanned, {} failed, {} warning(s)",
                files.len(),
                failed,
                registry.diagnostics().warning_count()
            );
            if failed > 0 {
                std::process::exit(1);
            }
            Ok(())
        }

        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

fn print_summary(registry: &Registry, fragment: &Fragment) {
    match fragment {
        Fragment::Library(library) => {
            println!(
                "✅ {} (Library) - {} type(s), {} annotation type(s)",
                library.location.display(),
                library.types.len(),
                library.annotation_types.len()
            );
            for (alias, path) in &library.uses {
                println!("   uses {}: {}", alias, path.display());
            }
            for (name, id) in &library.types {
                println!("   {} : {}", name, registry.get(*id).shape_type());
            }
        }
        Fragment::DataType(data_type) => {
            let shape = registry.get(data_type.shape);
            println!(
                "✅ {} (DataType) - {} : {}",
                data_type.location.display(),
                shape.name(),
                shape.shape_type()
            );
        }
    }
    println!("   sha256 {}", fragment.checksum());
}

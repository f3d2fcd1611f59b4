//! Seed CLI
//!
//! Usage:
//!   seed [OPTIONS] <TEMPLATE>
//!
//! Options:
//!   -d, --data <FILE>    Context data (JSON or TOML, by extension)
//!   -r, --root <DIR>     Directory holding components/ and layouts/
//!   -c, --config <FILE>  Configuration file (TOML)
//!       --route <URL>    Render the template's router for URL
//!       --ast            Print the parsed tree instead of rendering
//!       --meta           Print the render metadata as JSON on stderr
//!   -h, --help           Print help

use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use seed_template::resolver::{Cache, DataRegistry, FileSystemResolver, MemoryCache};
use seed_template::{parse_with, Compiler, Config, Output, Root, Value};

#[derive(Parser)]
#[command(name = "seed")]
#[command(about = "Render seed templates to HTML")]
struct Cli {
    /// Template file
    template: PathBuf,

    /// Context data (JSON or TOML, by extension)
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// Directory holding components/ and layouts/ (overrides the config)
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Render the template's router for this URL
    #[arg(long)]
    route: Option<String>,

    /// Print the parsed tree instead of rendering
    #[arg(long)]
    ast: bool,

    /// Print the render metadata as JSON on stderr
    #[arg(long)]
    meta: bool,
}

fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "seed_template=info".into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path).unwrap_or_else(|e| {
            fail(format!("Error loading config '{}': {}", path.display(), e))
        }),
        None => Config::default(),
    };

    let source = fs::read_to_string(&cli.template).unwrap_or_else(|e| {
        fail(format!("Error reading file '{}': {}", cli.template.display(), e))
    });

    let root = match parse_with(&source, &config.parser) {
        Ok(root) => root,
        Err(e) => {
            eprint!("{}", e.format(&source, &cli.template.display().to_string()));
            process::exit(1);
        }
    };

    if cli.ast {
        println!("{root:#?}");
        return;
    }

    let context = match &cli.data {
        Some(path) => load_context(path).unwrap_or_else(|e| fail(e)),
        None => Value::object(),
    };

    let mut compiler_config = config
        .compiler
        .clone()
        .with_file_id(cli.template.display().to_string());
    if let Some(dir) = &cli.root {
        compiler_config = compiler_config.with_root(dir);
    }

    let cache: Arc<dyn Cache<Arc<Root>>> = Arc::new(MemoryCache::from_config(&config.cache));
    let templates = Arc::new(FileSystemResolver::new(config.parser.clone()).with_cache(cache));
    // No processors are built in; `<:data>` reports the missing processor
    let data = DataRegistry::new(config.data.clone()).with_cache_config(&config.cache);
    let compiler = Compiler::new(compiler_config)
        .with_component_resolver(templates.clone())
        .with_layout_resolver(templates)
        .with_data_resolver(Arc::new(data));

    let rendered = match &cli.route {
        Some(url) => match compiler.compile_route(&root, url, &context) {
            Ok(Some(output)) => Ok(output),
            Ok(None) => fail(format!("No route matches '{url}'")),
            Err(e) => Err(e),
        },
        None => compiler.compile_root(&root, &context),
    };

    match rendered {
        Ok(output) => {
            println!("{}", output.source);
            if cli.meta {
                print_meta(&output);
            }
        }
        Err(e) => fail(format!("Error: {e}")),
    }
}

fn load_context(path: &Path) -> Result<Value, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Error reading data '{}': {}", path.display(), e))?;
    let invalid = |e: String| format!("Error parsing data '{}': {}", path.display(), e);

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => toml::from_str::<toml::Table>(&content)
            .map(|table| Value::from(toml::Value::Table(table)))
            .map_err(|e| invalid(e.to_string())),
        _ => serde_json::from_str::<serde_json::Value>(&content)
            .map(Value::from)
            .map_err(|e| invalid(e.to_string())),
    }
}

fn print_meta(output: &Output) {
    match serde_json::to_string_pretty(output) {
        Ok(json) => eprintln!("{json}"),
        Err(e) => eprintln!("Error serializing metadata: {e}"),
    }
}

fn fail(message: String) -> ! {
    eprintln!("{message}");
    process::exit(1);
}

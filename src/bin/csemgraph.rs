use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;

use clap::Parser;
use env_logger::Env;

use csemgraph::pipeline::PipelineConfig;
use csemgraph::{discovery::DiscoveryConfig, pipeline};

#[derive(Debug, Parser)]
#[command(name = "csemgraph", version, about = "Index a C source tree into a persistent semantic graph")]
struct Args {
    /// Source directory to index
    source_dir: PathBuf,

    /// Persistent store location
    #[arg(long = "db", default_value = "csemgraph.db")]
    db: PathBuf,

    /// File extensions to index (comma-separated)
    #[arg(long = "extensions", default_value = ".c,.h")]
    extensions: String,

    /// Run Stages D+E+F (build cscope db, ingest references, resolve edges)
    #[arg(long = "refs", default_value_t = false)]
    refs: bool,

    /// Build the cross-reference scanner database (Stage D only)
    #[arg(long = "build-cscope", default_value_t = false)]
    build_cscope: bool,

    /// Ingest raw references (Stage E only; implies a prior --build-cscope run)
    #[arg(long = "ingest-refs", default_value_t = false)]
    ingest_refs: bool,

    /// Resolve raw references into edges (Stage F only; implies a prior --ingest-refs run)
    #[arg(long = "resolve-refs", default_value_t = false)]
    resolve_refs: bool,

    /// Clear an existing store without prompting
    #[arg(short = 'f', long = "force", default_value_t = false)]
    force: bool,

    /// Verbose logging (overrides RUST_LOG)
    #[arg(short = 'v', long = "verbose", default_value_t = false)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .try_init();

    if !args.source_dir.is_dir() {
        anyhow::bail!("source_dir is not a directory: {}", args.source_dir.display());
    }

    if args.db.exists() && !args.force && !confirm_clear(&args.db)? {
        anyhow::bail!("aborted: store already exists at {} (pass --force to clear it)", args.db.display());
    }

    let extensions = args
        .extensions
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    let cfg = PipelineConfig {
        source_root: args.source_dir.clone(),
        db_path: args.db.clone(),
        discovery: DiscoveryConfig::with_extensions(extensions),
        force: args.force,
        refs: args.refs,
        build_cscope: args.build_cscope,
        ingest_refs: args.ingest_refs,
        resolve_refs: args.resolve_refs,
        ctags_bin: std::env::var("CSEMGRAPH_CTAGS").unwrap_or_else(|_| "ctags".to_string()),
        cscope_bin: std::env::var("CSEMGRAPH_CSCOPE").unwrap_or_else(|_| "cscope".to_string()),
        cscope_out_dir: args.db.parent().unwrap_or_else(|| std::path::Path::new(".")).join("cscope"),
    };

    match pipeline::run(&cfg) {
        Ok(report) => {
            log::info!(
                "indexing complete: state={} files={} symbols={}",
                report.final_state.unwrap_or("UNKNOWN"),
                report.total_files,
                report.total_symbols
            );
            Ok(())
        }
        Err(e) => Err(anyhow::anyhow!(e)),
    }
}

fn confirm_clear(db: &std::path::Path) -> anyhow::Result<bool> {
    if !io::stdin().is_terminal() {
        return Ok(false);
    }
    eprint!("store already exists at {} — clear and reindex? [y/N] ", db.display());
    io::stderr().flush().ok();
    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

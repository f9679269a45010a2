// Command-line entry point for callflow.

use anyhow::{Context, Result};
use callflow::api::dto::GraphDto;
use callflow::application::batch::BatchJob;
use callflow::application::AnalyzeUsecase;
use callflow::domain::projection::project;
use callflow::domain::prune::{parse_selection, prune_by_literal};
use callflow::domain::store::{CatalogBackend, CatalogStore, MemoryBackend, SledBackend};
use callflow::infrastructure::concurrency::build_render_pool;
use callflow::infrastructure::config::CallflowConfig;
use callflow::infrastructure::{FsDiscovery, GraphvizRasterizer, RustIntrospector};
use callflow::logging;
use callflow::ports::dot_exporter::{DotExporter, EdgeColor, RankDir};
use callflow::ports::text_exporter::TextExporter;
use clap::{ArgAction, Parser, ValueEnum};
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputMode {
    /// Graphviz DOT of the (optionally pruned) call graph
    Graph,
    /// Per-file listing of entities and their calls
    TextSummary,
    /// Table of entity ids, names, kinds and modules
    EntityTable,
    /// Nodes and call sites as JSON
    Json,
    /// One rasterized image per function and method
    PerEntityBatch,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Static call graphs for Rust sources", long_about = None)]
struct Cli {
    /// Source directory or single `.rs` file
    target: PathBuf,

    /// What to produce
    #[arg(short = 'o', long, value_enum, default_value_t = OutputMode::Graph)]
    output_mode: OutputMode,

    /// Write output here instead of stdout
    #[arg(long)]
    out_file: Option<PathBuf>,

    /// Image directory for per-entity-batch
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Comma separated entity ids to trace (see entity-table)
    #[arg(long, value_name = "IDS")]
    select_entity_id: Option<String>,

    /// Graph direction: TB, BT, RL or LR
    #[arg(long)]
    rankdir: Option<RankDir>,

    /// Fixed edge colour, or `rotate`
    #[arg(long)]
    edge_color: Option<EdgeColor>,

    #[arg(long)]
    suppress_recursive_calls: bool,

    #[arg(long)]
    combine_calls: bool,

    #[arg(long)]
    suppress_class_references: bool,

    #[arg(long)]
    suppress_initializer_calls: bool,

    /// Prefer callees declared in the caller's own file
    #[arg(long)]
    match_to_file: bool,

    /// Keep at most N candidates per call site
    #[arg(long, value_name = "N")]
    max_candidates: Option<NonZeroUsize>,

    /// Persist the catalog in a sled database at this path
    #[arg(long)]
    db_file: Option<PathBuf>,

    /// Reuse the catalog stored in --db-file instead of re-analyzing
    #[arg(long, requires = "db_file")]
    no_analyze: bool,

    /// Package name prefixed to every import path
    #[arg(long)]
    package_name: Option<String>,

    /// TOML config (defaults to ./callflow.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Render workers for per-entity-batch
    #[arg(long)]
    jobs: Option<usize>,

    /// Graphviz layout program
    #[arg(long)]
    rasterizer: Option<String>,

    /// Image format for per-entity-batch
    #[arg(long)]
    image_format: Option<String>,

    /// -v for info, -vv for debug
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    /// Command-line values win over the config file.
    fn apply_to(&self, config: &mut CallflowConfig) {
        let resolve = &mut config.resolve;
        resolve.suppress_initializer_calls |= self.suppress_initializer_calls;
        resolve.match_to_file |= self.match_to_file;
        if self.max_candidates.is_some() {
            resolve.max_candidates = self.max_candidates;
        }

        let render = &mut config.render;
        render.suppress_recursive_calls |= self.suppress_recursive_calls;
        render.combine_calls |= self.combine_calls;
        render.suppress_class_references |= self.suppress_class_references;
        if let Some(rankdir) = self.rankdir {
            render.rankdir = rankdir;
        }
        if let Some(color) = &self.edge_color {
            render.edge_color = color.clone();
        }

        let batch = &mut config.batch;
        if let Some(dir) = &self.out_dir {
            batch.out_dir = dir.clone();
        }
        if self.jobs.is_some() {
            batch.jobs = self.jobs;
        }
        if let Some(program) = &self.rasterizer {
            batch.rasterizer = program.clone();
        }
        if let Some(format) = &self.image_format {
            batch.format = format.clone();
        }
    }
}

fn write_output(out_file: Option<&Path>, text: &str) -> Result<()> {
    match out_file {
        Some(path) => {
            fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), "output written");
        }
        None => println!("{}", text),
    }
    Ok(())
}

fn run<B: CatalogBackend>(cli: &Cli, mut config: CallflowConfig, backend: B) -> Result<()> {
    let mut store = CatalogStore::open(backend).context("Cannot open catalog store")?;

    if cli.no_analyze {
        if store.catalog().is_empty() {
            warn!("stored catalog is empty");
        }
    } else {
        let discovery = FsDiscovery::new(&cli.target, cli.package_name.clone());
        let introspector = RustIntrospector;
        let usecase = AnalyzeUsecase {
            discovery: &discovery,
            introspector: &introspector,
            options: &config.resolve,
        };
        let report = usecase.run(&mut store)?;
        if report.failed_files > 0 {
            warn!("{} file(s) could not be analyzed", report.failed_files);
        }
    }

    let mut projection = project(store.catalog());
    if let Some(literal) = &cli.select_entity_id {
        projection = prune_by_literal(&projection, literal);
        if let Ok(selection) = parse_selection(literal) {
            config.render.highlight = selection;
        }
    }

    match cli.output_mode {
        OutputMode::Graph => match &cli.out_file {
            Some(path) => DotExporter::export(&projection, &config.render, &path.to_string_lossy())?,
            None => println!("{}", DotExporter::to_dot(&projection, &config.render)),
        },
        OutputMode::TextSummary => {
            write_output(cli.out_file.as_deref(), &TextExporter::summary(store.catalog(), &projection))?
        }
        OutputMode::EntityTable => {
            write_output(cli.out_file.as_deref(), &TextExporter::entity_table(&projection))?
        }
        OutputMode::Json => {
            let json = GraphDto::from(&projection)
                .to_json()
                .context("Failed to serialize graph")?;
            write_output(cli.out_file.as_deref(), &json)?
        }
        OutputMode::PerEntityBatch => {
            let pool = build_render_pool(config.batch.jobs)?;
            let rasterizer = GraphvizRasterizer::new(&config.batch.rasterizer, &config.batch.format);
            let excluded_names = config
                .resolve
                .initializer_names
                .iter()
                .chain(&config.batch.finalizer_names)
                .cloned()
                .collect();
            let job = BatchJob {
                rasterizer: &rasterizer,
                render: &config.render,
                excluded_names,
                out_dir: &config.batch.out_dir,
            };
            let report = job.run(&projection, &pool)?;
            println!(
                "Wrote {} image(s) to {} ({} failed)",
                report.written.len(),
                config.batch.out_dir.display(),
                report.failures.len()
            );
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = CallflowConfig::load(cli.config.as_deref())?;
    cli.apply_to(&mut config);
    logging::init(&config.logging, cli.verbose);

    match &cli.db_file {
        Some(path) => {
            let backend = SledBackend::new(&path.to_string_lossy())
                .with_context(|| format!("Cannot open catalog database {}", path.display()))?;
            run(&cli, config, backend)
        }
        None => run(&cli, config, MemoryBackend),
    }
}

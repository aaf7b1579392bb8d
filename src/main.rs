use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use flowdex::db::migrate;
use flowdex::{Catalog, Config, SearchQuery};
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "flowdex")]
#[command(version, about = "Index and search a directory of workflow documents")]
struct Cli {
    /// Config file (defaults to $FLOWDEX_CONFIG, then ./config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Initialize the index, check the schema and print a summary (default)
    Verify,
    /// Bring the index up to date with the workflows directory
    Reindex {
        /// Reprocess every file, ignoring stored signatures
        #[arg(short, long)]
        force: bool,
    },
    /// Remove records whose file no longer exists
    Cleanup,
    /// Search indexed workflows
    Search {
        /// Words that must all appear in name, description or filename
        query: Option<String>,
        #[arg(long, default_value = "all")]
        trigger: String,
        #[arg(long, default_value = "all")]
        complexity: String,
        #[arg(long)]
        active_only: bool,
        /// Hide files with a numeric import prefix (`0001_...`)
        #[arg(long)]
        exclude_legacy: bool,
        #[arg(long)]
        folder: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long)]
        per_page: Option<usize>,
    },
    /// Print the full record of one workflow as JSON
    Show { filename: String },
    /// Print the Mermaid diagram of one workflow
    Diagram { filename: String },
    /// Print index statistics as JSON
    Stats,
    /// List folder categories
    Categories,
    /// List distinct integrations
    Integrations,
    /// Export every workflow as newline-delimited JSON
    Export {
        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", config.flowdex.log_level.as_str()),
    )
    .init();

    log::info!("Starting flowdex v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Workflows root: {}", config.workflows_dir().display());
    log::info!("Database path: {}", config.db_path().display());

    let catalog = Catalog::open(config.clone()).await?;
    let command = cli.command.unwrap_or(Command::Verify);

    if !matches!(command, Command::Reindex { .. }) {
        populate_if_empty(&catalog).await?;
    }

    let result = run(&catalog, &config, command).await;
    catalog.close().await?;
    result
}

/// An empty index is filled with a forced reindex before anything else
async fn populate_if_empty(catalog: &Catalog) -> Result<()> {
    if catalog.store().count().await? == 0 {
        log::info!("Index is empty; running initial reindex");
        let report = catalog.reindex_blocking(true).await?;
        log::info!("Indexed {} workflows ({} errors)", report.processed, report.errors);
    }
    Ok(())
}

async fn run(catalog: &Catalog, config: &Config, command: Command) -> Result<()> {
    match command {
        Command::Verify => {
            verify_database_schema(catalog).await?;
            let stats = catalog.get_stats().await?;
            println!(
                "{} workflows ({} active, {} inactive), {} nodes, {} integrations",
                stats.total, stats.active, stats.inactive, stats.total_nodes, stats.unique_integrations
            );
        }
        Command::Reindex { force } => {
            let handle = catalog.reindex(force);
            log::info!("Waiting for reindex {}", handle.id());
            let report = handle.wait().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Cleanup => {
            let removed = catalog.cleanup_missing().await?;
            println!("Removed {} missing workflows", removed);
        }
        Command::Search {
            query,
            trigger,
            complexity,
            active_only,
            exclude_legacy,
            folder,
            page,
            per_page,
        } => {
            let mut search = SearchQuery::new()
                .text(query.unwrap_or_default())
                .trigger(trigger)
                .complexity(complexity)
                .active_only(active_only)
                .exclude_legacy(exclude_legacy)
                .page(page, config.page_size(per_page));
            if let Some(folder) = folder {
                search = search.folder(folder);
            }

            let results = catalog.search_workflows(&search).await?;
            for workflow in &results.workflows {
                println!(
                    "{:<40} {:<10} {:<8} {:>3} nodes  {}",
                    workflow.filename,
                    workflow.trigger_type,
                    workflow.complexity,
                    workflow.node_count,
                    workflow.name
                );
            }
            println!(
                "-- page {}/{} ({} matching)",
                results.page(),
                results.pages().max(1),
                results.total
            );
        }
        Command::Show { filename } => {
            let record = catalog.get_workflow_detail(&filename).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Command::Diagram { filename } => {
            println!("{}", catalog.build_diagram(&filename).await?);
        }
        Command::Stats => {
            let stats = catalog.get_stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Categories => {
            for category in catalog.list_categories().await? {
                println!("{}", category);
            }
        }
        Command::Integrations => {
            for integration in catalog.list_integrations().await? {
                println!("{}", integration);
            }
        }
        Command::Export { output } => {
            let count = match output {
                Some(path) => {
                    let file = File::create(&path)
                        .with_context(|| format!("Failed to create {}", path.display()))?;
                    catalog.export_ndjson(BufWriter::new(file)).await?
                }
                None => catalog.export_ndjson(io::stdout().lock()).await?,
            };
            log::info!("Wrote {} lines", count);
        }
    }
    Ok(())
}

/// Verify that all expected database objects exist
async fn verify_database_schema(catalog: &Catalog) -> Result<()> {
    let (tables, applied) = catalog
        .store()
        .db()
        .with_connection(|conn| {
            let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table'")?;
            let tables = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok((tables, migrate::get_applied_migrations(conn)?))
        })
        .await?;

    for expected in ["workflows", "workflow_integrations", "index_meta", "schema_migrations"] {
        if !tables.iter().any(|t| t == expected) {
            anyhow::bail!("Missing table: {}", expected);
        }
        log::info!("Table present: {}", expected);
    }
    log::info!("{} migrations applied", applied.len());
    Ok(())
}

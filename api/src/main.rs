mod cache;
mod compiler;
mod config;
mod executor;
mod llm;
mod samples;
mod schema;
mod server;
mod store_client;
#[cfg(test)]
mod test_helpers;
mod translator;

use anyhow::{Context, Result};
use cache::{CachePurgeService, CacheStore};
use clap::{Parser, Subcommand};
use compiler::{FilterCompiler, Intent, RequestTracker};
use config::Config;
use executor::QueryExecutor;
use filter_common::{FilterExpression, HeuristicEngine, PaginationOpts, SortConfig, SortDirection};
use poem::{listener::TcpListener, Server};
use samples::SampleFetcher;
use schema::SchemaIntrospector;
use serde::Serialize;
use server::AppState;
use std::path::PathBuf;
use std::sync::Arc;
use store_client::{HttpTableStore, TableStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use translator::NlTranslator;

#[derive(Parser)]
#[command(name = "filter-api")]
#[command(about = "Natural-language filter compiler for tabular data")]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve,
    /// Compile a natural-language query against a table and print the result
    Compile {
        table: String,
        query: String,
        /// Also fetch the first page of matching rows
        #[arg(long)]
        execute: bool,
    },
    /// Run a filter expression against a table
    Execute {
        table: String,
        /// Filter expression as JSON
        #[arg(long, conflicts_with = "expression_file")]
        expression: Option<String>,
        /// File containing the filter expression as JSON
        #[arg(long)]
        expression_file: Option<PathBuf>,
        #[arg(long)]
        cursor: Option<String>,
        #[arg(long)]
        num_items: Option<usize>,
        /// Field to sort the page by
        #[arg(long)]
        sort: Option<String>,
        #[arg(long, default_value = "asc")]
        direction: String,
    },
    /// Print the fields of a table, including system fields
    Fields { table: String },
    /// Print the indexes of a table usable as filter targets
    Indexes { table: String },
}

struct AppContext {
    config: Config,
    compiler: FilterCompiler,
    cache: Arc<dyn CacheStore>,
    model: Option<String>,
}

async fn setup_app_context(config_path: Option<&PathBuf>) -> Result<AppContext> {
    let config = Config::resolve(config_path.map(|p| p.as_path()))?;

    let store: Arc<dyn TableStore> = Arc::new(HttpTableStore::from_config(&config.store));
    tracing::info!("Using table store at {}", config.store.url);

    let cache = cache::open_cache(&config.cache).await?;

    let provider = llm::get_model_provider(&config.llm);
    let model = provider
        .as_ref()
        .map(|p| format!("{}/{}", p.provider(), p.model()));
    match &model {
        Some(model) => tracing::info!("Translating queries with {}", model),
        None => tracing::warn!("No LLM API key configured, using heuristic filters only"),
    }

    let samples = SampleFetcher::new(store.clone(), config.store.sample_limit);
    let compiler = FilterCompiler::new(
        SchemaIntrospector::new(store.clone()),
        samples.clone(),
        NlTranslator::new(provider, cache.clone(), config.llm.timeout()),
        HeuristicEngine::with_default_rules(),
        QueryExecutor::new(store, samples),
    );

    Ok(AppContext {
        config,
        compiler,
        cache,
        model,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load .env file if it exists
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let ctx = setup_app_context(cli.config.as_ref()).await?;

    match cli.command {
        Commands::Serve => serve_command(ctx).await,
        Commands::Compile {
            table,
            query,
            execute,
        } => compile_command(ctx, table, query, execute).await,
        Commands::Execute {
            table,
            expression,
            expression_file,
            cursor,
            num_items,
            sort,
            direction,
        } => {
            let expression = read_expression(expression, expression_file)?;
            let sort = match sort {
                Some(field) => {
                    let direction: SortDirection =
                        direction.parse().map_err(|e: String| anyhow::anyhow!(e))?;
                    Some(SortConfig::new(field, direction))
                }
                None => None,
            };
            let pagination = PaginationOpts {
                cursor,
                num_items: num_items.unwrap_or(ctx.config.store.page_size),
            };
            let result = ctx
                .compiler
                .executor()
                .execute(&table, &expression, pagination, sort.as_ref())
                .await?;
            print_json(&result)
        }
        Commands::Fields { table } => {
            let fields = ctx.compiler.schema().get_fields(&table).await?;
            print_json(&fields)
        }
        Commands::Indexes { table } => {
            let indexes = ctx.compiler.schema().selectable_indexes(&table).await?;
            print_json(&indexes)
        }
    }
}

async fn serve_command(ctx: AppContext) -> Result<()> {
    let addr = format!("0.0.0.0:{}", ctx.config.server.port);
    tracing::info!("Starting filter API server on {}", addr);

    if ctx.config.cache.ttl().is_some() {
        let purge = CachePurgeService::new(ctx.cache.clone(), ctx.config.cache.purge_interval());
        tokio::spawn(purge.run());
    }

    let state = Arc::new(AppState {
        compiler: ctx.compiler,
        tracker: RequestTracker::new(),
        page_size: ctx.config.store.page_size,
        model: ctx.model,
    });

    Server::new(TcpListener::bind(&addr))
        .run(server::routes(state))
        .await
        .context("API server failed")
}

async fn compile_command(ctx: AppContext, table: String, query: String, execute: bool) -> Result<()> {
    let intent = Intent::NaturalLanguage { table, query };
    if !execute {
        let compiled = ctx.compiler.compile(&intent).await?;
        return print_json(&compiled);
    }

    let (compiled, result) = ctx
        .compiler
        .compile_and_execute(&intent, PaginationOpts::first(ctx.config.store.page_size))
        .await?;
    print_json(&compiled)?;
    print_json(&result?)
}

fn read_expression(inline: Option<String>, file: Option<PathBuf>) -> Result<FilterExpression> {
    let json = match (inline, file) {
        (Some(json), _) => json,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read expression file {}", path.display()))?,
        (None, None) => return Ok(FilterExpression::default()),
    };
    serde_json::from_str(&json).context("Failed to parse filter expression")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

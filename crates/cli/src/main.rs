mod config;
mod output;
mod stream;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use packetview_api::{PaginationChange, SearchChange};
use packetview_api_client::ApiClient;
use packetview_core::{ControllerOptions, EventBus, SessionListController, SortModifier};
use packetview_runtime_config::ViewerConfig;
use tracing::debug;

#[derive(Parser)]
#[command(
    name = "packetview",
    about = "Browse a capture viewer's session list from the terminal"
)]
struct Cli {
    /// Viewer base URL (overrides the config file)
    #[arg(long, global = true)]
    server: Option<String>,

    /// View id the table state is stored under
    #[arg(long, global = true)]
    view: Option<String>,

    /// Log controller activity to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Default)]
struct SearchArgs {
    /// Search expression, e.g. `ip.src == 10.0.0.1`
    #[arg(short, long)]
    expression: Option<String>,

    /// Hours back from now; -1 searches all time
    #[arg(long, allow_hyphen_values = true)]
    date: Option<i64>,

    /// Window start in epoch seconds
    #[arg(long)]
    start_time: Option<i64>,

    /// Window end in epoch seconds
    #[arg(long)]
    stop_time: Option<i64>,

    /// 1-based page number
    #[arg(long, default_value_t = 1)]
    page: u32,

    /// Rows per page
    #[arg(long)]
    length: Option<u32>,

    /// Show the detail of every row
    #[arg(long)]
    open_all: bool,

    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Search sessions and print one page
    List {
        #[command(flatten)]
        search: SearchArgs,
    },

    /// Sort by one or more columns; the first replaces the sort unless --shift
    Sort {
        #[arg(required = true)]
        fields: Vec<String>,

        /// Add every field as a further sort key
        #[arg(long)]
        shift: bool,

        #[command(flatten)]
        search: SearchArgs,
    },

    /// Show or hide columns
    Toggle {
        #[arg(required = true)]
        fields: Vec<String>,

        #[command(flatten)]
        search: SearchArgs,
    },

    /// List the visible columns and sort keys
    Columns,

    /// Export unique values of a field
    Unique {
        field: String,

        /// Include a count per value
        #[arg(long, default_value_t = 0)]
        counts: u32,
    },

    /// Read events as JSON lines from stdin and print rebroadcasts
    Events,

    /// Show or set configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective config
    Show,
    /// Update config values
    Set {
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        view_id: Option<String>,
        #[arg(long)]
        page_length: Option<u32>,
        #[arg(long)]
        timeout_secs: Option<u64>,
        #[arg(long)]
        open_all: Option<bool>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let overrides = config::Overrides {
        server: cli.server,
        view: cli.view,
        ..config::Overrides::default()
    };

    match cli.command {
        Commands::Config { action } => match action {
            None | Some(ConfigAction::Show) => config::show_config(),
            Some(ConfigAction::Set {
                url,
                view_id,
                page_length,
                timeout_secs,
                open_all,
            }) => {
                let updates = config::Overrides {
                    server: url,
                    view: view_id,
                    page_length,
                    timeout_secs,
                };
                if updates.is_empty() && open_all.is_none() {
                    bail!("nothing to set; see `packetview config set --help`");
                }
                config::set_config(&updates, open_all)
            }
        },
        Commands::List { search } => {
            let cfg = effective_config(&overrides, &search)?;
            let (controller, _bus) = open(&cfg, controller_options(&cfg, &search)?).await?;
            finish(controller, search.json).await
        }
        Commands::Sort {
            fields,
            shift,
            search,
        } => {
            let cfg = effective_config(&overrides, &search)?;
            let (mut controller, _bus) = open(&cfg, controller_options(&cfg, &search)?).await?;
            for (i, field) in fields.iter().enumerate() {
                let modifier = if shift || i > 0 {
                    SortModifier::Shift
                } else {
                    SortModifier::Plain
                };
                controller.sort_by(field, modifier);
            }
            finish(controller, search.json).await
        }
        Commands::Toggle { fields, search } => {
            let cfg = effective_config(&overrides, &search)?;
            let (mut controller, _bus) = open(&cfg, controller_options(&cfg, &search)?).await?;
            for field in &fields {
                controller.toggle_visibility(field);
            }
            finish(controller, search.json).await
        }
        Commands::Columns => {
            let cfg = effective_config(&overrides, &SearchArgs::default())?;
            let options = view_options(&cfg);
            let (mut controller, _bus) = open(&cfg, options).await?;
            controller.settle().await;
            print!("{}", output::render_columns(&controller));
            Ok(())
        }
        Commands::Unique { field, counts } => {
            let cfg = effective_config(&overrides, &SearchArgs::default())?;
            let options = view_options(&cfg);
            let (mut controller, _bus) = open(&cfg, options).await?;
            let values = controller
                .export_unique(&field, counts)
                .await
                .with_context(|| format!("Failed to export unique values of {field}"))?;
            controller.settle().await;
            print!("{values}");
            Ok(())
        }
        Commands::Events => {
            let cfg = effective_config(&overrides, &SearchArgs::default())?;
            let options = view_options(&cfg);
            let (controller, bus) = open(&cfg, options).await?;
            stream::run_events(controller, bus).await
        }
    }
}

fn effective_config(overrides: &config::Overrides, search: &SearchArgs) -> Result<ViewerConfig> {
    let mut cfg = config::load_config()?;
    let overrides = config::Overrides {
        page_length: search.length,
        ..overrides.clone()
    };
    overrides.apply(&mut cfg);
    Ok(cfg)
}

async fn open(
    cfg: &ViewerConfig,
    options: ControllerOptions,
) -> Result<(SessionListController<ApiClient>, EventBus)> {
    let client = ApiClient::new(&cfg.server.url, Duration::from_secs(cfg.server.timeout_secs))
        .context("Failed to build HTTP client")?;
    debug!(url = client.base_url(), view = %options.view_id, "opening session list");
    let bus = EventBus::default();
    let controller = SessionListController::init(Arc::new(client), &bus, options).await;
    Ok((controller, bus))
}

fn view_options(cfg: &ViewerConfig) -> ControllerOptions {
    ControllerOptions {
        view_id: cfg.view.view_id.clone(),
        page_length: cfg.view.page_length,
        open_all: cfg.view.open_all,
        ..ControllerOptions::default()
    }
}

/// Controller options for `cfg`, with the search flags folded into the
/// first search.
fn controller_options(cfg: &ViewerConfig, search: &SearchArgs) -> Result<ControllerOptions> {
    if search.page == 0 {
        bail!("--page starts at 1");
    }
    let length = cfg.view.page_length;
    let pagination = if search.page > 1 {
        let Some(start) = (search.page - 1).checked_mul(length) else {
            bail!("--page {} is too large for {length} rows per page", search.page);
        };
        Some(PaginationChange {
            length,
            current_page: search.page,
            start,
        })
    } else {
        None
    };
    let base = view_options(cfg);
    Ok(ControllerOptions {
        open_all: search.open_all || base.open_all,
        search: SearchChange {
            start: search.start_time,
            stop: search.stop_time,
            expression: search.expression.clone(),
            date: search.date,
        },
        pagination,
        ..base
    })
}

async fn finish(mut controller: SessionListController<ApiClient>, json: bool) -> Result<()> {
    controller.settle().await;
    if json {
        println!("{}", output::render_json(&controller)?);
    } else {
        print!("{}", output::render_table(&controller));
    }
    if let Some(err) = controller.last_error() {
        bail!("session search failed: {err}");
    }
    Ok(())
}

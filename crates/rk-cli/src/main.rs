//! resource-keeper CLI
//!
//! Registers SSH hosts (bootstrapping key trust on the way in), keeps their
//! inventory entries current, and manages uploaded packages.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use resource_keeper::commands;
use rk_core::{
    HostDraft, HostFilter, HostId, ListQuery, PackageFilter, PackageId, PackagePatch,
    RequestContext, SortOrder,
};
use rk_resource::ResourceState;

#[derive(Parser)]
#[command(name = "rk")]
#[command(author, version, about = "Host and package resource keeper")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage SSH hosts
    Host {
        #[command(subcommand)]
        action: HostAction,
    },

    /// Manage uploaded packages
    Package {
        #[command(subcommand)]
        action: PackageAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum HostAction {
    /// Register a host after establishing key trust
    Add(HostArgs),

    /// Re-verify trust and replace a host's settings
    Update {
        id: i64,
        #[command(flatten)]
        host: HostArgs,
    },

    /// Delete a host and its inventory entry
    #[command(alias = "rm")]
    Remove { id: i64 },

    /// Rewrite a host's inventory entry
    Export { id: i64 },

    /// Show one host
    Show { id: i64 },

    /// List registered hosts
    #[command(alias = "ls")]
    List {
        #[command(flatten)]
        filter: HostFilterArgs,
        #[command(flatten)]
        page: PageArgs,
    },
}

#[derive(Args)]
struct HostArgs {
    /// Unique display name
    #[arg(long)]
    name: String,
    /// Category label
    #[arg(long, default_value = "")]
    label: String,
    /// IP address or hostname
    #[arg(long)]
    address: String,
    /// SSH port
    #[arg(long, default_value_t = rk_core::DEFAULT_SSH_PORT)]
    port: u16,
    /// Login user
    #[arg(long)]
    user: String,
    /// Remote interpreter recorded in the inventory entry
    #[arg(long)]
    interpreter: Option<String>,
    /// Free-text remark
    #[arg(long, default_value = "")]
    remark: String,
    /// Login password, used only when key authentication fails
    #[arg(long, env = "RK_SSH_PASSWORD", hide_env_values = true)]
    password: String,
}

impl HostArgs {
    fn into_parts(self) -> (HostDraft, String) {
        let draft = HostDraft {
            name: self.name,
            label: self.label,
            address: self.address,
            port: self.port,
            username: self.user,
            interpreter: self.interpreter,
            remark: self.remark,
        };
        (draft, self.password)
    }
}

#[derive(Args)]
struct HostFilterArgs {
    /// Name contains
    #[arg(long)]
    name: Option<String>,
    /// Exact label
    #[arg(long)]
    label: Option<String>,
    /// Exact address
    #[arg(long)]
    address: Option<String>,
    /// Exact port
    #[arg(long)]
    port: Option<u16>,
    /// User contains
    #[arg(long)]
    user: Option<String>,
    /// Created at or after (RFC 3339)
    #[arg(long)]
    created_after: Option<DateTime<Utc>>,
    /// Created at or before (RFC 3339)
    #[arg(long)]
    created_before: Option<DateTime<Utc>>,
    /// Updated at or after (RFC 3339)
    #[arg(long)]
    updated_after: Option<DateTime<Utc>>,
    /// Updated at or before (RFC 3339)
    #[arg(long)]
    updated_before: Option<DateTime<Utc>>,
}

impl From<HostFilterArgs> for HostFilter {
    fn from(args: HostFilterArgs) -> Self {
        Self {
            name: args.name,
            label: args.label,
            address: args.address,
            port: args.port,
            username: args.user,
            created_after: args.created_after,
            created_before: args.created_before,
            updated_after: args.updated_after,
            updated_before: args.updated_before,
        }
    }
}

#[derive(Args)]
struct PageArgs {
    /// Page number, starting at 1
    #[arg(long, default_value_t = rk_core::query::DEFAULT_PAGE)]
    page: u32,
    /// Items per page
    #[arg(long, default_value_t = rk_core::query::DEFAULT_PAGE_SIZE)]
    size: u32,
    /// Newest first
    #[arg(long)]
    desc: bool,
}

impl From<PageArgs> for ListQuery {
    fn from(args: PageArgs) -> Self {
        let order = if args.desc {
            SortOrder::Desc
        } else {
            SortOrder::Asc
        };
        ListQuery::new(args.page, args.size).order(order)
    }
}

#[derive(Subcommand)]
enum PackageAction {
    /// Upload a file as a new package
    #[command(disable_version_flag = true)]
    Upload {
        file: PathBuf,
        /// Category label
        #[arg(long)]
        label: String,
        /// Version string
        #[arg(long)]
        version: String,
    },

    /// Delete a package and its stored file
    #[command(alias = "rm")]
    Remove { id: i64 },

    /// Show one package
    Show { id: i64 },

    /// Save a package's content locally
    Download {
        id: i64,
        /// Target path (defaults to the original file name)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Change a package's label or version
    #[command(disable_version_flag = true)]
    Update {
        id: i64,
        #[arg(long)]
        label: Option<String>,
        #[arg(long)]
        version: Option<String>,
    },

    /// List packages
    #[command(alias = "ls", disable_version_flag = true)]
    List {
        /// Exact label
        #[arg(long)]
        label: Option<String>,
        /// Version contains
        #[arg(long)]
        version: Option<String>,
        /// Uploaded at or after (RFC 3339)
        #[arg(long)]
        uploaded_after: Option<DateTime<Utc>>,
        /// Uploaded at or before (RFC 3339)
        #[arg(long)]
        uploaded_before: Option<DateTime<Utc>>,
        #[command(flatten)]
        page: PageArgs,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
    /// Show current configuration
    Show,
    /// Show config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    let config_path = cli.config.as_ref();

    let action = match cli.command {
        Commands::Config { action } => {
            return match action {
                ConfigAction::Init { force } => commands::config_init(config_path, force),
                ConfigAction::Show => commands::config_show(config_path),
                ConfigAction::Path => commands::config_path(config_path),
            };
        }
        other => other,
    };

    let config = commands::load_resource_config(config_path)?;
    let state = ResourceState::open(config)
        .await
        .context("Failed to open resource storage")?;

    // Ctrl-C cancels whatever request is in flight
    let token = CancellationToken::new();
    let ctx = RequestContext::with_token(token.clone());
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            token.cancel();
        }
    });

    tracing::debug!(trace_id = %ctx.trace_id(), "Handling command");

    match action {
        Commands::Host { action } => run_host(&state, &ctx, action).await,
        Commands::Package { action } => run_package(&state, &ctx, action).await,
        Commands::Config { .. } => Ok(()),
    }
}

async fn run_host(state: &ResourceState, ctx: &RequestContext, action: HostAction) -> Result<()> {
    match action {
        HostAction::Add(args) => {
            let (draft, password) = args.into_parts();
            commands::host_add(state, ctx, &draft, &password).await
        }
        HostAction::Update { id, host } => {
            let (draft, password) = host.into_parts();
            commands::host_update(state, ctx, HostId(id), &draft, &password).await
        }
        HostAction::Remove { id } => commands::host_remove(state, ctx, HostId(id)).await,
        HostAction::Export { id } => commands::host_export(state, ctx, HostId(id)).await,
        HostAction::Show { id } => commands::host_show(state, ctx, HostId(id)).await,
        HostAction::List { filter, page } => {
            commands::host_list(state, ctx, &filter.into(), &page.into()).await
        }
    }
}

async fn run_package(
    state: &ResourceState,
    ctx: &RequestContext,
    action: PackageAction,
) -> Result<()> {
    match action {
        PackageAction::Upload {
            file,
            label,
            version,
        } => commands::package_upload(state, ctx, &file, label, version).await,
        PackageAction::Remove { id } => commands::package_remove(state, ctx, PackageId(id)).await,
        PackageAction::Show { id } => commands::package_show(state, ctx, PackageId(id)).await,
        PackageAction::Download { id, output } => {
            commands::package_download(state, ctx, PackageId(id), output).await
        }
        PackageAction::Update {
            id,
            label,
            version,
        } => {
            let patch = PackagePatch { label, version };
            commands::package_update(state, ctx, PackageId(id), &patch).await
        }
        PackageAction::List {
            label,
            version,
            uploaded_after,
            uploaded_before,
            page,
        } => {
            let filter = PackageFilter {
                label,
                version,
                uploaded_after,
                uploaded_before,
            };
            commands::package_list(state, ctx, &filter, &page.into()).await
        }
    }
}

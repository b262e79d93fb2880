use crate::demo::{register_home, LocalBroker, DEMO_ROUTES};
use crate::dispatcher::{ControllerRegistry, Dispatcher};
use crate::router::{CompileMode, RouteTable, RouteTableBuilder};
use crate::runtime_config::ServerConfig;
use crate::server::{AppService, HttpServer};
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Command-line interface for corkrouter
#[derive(Parser, Debug)]
#[command(name = "corkrouter")]
#[command(about = "Embedded HTTP router with static file streaming", long_about = None)]
pub struct Cli {
    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the demo application, or the routes from a routes file
    Serve {
        /// Address and port to bind the server to
        #[arg(long)]
        addr: Option<String>,

        /// YAML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory served for GET requests no route matches
        #[arg(long)]
        public_dir: Option<PathBuf>,

        /// Index file for directory requests (e.g. index.html)
        #[arg(long)]
        index: Option<String>,

        /// File of route lines; the demo routes are used when absent
        #[arg(short, long)]
        routes: Option<PathBuf>,

        /// Fail on malformed route templates instead of matching them literally
        #[arg(long, default_value_t = false)]
        strict: bool,
    },
    /// Compile a routes file and print the resulting table
    Routes {
        /// File of route lines
        #[arg(short, long)]
        routes: PathBuf,

        /// Fail on malformed route templates instead of matching them literally
        #[arg(long, default_value_t = false)]
        strict: bool,
    },
}

/// Execute the CLI command provided by the user
///
/// # Errors
///
/// Returns an error if:
/// - The configuration or routes file cannot be read
/// - A route fails to compile in strict mode
/// - The server fails to bind
pub async fn run_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Serve {
            addr,
            config,
            public_dir,
            index,
            routes,
            strict,
        } => {
            let mut settings = match &config {
                Some(path) => ServerConfig::load(path)?,
                None => ServerConfig::default(),
            };
            settings.apply_env()?;
            if let Some(addr) = addr {
                settings.addr = addr;
            }
            if public_dir.is_some() {
                settings.public_dir = public_dir;
            }
            if index.is_some() {
                settings.public_index = index;
            }
            if routes.is_some() {
                settings.routes_file = routes;
            }
            settings.strict_routes |= strict;
            serve(settings).await
        }
        Commands::Routes { routes, strict } => {
            let mut builder = RouteTable::builder(CompileMode::from_strict(strict));
            add_route_file(&mut builder, &routes)?;
            let table = builder.build();
            for route in table.routes() {
                println!(
                    "{:<8} {:<40} {}",
                    route.method().to_string(),
                    route.path(),
                    route.handler()
                );
            }
            println!("{} route(s)", table.len());
            Ok(())
        }
    }
}

fn add_route_file(builder: &mut RouteTableBuilder, path: &Path) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read routes file {}", path.display()))?;
    builder
        .add_lines(&text)
        .with_context(|| format!("invalid routes file {}", path.display()))?;
    Ok(())
}

/// Build the dispatcher described by `settings` and serve until Ctrl-C.
pub async fn serve(settings: ServerConfig) -> anyhow::Result<()> {
    let broker = Arc::new(LocalBroker::demo());
    let mut builder = RouteTable::builder(settings.compile_mode());
    builder.bind_broker_routes(broker.as_ref())?;
    match &settings.routes_file {
        Some(path) => add_route_file(&mut builder, path)?,
        None => {
            builder.add_lines(DEMO_ROUTES)?;
        }
    }

    let mut controllers = ControllerRegistry::new();
    register_home(&mut controllers);

    let mut dispatcher = Dispatcher::builder(builder.build())
        .controllers(controllers)
        .broker(broker)
        .redirect_mode(settings.redirect_mode)
        .trust_proxy_headers(settings.trust_proxy_headers);
    if let Some(static_files) = settings.static_files() {
        dispatcher = dispatcher.static_files(static_files);
    }

    let service = AppService::new(dispatcher.build()).with_limits(settings.limits());
    let handle = HttpServer(service)
        .start(settings.addr.as_str())
        .await
        .with_context(|| format!("cannot bind {}", settings.addr))?;
    info!(addr = %handle.local_addr(), "corkrouter ready");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    handle.stop().await;
    Ok(())
}

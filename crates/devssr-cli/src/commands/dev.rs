//! `devssr dev` command implementation.
//!
//! Starts both compilers in watch mode and serves:
//!
//! ```text
//! client compiler -> in-memory assets at "/" + hot notifications
//! server compiler -> assets written to disk, module cache purged on done
//! everything else -> render entry evaluated per request
//! ```

use crate::middleware::{AssetMiddleware, AssetOptions, HotMiddleware};
use crate::server::{router, AppState};
use devssr_core::build::{CLIENT_TARGET, SERVER_TARGET};
use devssr_core::hmr::install_client_runtime;
use devssr_core::{
    load_config, CommandEngine, Config, Invalidator, ManifestWriter, ModuleLoader,
    ModuleRegistry, MultiCompiler, NodeRenderEngine, RenderDispatcher, WatchOptions, Watching,
};
use miette::{miette, IntoDiagnostic, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Dev server action.
#[derive(Debug, Clone)]
pub struct DevAction {
    /// Working directory.
    pub cwd: PathBuf,
    /// Explicit config file path (overrides auto-discovery).
    pub config: Option<PathBuf>,
    /// Port to listen on; falls back to the config, then 3000.
    pub port: Option<u16>,
    /// Host to bind to; falls back to the config, then `localhost`.
    pub host: Option<String>,
}

/// Run the dev server until Ctrl+C.
pub async fn run(action: DevAction, config: &Config) -> Result<()> {
    let (source, build) = load_config(&action.cwd, action.config.as_deref()).into_diagnostic()?;
    match &source {
        Some(path) => info!(config = %path.display(), "loaded build config"),
        None => info!("no config file found, using the standard layout"),
    }

    let root = build.root();
    if build.targets.iter().any(|t| t.is_hot()) {
        let runtime = install_client_runtime(&root).into_diagnostic()?;
        debug!(path = %runtime.display(), "hot client runtime installed");
    }
    let port = action.port.unwrap_or_else(|| build.server.port());
    let host = action
        .host
        .clone()
        .unwrap_or_else(|| build.server.host().to_string());
    let entry = build.server.render_entry().to_string();

    let multi = Arc::new(MultiCompiler::new(&build, Arc::new(CommandEngine::new())));
    let client = multi
        .find(CLIENT_TARGET)
        .ok_or_else(|| miette!("build config has no `{CLIENT_TARGET}` target"))?;
    let server = multi
        .find(SERVER_TARGET)
        .ok_or_else(|| miette!("build config has no `{SERVER_TARGET}` target"))?;

    let client_assets = AssetMiddleware::new(
        Arc::clone(&client),
        AssetOptions {
            public_path: Some("/".into()),
            write_to_disk: false,
        },
    );
    let server_assets = AssetMiddleware::new(
        Arc::clone(&server),
        AssetOptions {
            public_path: None,
            write_to_disk: true,
        },
    );
    let hot = HotMiddleware::new(&client);

    if let Some(writer) = ManifestWriter::from_target(client.target(), config.interactive) {
        Arc::new(writer).attach(&client);
    }

    let registry = Arc::new(ModuleRegistry::new(&root));
    Invalidator::new(Arc::clone(&registry)).attach(&server, entry.clone());
    let render = RenderDispatcher::new(
        ModuleLoader::new(registry),
        entry,
        Arc::new(NodeRenderEngine::new(build.server.runtime())),
    );

    let state = Arc::new(AppState {
        hot,
        assets: vec![client_assets, server_assets],
        render,
    });

    let watching = Watching::start(Arc::clone(&multi), WatchOptions::for_config(&build))
        .into_diagnostic()?;

    let host_ip = if host == "localhost" {
        "127.0.0.1".to_string()
    } else {
        host.clone()
    };
    let addr: SocketAddr = format!("{host_ip}:{port}").parse().into_diagnostic()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .into_diagnostic()?;

    info!("app start: http://localhost:{port}");

    let served = axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
            info!("shutting down");
        })
        .await
        .into_diagnostic();

    tokio::task::spawn_blocking(move || watching.close())
        .await
        .into_diagnostic()?;
    served
}

//! HTTP wiring of the development server.
//!
//! ```text
//! GET /__hmr            -> WebSocket change notifications
//! GET /__hmr/client.js  -> browser runtime
//! *                     -> client assets -> server assets -> render
//! ```
//!
//! Asset and render requests wait until every compiler is valid.

use crate::middleware::{AssetMiddleware, HotMiddleware};
use axum::body::Body;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use devssr_core::hmr::{CLIENT_RUNTIME, HMR_CLIENT_PATH, HMR_PATH};
use devssr_core::{RenderContext, RenderDispatcher};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Shared state of every handler.
#[derive(Debug)]
pub struct AppState {
    pub hot: HotMiddleware,
    /// Tried in order before rendering.
    pub assets: Vec<AssetMiddleware>,
    pub render: RenderDispatcher,
}

/// Build the router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(HMR_PATH, get(hmr_websocket))
        .route(HMR_CLIENT_PATH, get(serve_hmr_client))
        .fallback(dispatch)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn hmr_websocket(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| async move { state.hot.serve(socket).await })
}

async fn serve_hmr_client() -> Response {
    (
        [
            (header::CONTENT_TYPE, "application/javascript; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        CLIENT_RUNTIME,
    )
        .into_response()
}

/// Assets first, then server-side render.
async fn dispatch(State(state): State<Arc<AppState>>, req: Request) -> Response {
    for assets in &state.assets {
        assets.wait_valid().await;
    }

    let method = req.method().clone();
    let uri = req.uri().clone();
    let headers = req.headers().clone();

    for assets in &state.assets {
        if let Some(response) = assets.respond(&method, uri.path(), &headers) {
            return response;
        }
    }

    let mut cx = RenderContext::new(method.as_str(), uri.path())
        .with_query(uri.query().map(String::from));
    for (name, value) in &headers {
        if let Ok(value) = value.to_str() {
            cx = cx.with_header(name.as_str(), value);
        }
    }

    let rendered = state.render.respond(&cx).await;
    let status = StatusCode::from_u16(rendered.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let content_type = if status.is_success() {
        "text/html; charset=utf-8"
    } else {
        "text/plain; charset=utf-8"
    };
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(rendered.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::AssetOptions;
    use devssr_core::build::engine::{EngineContext, EngineOutput};
    use devssr_core::build::{BuildConfig, BundleEngine, MultiCompiler, CLIENT_TARGET, SERVER_TARGET};
    use devssr_core::error::{BuildError, RenderError};
    use devssr_core::modules::{Invalidator, ModuleBundle, ModuleLoader, ModuleRegistry};
    use devssr_core::RenderEngine;
    use futures::future::BoxFuture;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    /// Client gets one script; server gets a bundle rendering `v<n>`.
    struct Engine {
        runs: AtomicUsize,
    }

    impl BundleEngine for Engine {
        fn compile(&self, cx: &EngineContext<'_>) -> Result<EngineOutput, BuildError> {
            let files = if cx.target.name == CLIENT_TARGET {
                BTreeMap::from([("assets/client.js".to_string(), b"console.log(1)".to_vec())])
            } else {
                let n = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
                BTreeMap::from([(
                    "index.js".to_string(),
                    format!("exports.default = () => \"<div>v{n}</div>\";").into_bytes(),
                )])
            };
            Ok(EngineOutput {
                files,
                warnings: Vec::new(),
            })
        }
    }

    struct QuoteEngine;

    impl RenderEngine for QuoteEngine {
        fn render<'a>(
            &'a self,
            bundle: &'a ModuleBundle,
            cx: &'a RenderContext,
        ) -> BoxFuture<'a, Result<String, RenderError>> {
            Box::pin(async move {
                if cx.path == "/boom" {
                    return Err(RenderError::Failed("boom".into()));
                }
                let code = &bundle.modules[0].code;
                Ok(code.split('"').nth(1).unwrap_or_default().to_string())
            })
        }
    }

    struct App {
        multi: Arc<MultiCompiler>,
        base: String,
        _dir: tempfile::TempDir,
    }

    /// Serve the standard layout on an ephemeral port, without compiling.
    async fn start() -> App {
        let dir = tempdir().unwrap();
        let config = BuildConfig::standard(dir.path());
        let multi = Arc::new(MultiCompiler::new(
            &config,
            Arc::new(Engine {
                runs: AtomicUsize::new(0),
            }),
        ));
        let client = multi.find(CLIENT_TARGET).unwrap();
        let server = multi.find(SERVER_TARGET).unwrap();

        let registry = Arc::new(ModuleRegistry::new(dir.path()));
        let entry = config.server.render_entry();
        let state = Arc::new(AppState {
            assets: vec![
                AssetMiddleware::new(
                    Arc::clone(&client),
                    AssetOptions {
                        public_path: Some("/".into()),
                        write_to_disk: false,
                    },
                ),
                AssetMiddleware::new(
                    Arc::clone(&server),
                    AssetOptions {
                        public_path: None,
                        write_to_disk: true,
                    },
                ),
            ],
            hot: HotMiddleware::new(&client),
            render: RenderDispatcher::new(
                ModuleLoader::new(Arc::clone(&registry)),
                entry,
                Arc::new(QuoteEngine),
            ),
        });
        Invalidator::new(registry).attach(&server, entry);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });
        App {
            multi,
            base: format!("http://{addr}"),
            _dir: dir,
        }
    }

    async fn run_blocking(multi: &Arc<MultiCompiler>) {
        let multi = Arc::clone(multi);
        tokio::task::spawn_blocking(move || multi.run())
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dev_server_end_to_end() {
        let app = start().await;
        run_blocking(&app.multi).await;
        let base = &app.base;
        let http = reqwest::Client::new();

        let asset = http.get(format!("{base}/assets/client.js")).send().await.unwrap();
        assert_eq!(asset.status(), 200);
        assert_eq!(asset.headers()["cache-control"], "no-cache");
        assert_eq!(asset.text().await.unwrap(), "console.log(1)");

        let runtime = http.get(format!("{base}/__hmr/client.js")).send().await.unwrap();
        assert_eq!(runtime.status(), 200);
        assert!(runtime.text().await.unwrap().contains("/__hmr"));

        let page = http.get(format!("{base}/")).send().await.unwrap();
        assert_eq!(page.status(), 200);
        assert_eq!(page.text().await.unwrap(), "<!DOCTYPE html><div>v1</div>");

        let server = app.multi.find(SERVER_TARGET).unwrap();
        tokio::task::spawn_blocking(move || server.run().map(|_| ()))
            .await
            .unwrap()
            .unwrap();
        let page = http.get(format!("{base}/about?x=1")).send().await.unwrap();
        assert_eq!(page.text().await.unwrap(), "<!DOCTYPE html><div>v2</div>");

        let failed = http.get(format!("{base}/boom")).send().await.unwrap();
        assert_eq!(failed.status(), 500);
        assert_eq!(failed.text().await.unwrap(), "Internal Server Error");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_requests_wait_for_first_build() {
        let app = start().await;
        let url = format!("{}/", app.base);
        let pending = tokio::spawn(async move { reqwest::get(url).await.unwrap() });

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(!pending.is_finished());

        run_blocking(&app.multi).await;
        let page = tokio::time::timeout(std::time::Duration::from_secs(5), pending)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(page.status(), 200);
        assert_eq!(page.text().await.unwrap(), "<!DOCTYPE html><div>v1</div>");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_requests_wait_during_rebuild() {
        let app = start().await;
        run_blocking(&app.multi).await;
        app.multi.invalidate(&[std::path::PathBuf::from("src/App.js")]);

        let url = format!("{}/", app.base);
        let pending = tokio::spawn(async move { reqwest::get(url).await.unwrap() });
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(!pending.is_finished());

        run_blocking(&app.multi).await;
        let page = pending.await.unwrap();
        assert_eq!(page.text().await.unwrap(), "<!DOCTYPE html><div>v2</div>");
    }
}

//! Server-side render dispatch.
//!
//! Every request that no asset handler claims is rendered by the server
//! bundle's default export. The bundle is loaded through the module cache,
//! so a purge after a rebuild makes the next request see the new code.

pub mod node;

pub use node::NodeRenderEngine;

use crate::error::RenderError;
use crate::modules::{ModuleBundle, ModuleLoader};
use futures::future::BoxFuture;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::error;

/// Document prefix added to every rendered page.
pub const DOCTYPE: &str = "<!DOCTYPE html>";

/// Body sent when rendering fails.
pub const RENDER_FAILURE_BODY: &str = "Internal Server Error";

/// The request handed to the render function.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RenderContext {
    pub method: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    pub headers: BTreeMap<String, String>,
}

impl RenderContext {
    #[must_use]
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_query(mut self, query: Option<String>) -> Self {
        self.query = query;
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Path plus query string.
    #[must_use]
    pub fn url(&self) -> String {
        match &self.query {
            Some(q) => format!("{}?{q}", self.path),
            None => self.path.clone(),
        }
    }
}

/// Evaluates a loaded server bundle.
pub trait RenderEngine: Send + Sync {
    /// Call the bundle's default export with `cx` and return its markup.
    fn render<'a>(
        &'a self,
        bundle: &'a ModuleBundle,
        cx: &'a RenderContext,
    ) -> BoxFuture<'a, Result<String, RenderError>>;
}

/// Status and body of a render response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderResponse {
    pub status: u16,
    pub body: String,
}

/// Loads the server bundle and renders requests with it.
#[derive(Clone)]
pub struct RenderDispatcher {
    loader: ModuleLoader,
    entry: String,
    engine: Arc<dyn RenderEngine>,
}

impl std::fmt::Debug for RenderDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderDispatcher")
            .field("entry", &self.entry)
            .finish_non_exhaustive()
    }
}

impl RenderDispatcher {
    /// `entry` is resolved from the registry root.
    #[must_use]
    pub fn new(loader: ModuleLoader, entry: impl Into<String>, engine: Arc<dyn RenderEngine>) -> Self {
        Self {
            loader,
            entry: entry.into(),
            engine,
        }
    }

    #[must_use]
    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Render a full HTML document.
    ///
    /// # Errors
    /// Returns an error if the bundle cannot be loaded or rendering fails.
    pub async fn render(&self, cx: &RenderContext) -> Result<String, RenderError> {
        // Loading reads files and may wait on a purge holding the gate.
        let loader = self.loader.clone();
        let entry = self.entry.clone();
        let bundle = tokio::task::spawn_blocking(move || {
            let root = loader.registry().root().to_path_buf();
            loader.bundle(&entry, &root)
        })
        .await
        .map_err(|e| RenderError::Failed(e.to_string()))??;
        let html = self.engine.render(&bundle, cx).await?;
        Ok(format!("{DOCTYPE}{html}"))
    }

    /// Render, mapping failures to a logged 500.
    pub async fn respond(&self, cx: &RenderContext) -> RenderResponse {
        match self.render(cx).await {
            Ok(body) => RenderResponse { status: 200, body },
            Err(e) => {
                error!(path = %cx.path, error = %e, "render failed");
                RenderResponse {
                    status: 500,
                    body: RENDER_FAILURE_BODY.to_string(),
                }
            }
        }
    }
}

//! Serves a compiler's in-memory assets.

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Method, Response, StatusCode};
use devssr_core::build::Compiler;
use devssr_util::hash::etag;
use std::sync::Arc;
use tracing::{debug, error};

/// Options of an [`AssetMiddleware`].
#[derive(Debug, Clone, Default)]
pub struct AssetOptions {
    /// URL prefix the assets are served under; defaults to the target's.
    pub public_path: Option<String>,
    /// Also write every new asset set to the output directory.
    pub write_to_disk: bool,
}

/// Serves the current asset set of one compiler.
#[derive(Debug, Clone)]
pub struct AssetMiddleware {
    compiler: Arc<Compiler>,
    prefix: String,
}

impl AssetMiddleware {
    /// Create the adapter, tapping `emit` when writing to disk.
    pub fn new(compiler: Arc<Compiler>, options: AssetOptions) -> Self {
        let public_path = options
            .public_path
            .unwrap_or_else(|| compiler.target().output.public_path.clone());

        if options.write_to_disk {
            compiler.hooks().emit.tap("write-to-disk", |set| {
                match set.write_to_disk() {
                    Ok(count) => debug!(
                        files = count,
                        dir = %set.output_path().display(),
                        "assets written to disk"
                    ),
                    Err(e) => error!(error = %e, "failed to write assets to disk"),
                }
            });
        }

        Self {
            compiler,
            prefix: public_pathname(&public_path),
        }
    }

    /// Wait until the compiler is not mid-build.
    pub async fn wait_valid(&self) {
        self.compiler.wait_valid().await;
    }

    /// Path prefix stripped from request paths.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Output file a request path names, if it is under the prefix.
    fn file_for<'a>(&self, path: &'a str) -> Option<&'a str> {
        let rest = path.strip_prefix(self.prefix.as_str())?;
        let rest = rest.trim_start_matches('/');
        (!rest.is_empty()).then_some(rest)
    }

    /// Answer a request if it names a current asset.
    pub fn respond(&self, method: &Method, path: &str, headers: &HeaderMap) -> Option<Response<Body>> {
        if method != Method::GET && method != Method::HEAD {
            return None;
        }
        let file = self.file_for(path)?;
        let assets = self.compiler.assets();
        let bytes = assets.get(file)?;

        let tag = etag(bytes);
        let builder = Response::builder()
            .header(header::CACHE_CONTROL, "no-cache")
            .header(header::ETAG, &tag);

        let fresh = headers
            .get(header::IF_NONE_MATCH)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.split(',').any(|t| t.trim() == tag || t.trim() == "*"));
        if fresh {
            return builder.status(StatusCode::NOT_MODIFIED).body(Body::empty()).ok();
        }

        let body = if method == Method::HEAD {
            Body::empty()
        } else {
            Body::from(bytes.to_vec())
        };
        builder
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, HeaderValue::from_static(content_type(file)))
            .header(header::CONTENT_LENGTH, bytes.len())
            .body(body)
            .ok()
    }
}

/// Path part of a public path: `http://cdn.cn/static/` becomes `/static/`.
pub fn public_pathname(public_path: &str) -> String {
    let path = match public_path.find("://") {
        Some(idx) => {
            let after = &public_path[idx + 3..];
            after.find('/').map_or("/", |slash| &after[slash..])
        }
        None => public_path,
    };
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// Content type by file extension.
pub fn content_type(file: &str) -> &'static str {
    let ext = file.rsplit_once('.').map_or("", |(_, ext)| ext);
    match ext {
        "js" | "mjs" | "cjs" => "application/javascript; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "html" => "text/html; charset=utf-8",
        "json" | "map" => "application/json; charset=utf-8",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "bmp" | "bpm" => "image/bmp",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "txt" => "text/plain; charset=utf-8",
        "wasm" => "application/wasm",
        _ => "application/octet-stream",
    }
}

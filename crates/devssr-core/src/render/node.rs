//! Render engine backed by a JavaScript runtime process.
//!
//! Each render spawns `node -e <bootstrap>`, writes the module snapshot and
//! the request context as one JSON document on stdin, and reads a JSON
//! reply from the last line of stdout.

use super::{RenderContext, RenderEngine};
use crate::error::RenderError;
use crate::modules::{CachedModule, ModuleBundle};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Evaluates the snapshot with a private module table.
///
/// Snapshot modules are evaluated with the CommonJS wrapper; anything not
/// in the table (externals) goes through the runtime's own `require`
/// relative to the requiring module.
pub const BOOTSTRAP: &str = r#"
const { createRequire } = require('module');
const path = require('path');
let input = '';
process.stdin.setEncoding('utf8');
process.stdin.on('data', (chunk) => { input += chunk; });
process.stdin.on('end', async () => {
  const reply = (value) => process.stdout.write('\n' + JSON.stringify(value) + '\n');
  try {
    const { entry, modules, context } = JSON.parse(input);
    const table = new Map(modules.map((m) => [m.id, m]));
    const loaded = new Map();
    const load = (id) => {
      if (loaded.has(id)) return loaded.get(id).exports;
      const source = table.get(id);
      const module = { id, exports: {} };
      loaded.set(id, module);
      if (id.endsWith('.json')) {
        module.exports = JSON.parse(source.code);
        return module.exports;
      }
      const fallback = createRequire(id);
      const local = (spec) =>
        Object.prototype.hasOwnProperty.call(source.requires, spec)
          ? load(source.requires[spec])
          : fallback(spec);
      const fn = new Function('exports', 'require', 'module', '__filename', '__dirname', source.code);
      fn(module.exports, local, module, id, path.dirname(id));
      return module.exports;
    };
    const exported = load(entry);
    const render = typeof exported === 'function' ? exported : exported && exported.default;
    if (typeof render !== 'function') {
      throw new Error('server bundle has no default export function');
    }
    const html = await render(context);
    reply({ ok: true, html: String(html) });
  } catch (err) {
    reply({ ok: false, error: err && err.stack ? String(err.stack) : String(err) });
  }
});
"#;

#[derive(Serialize)]
struct Request<'a> {
    entry: &'a Path,
    modules: &'a [Arc<CachedModule>],
    context: &'a RenderContext,
}

#[derive(Debug, Deserialize)]
struct Reply {
    ok: bool,
    #[serde(default)]
    html: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Renders by running the bundle in a fresh runtime process.
#[derive(Debug, Clone)]
pub struct NodeRenderEngine {
    program: String,
}

impl Default for NodeRenderEngine {
    fn default() -> Self {
        Self::new("node")
    }
}

impl NodeRenderEngine {
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    async fn run(&self, bundle: &ModuleBundle, cx: &RenderContext) -> Result<String, RenderError> {
        let payload = serde_json::to_vec(&Request {
            entry: &bundle.entry,
            modules: &bundle.modules,
            context: cx,
        })
        .map_err(|e| RenderError::Protocol(e.to_string()))?;

        let mut child = Command::new(&self.program)
            .arg("-e")
            .arg(BOOTSTRAP)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RenderError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&payload).await.map_err(RenderError::Io)?;
            stdin.shutdown().await.map_err(RenderError::Io)?;
        }

        let output = child.wait_with_output().await.map_err(RenderError::Io)?;
        debug!(
            status = ?output.status.code(),
            stdout = output.stdout.len(),
            "render process exited"
        );
        parse_reply(&output.stdout, &output.stderr)
    }
}

/// Interpret the process output; the reply is the last non-empty line.
fn parse_reply(stdout: &[u8], stderr: &[u8]) -> Result<String, RenderError> {
    let stdout = String::from_utf8_lossy(stdout);
    let line = stdout.lines().rev().find(|l| !l.trim().is_empty());
    let reply = match line.map(serde_json::from_str::<Reply>) {
        Some(Ok(reply)) => reply,
        _ => {
            let stderr = String::from_utf8_lossy(stderr);
            return Err(RenderError::Protocol(format!(
                "no reply from render process: {}",
                stderr.trim()
            )));
        }
    };
    if reply.ok {
        Ok(reply.html.unwrap_or_default())
    } else {
        Err(RenderError::Failed(
            reply.error.unwrap_or_else(|| "unknown error".to_string()),
        ))
    }
}

impl RenderEngine for NodeRenderEngine {
    fn render<'a>(
        &'a self,
        bundle: &'a ModuleBundle,
        cx: &'a RenderContext,
    ) -> BoxFuture<'a, Result<String, RenderError>> {
        Box::pin(self.run(bundle, cx))
    }
}

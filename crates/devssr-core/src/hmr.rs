//! Change notifications pushed to connected browsers.

use crate::build::config::STAGING_DIR;
use crate::build::Stats;
use crate::error::Error;
use devssr_util::fs::atomic_write;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// WebSocket endpoint browsers connect to.
pub const HMR_PATH: &str = "/__hmr";
/// Path the browser runtime is served from.
pub const HMR_CLIENT_PATH: &str = "/__hmr/client.js";
/// File name of the runtime bundled into hot client entries.
pub const HMR_CLIENT_FILE: &str = "hmr-client.js";

/// A message sent to every connected browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HotMessage {
    /// Sent once when a socket opens.
    Connected,
    /// A compiler started rebuilding.
    Building { name: String },
    /// A compiler finished.
    Built {
        name: String,
        hash: String,
        time: u64,
        errors: Vec<String>,
        warnings: Vec<String>,
    },
    /// A compiler failed.
    Error { name: String, message: String },
}

impl HotMessage {
    #[must_use]
    pub fn built(stats: &Stats) -> Self {
        Self::Built {
            name: stats.name.clone(),
            hash: stats.hash.clone(),
            time: stats.time_ms,
            errors: stats.errors.clone(),
            warnings: stats.warnings.clone(),
        }
    }

    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"type":"connected"}"#.to_string())
    }
}

/// Browser runtime: reloads the page when a new client build lands.
pub const CLIENT_RUNTIME: &str = r"
(function () {
  const hashes = new Map();
  let connected = false;

  function connect() {
    const proto = location.protocol === 'https:' ? 'wss' : 'ws';
    const ws = new WebSocket(`${proto}://${location.host}/__hmr`);

    ws.onopen = () => {
      connected = true;
    };

    ws.onmessage = (event) => {
      const msg = JSON.parse(event.data);
      switch (msg.type) {
        case 'connected':
          console.log('[devssr] connected.');
          break;
        case 'building':
          console.log(`[devssr] ${msg.name} rebuilding...`);
          break;
        case 'built': {
          for (const w of msg.warnings) console.warn(`[devssr] ${msg.name}: ${w}`);
          if (msg.errors.length) {
            for (const e of msg.errors) console.error(`[devssr] ${msg.name}: ${e}`);
            break;
          }
          const previous = hashes.get(msg.name);
          hashes.set(msg.name, msg.hash);
          if (previous !== undefined && previous !== msg.hash) {
            console.log(`[devssr] ${msg.name} rebuilt in ${msg.time}ms, reloading.`);
            location.reload();
          }
          break;
        }
        case 'error':
          console.error(`[devssr] ${msg.name} failed:\n${msg.message}`);
          break;
      }
    };

    ws.onclose = () => {
      if (connected) {
        connected = false;
        console.log('[devssr] server connection lost, retrying...');
      }
      setTimeout(connect, 1000);
    };
  }

  connect();
})();
";

/// Write [`CLIENT_RUNTIME`] into the staging directory so client entries
/// can bundle it. Returns the written path.
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn install_client_runtime(root: &Path) -> Result<PathBuf, Error> {
    let path = root.join(STAGING_DIR).join(HMR_CLIENT_FILE);
    atomic_write(&path, CLIENT_RUNTIME.as_bytes())?;
    Ok(path)
}

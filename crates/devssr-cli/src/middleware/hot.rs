//! Pushes compiler lifecycle events to browsers over a WebSocket.

use axum::extract::ws::{Message, WebSocket};
use devssr_core::build::Compiler;
use devssr_core::HotMessage;
use tokio::sync::broadcast;
use tracing::debug;

/// Broadcasts `building`, `built` and `error` for one compiler.
#[derive(Debug, Clone)]
pub struct HotMiddleware {
    tx: broadcast::Sender<HotMessage>,
}

impl HotMiddleware {
    /// Tap the compiler's `invalid`, `done` and `failed` hooks.
    pub fn new(compiler: &Compiler) -> Self {
        let (tx, _) = broadcast::channel(16);

        let name = compiler.name().to_string();
        let sender = tx.clone();
        compiler.hooks().invalid.tap("hot", move |_changed| {
            let _ = sender.send(HotMessage::Building { name: name.clone() });
        });

        let sender = tx.clone();
        compiler.hooks().done.tap("hot", move |stats| {
            let _ = sender.send(HotMessage::built(stats));
        });

        let name = compiler.name().to_string();
        let sender = tx.clone();
        compiler.hooks().failed.tap("hot", move |err| {
            let _ = sender.send(HotMessage::Error {
                name: name.clone(),
                message: err.to_string(),
            });
        });

        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HotMessage> {
        self.tx.subscribe()
    }

    /// Number of connected browsers.
    pub fn clients(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Drive one browser connection until either side closes.
    pub async fn serve(&self, mut socket: WebSocket) {
        let mut rx = self.subscribe();

        if socket
            .send(Message::Text(HotMessage::Connected.to_json()))
            .await
            .is_err()
        {
            return;
        }

        loop {
            tokio::select! {
                msg = rx.recv() => match msg {
                    Ok(msg) => {
                        if socket.send(Message::Text(msg.to_json())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "hot client lagging");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                incoming = socket.recv() => match incoming {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devssr_core::build::engine::{EngineContext, EngineOutput};
    use devssr_core::build::{BuildConfig, BundleEngine, MultiCompiler, CLIENT_TARGET};
    use devssr_core::error::BuildError;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    /// Succeeds once, then fails.
    struct OnceEngine(AtomicBool);

    impl BundleEngine for OnceEngine {
        fn compile(&self, cx: &EngineContext<'_>) -> Result<EngineOutput, BuildError> {
            if self.0.swap(true, Ordering::SeqCst) {
                return Err(BuildError::NoCommand {
                    target: cx.target.name.clone(),
                });
            }
            Ok(EngineOutput::default())
        }
    }

    #[test]
    fn test_lifecycle_is_broadcast() {
        let multi = MultiCompiler::new(
            &BuildConfig::standard(Path::new("/p")),
            Arc::new(OnceEngine(AtomicBool::new(false))),
        );
        let client = multi.find(CLIENT_TARGET).unwrap();
        let hot = HotMiddleware::new(&client);
        let mut rx = hot.subscribe();

        client.invalidate(&[PathBuf::from("/p/src/a.js")]);
        client.run().unwrap();
        assert!(client.run().is_err());

        assert_eq!(
            rx.try_recv().unwrap(),
            HotMessage::Building {
                name: "client".into()
            }
        );
        assert!(matches!(rx.try_recv().unwrap(), HotMessage::Built { ref name, .. } if name == "client"));
        assert!(matches!(rx.try_recv().unwrap(), HotMessage::Error { ref name, .. } if name == "client"));
        assert!(rx.try_recv().is_err());
    }
}

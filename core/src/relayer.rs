use crate::{Port, Result, Switch};
use std::convert::Infallible;
use std::sync::Arc;

/// The client-facing side of a relay.
///
/// Yields one session per accepted connection together with the destination
/// the session names.
#[async_trait::async_trait]
pub trait Frontend: Send + Sync {
    async fn accept(&self) -> Result<(Arc<dyn Port>, String)>;
}

/// The peer-facing side of a relay: opens the onward leg of a session.
#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    async fn dial(&self, addr: &str) -> Result<Arc<dyn Port>>;
}

/// Accept loop tying a [`Frontend`] to a [`Backend`].
///
/// Sessions are independent tasks and share no state.
pub struct Relayer<F, B> {
    frontend: F,
    backend: Arc<B>,
}

impl<F, B> Relayer<F, B>
where
    F: Frontend,
    B: Backend + 'static,
{
    pub fn new(frontend: F, backend: B) -> Self {
        Self {
            frontend,
            backend: Arc::new(backend),
        }
    }

    /// Accepts sessions forever. Accept failures are logged and skipped; dial
    /// failures terminate only the affected session.
    pub async fn run(&self) -> Infallible {
        loop {
            let (port, addr) = match self.frontend.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!("failed to accept session: {e}");
                    continue;
                }
            };

            let backend = self.backend.clone();
            tokio::spawn(async move {
                if let Err(e) = relay_session(port, &addr, backend).await {
                    tracing::debug!(%addr, "session ended: {e}");
                }
            });
        }
    }
}

async fn relay_session<B: Backend>(
    frontend_port: Arc<dyn Port>,
    addr: &str,
    backend: Arc<B>,
) -> Result<()> {
    tracing::debug!(%addr, "relaying session");

    let backend_port = match backend.dial(addr).await {
        Ok(port) => port,
        Err(e) => {
            let _ = frontend_port.close();
            return Err(e);
        }
    };

    Switch::new(frontend_port.clone(), backend_port.clone())
        .run()
        .await;

    let _ = frontend_port.close();
    let _ = backend_port.close();

    tracing::debug!(%addr, "session finished");

    Ok(())
}

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::ServiceConfig;
use crate::error::{ConfigError, Result};
use crate::irc::listener::{Dispatcher, ListenerWorker};

/// Owns one accept loop per configured listener address.
pub struct Supervisor {
    workers: JoinSet<()>,
    local_addrs: Vec<SocketAddr>,
    cancel: CancellationToken,
}

impl Supervisor {
    /// Bind every configured listener concurrently and start their accept
    /// loops.
    ///
    /// All bind attempts complete before this returns. If any of them
    /// fails, the first failure in configuration order is returned and the
    /// listeners that did bind are closed again; nothing keeps running.
    pub async fn start(config: Arc<ServiceConfig>, cancel: CancellationToken) -> Result<Self> {
        if config.listeners.is_empty() {
            return Err(ConfigError::MissingListener.into());
        }

        let attempts = join_all(
            config
                .listeners
                .iter()
                .map(|address| ListenerWorker::bind(address)),
        )
        .await;

        let bound = attempts
            .into_iter()
            .collect::<std::result::Result<Vec<_>, _>>()
            .inspect_err(|e| error!(addr = %e.address, error = %e.source, "failed to bind listener"))?;

        let dispatcher = Dispatcher::new(config.max_connections);
        let local_addrs = bound.iter().map(ListenerWorker::local_addr).collect();

        let mut workers = JoinSet::new();
        for worker in bound {
            workers.spawn(worker.run(config.clone(), dispatcher.clone(), cancel.clone()));
        }

        info!(
            listeners = workers.len(),
            max_connections = ?config.max_connections,
            "all listeners started"
        );

        Ok(Self {
            workers,
            local_addrs,
            cancel,
        })
    }

    /// Bound addresses, in configuration order.
    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.local_addrs
    }

    /// Stop accepting new connections on every listener.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Wait for every accept loop to finish. They only finish once the
    /// cancellation token fires.
    pub async fn wait(mut self) {
        while let Some(result) = self.workers.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "listener task failed");
            }
        }
    }
}

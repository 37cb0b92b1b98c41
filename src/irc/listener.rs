use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ServiceConfig;
use crate::error::BindError;

use super::composer::{SessionAddrs, compose};
use super::connection::{SessionPolicy, handle_connection};

/// Spawns one task per accepted connection, optionally capping how many
/// run at once. Clones share the same cap.
#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    limit: Option<Arc<Semaphore>>,
}

impl Dispatcher {
    pub fn new(max_connections: Option<usize>) -> Self {
        Self {
            limit: max_connections.map(|n| Arc::new(Semaphore::new(n))),
        }
    }

    /// Wait until another session may start. Returns immediately when
    /// unbounded.
    async fn reserve(&self) -> Option<OwnedSemaphorePermit> {
        match self.limit {
            Some(ref limit) => limit.clone().acquire_owned().await.ok(),
            None => None,
        }
    }

    /// Run a session in the background, holding `permit` until it ends.
    fn spawn<F>(&self, permit: Option<OwnedSemaphorePermit>, session: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(async move {
            session.await;
            drop(permit);
        });
    }
}

/// A bound listener together with the address it was configured with.
#[derive(Debug)]
pub struct ListenerWorker {
    address: String,
    local_addr: SocketAddr,
    listener: TcpListener,
}

impl ListenerWorker {
    /// Bind the listener. Failure is terminal for this worker.
    pub async fn bind(address: &str) -> Result<Self, BindError> {
        let bind_error = |source| BindError {
            address: address.to_string(),
            source,
        };

        let listener = TcpListener::bind(address).await.map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;

        Ok(Self {
            address: address.to_string(),
            local_addr,
            listener,
        })
    }

    /// The address actually bound; differs from the configured one for port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until `cancel` fires, handing each one to its own
    /// task. Accept errors are logged and do not stop the loop.
    pub async fn run(
        self,
        config: Arc<ServiceConfig>,
        dispatcher: Dispatcher,
        cancel: CancellationToken,
    ) {
        info!(addr = %self.address, local_addr = %self.local_addr, "Listener started successfully");

        loop {
            let permit = tokio::select! {
                _ = cancel.cancelled() => break,
                permit = dispatcher.reserve() => permit,
            };

            let accepted = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.listener.accept() => result,
            };

            match accepted {
                Ok((stream, remote)) => {
                    dispatcher.spawn(permit, serve_session(stream, remote, config.clone()));
                }
                Err(e) => {
                    warn!(addr = %self.address, error = %e, "failed to accept incoming connection");
                }
            }
        }

        info!(addr = %self.address, "Listener stopped");
    }
}

/// Compose the plan for one accepted connection and deliver it.
async fn serve_session(stream: TcpStream, remote: SocketAddr, config: Arc<ServiceConfig>) {
    let local = match stream.local_addr() {
        Ok(addr) => addr,
        Err(e) => {
            warn!(client = %remote, error = %e, "cannot determine local address");
            return;
        }
    };

    let plan = compose(&config, &SessionAddrs { local, remote });
    debug!(client = %remote, lines = plan.lines().len(), "sending introduction");

    let policy = SessionPolicy {
        linger: config.linger,
        timeout: config.session_timeout,
    };
    handle_connection(stream, plan, policy, remote).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Target;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use tokio::time::{Instant, timeout};

    fn config(linger_ms: u64) -> Arc<ServiceConfig> {
        Arc::new(ServiceConfig {
            server_name: "test.example".into(),
            listeners: vec!["127.0.0.1:0".into()],
            introduction: vec!["Hello".into(), "World".into()],
            target: Some(Target::Explicit {
                host: "irc.example.net".into(),
                port: 6669,
            }),
            linger: Duration::from_millis(linger_ms),
            ..ServiceConfig::default()
        })
    }

    const EXPECTED: &str = ":test.example NOTICE * :Hello\r\n\
        :test.example NOTICE * :World\r\n\
        :test.example 010 * irc.example.net 6669 :Port redirect\r\n\
        ERROR :This service is unavailable\r\n";

    async fn start(config: Arc<ServiceConfig>, dispatcher: Dispatcher) -> (SocketAddr, CancellationToken) {
        let worker = ListenerWorker::bind("127.0.0.1:0").await.unwrap();
        let addr = worker.local_addr();
        let cancel = CancellationToken::new();
        tokio::spawn(worker.run(config, dispatcher, cancel.clone()));
        (addr, cancel)
    }

    async fn read_all(addr: SocketAddr) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut received = String::new();
        stream.read_to_string(&mut received).await.unwrap();
        received
    }

    #[tokio::test]
    async fn test_bind_reports_address() {
        let worker = ListenerWorker::bind("127.0.0.1:0").await.unwrap();
        assert_ne!(worker.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn test_bind_occupied_port_fails() {
        let first = ListenerWorker::bind("127.0.0.1:0").await.unwrap();
        let taken = first.local_addr().to_string();

        let err = ListenerWorker::bind(&taken).await.unwrap_err();
        assert_eq!(err.address, taken);
    }

    #[tokio::test]
    async fn test_bind_invalid_address_fails() {
        let err = ListenerWorker::bind("not an address").await.unwrap_err();
        assert_eq!(err.address, "not an address");
    }

    #[tokio::test]
    async fn test_serves_plan_to_client() {
        let (addr, cancel) = start(config(50), Dispatcher::default()).await;

        let received = timeout(Duration::from_secs(5), read_all(addr)).await.unwrap();
        assert_eq!(received, EXPECTED);

        cancel.cancel();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_stalled_peer_does_not_block_others() {
        let linger = Duration::from_millis(300);

        // Roughly 600 KiB per session, far more than the socket buffers hold,
        // so the stalled session stays blocked in write_all.
        let introduction: Vec<String> = (0..5_000).map(|i| format!("{:0>100}", i)).collect();
        let config = Arc::new(ServiceConfig {
            server_name: "test.example".into(),
            listeners: vec!["127.0.0.1:0".into()],
            introduction: introduction.clone(),
            target: None,
            linger,
            session_timeout: Some(Duration::from_secs(30)),
            ..ServiceConfig::default()
        });
        let expected_len: usize = introduction
            .iter()
            .map(|l| ":test.example NOTICE * :\r\n".len() + l.len())
            .sum::<usize>()
            + "ERROR :This service is unavailable\r\n".len();

        let (addr, cancel) = start(config, Dispatcher::default()).await;

        // Connected but never reads.
        let _stalled = TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let started = Instant::now();
        let clients: Vec<_> = (0..10).map(|_| tokio::spawn(read_all(addr))).collect();
        for client in clients {
            let received = timeout(Duration::from_secs(10), client)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(received.len(), expected_len);
            assert!(received.starts_with(":test.example NOTICE * :"));
            assert!(received.ends_with("ERROR :This service is unavailable\r\n"));
        }

        // Served side by side: one linger for all of them, not one each.
        assert!(started.elapsed() < linger * 3);

        cancel.cancel();
    }

    #[tokio::test]
    async fn test_max_connections_serializes_sessions() {
        let linger = Duration::from_millis(300);
        let (addr, cancel) = start(config(300), Dispatcher::new(Some(1))).await;

        let started = Instant::now();
        let first = tokio::spawn(read_all(addr));
        let second = tokio::spawn(read_all(addr));

        assert_eq!(first.await.unwrap(), EXPECTED);
        assert_eq!(second.await.unwrap(), EXPECTED);
        assert!(started.elapsed() >= linger * 2);

        cancel.cancel();
    }

    #[tokio::test]
    async fn test_cancel_stops_accept_loop() {
        let worker = ListenerWorker::bind("127.0.0.1:0").await.unwrap();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(worker.run(config(50), Dispatcher::default(), cancel.clone()));

        cancel.cancel();
        timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_dispatcher_releases_permit_after_session() {
        let dispatcher = Dispatcher::new(Some(1));
        let permit = dispatcher.reserve().await;
        assert!(permit.is_some());

        let (tx, rx) = tokio::sync::oneshot::channel();
        dispatcher.spawn(permit, async move {
            let _ = tx.send(());
        });
        rx.await.unwrap();

        let again = timeout(Duration::from_secs(5), dispatcher.reserve()).await.unwrap();
        assert!(again.is_some());
    }
}

//! Shared fixtures: a template over an in-process store, or over TCP

use std::sync::Arc;
use std::time::Duration;

use kvtemplate::{ClientConfig, KvTemplate, MemoryServer, MemoryStore, RespClient};
use tokio::task::JoinHandle;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt::try_init();
}

/// Template executing directly against a fresh `MemoryStore`
pub fn memory_template() -> KvTemplate {
    init_tracing();
    KvTemplate::new(Arc::new(MemoryStore::new())).with_blocking_grace(Duration::from_millis(500))
}

/// A `MemoryServer` on an ephemeral port plus a connected client
pub struct TcpFixture {
    pub store: MemoryStore,
    pub client: Arc<RespClient>,
    pub template: KvTemplate,
    server: JoinHandle<()>,
}

impl TcpFixture {
    pub async fn start() -> Self {
        init_tracing();
        let store = MemoryStore::new();
        let server = MemoryServer::bind(store.clone(), "127.0.0.1:0")
            .await
            .expect("bind memory server");
        let config = ClientConfig::new(server.local_addr().to_string())
            .with_connect_timeout(Duration::from_secs(2))
            .with_blocking_grace(Duration::from_millis(500));
        let server = server.spawn();
        let client = Arc::new(RespClient::connect(config.clone()).await.expect("connect"));
        let template = KvTemplate::new(client.clone()).with_blocking_grace(config.blocking_grace);
        Self {
            store,
            client,
            template,
            server,
        }
    }
}

impl Drop for TcpFixture {
    fn drop(&mut self) {
        self.server.abort();
    }
}

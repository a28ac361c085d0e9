//! Bee Chat 服务入口
//!
//! 初始化日志、加载配置、组装助手与会话存储，启动 HTTP 服务；Ctrl+C / SIGTERM 时优雅关闭。

use std::sync::Arc;

use anyhow::Context;
use bee_chat::api::{router, AppState};
use bee_chat::config::{load_config, AppConfig};
use bee_chat::core::{
    run_with_graceful_shutdown, ConversationCoordinator, ShutdownCoordinator, ShutdownManager,
};
use bee_chat::memory::{ConversationStore, InMemoryConversationStore};
use bee_chat::{agent::create_agent, observability};

async fn create_store(
    cfg: &AppConfig,
    #[cfg_attr(not(feature = "async-sqlite"), allow(unused_variables))] shutdown: &mut ShutdownCoordinator,
) -> anyhow::Result<Arc<dyn ConversationStore>> {
    match cfg.storage.backend.as_str() {
        #[cfg(feature = "async-sqlite")]
        "sqlite" => {
            let store = bee_chat::memory::SqliteConversationStore::new(&cfg.storage.sqlite_path)
                .await
                .with_context(|| {
                    format!("failed to open {}", cfg.storage.sqlite_path.display())
                })?;
            let store = Arc::new(store);
            shutdown.register(store.clone());
            tracing::info!(path = %cfg.storage.sqlite_path.display(), "using sqlite conversation store");
            Ok(store)
        }
        "memory" => Ok(Arc::new(InMemoryConversationStore::new())),
        other => anyhow::bail!("unsupported storage backend: {other}"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cfg = load_config(None).context("failed to load config")?;

    let manager = Arc::new(ShutdownManager::new());
    let mut shutdown =
        ShutdownCoordinator::new(Arc::clone(&manager)).with_timeout(cfg.server.shutdown_timeout_secs);

    let store = create_store(&cfg, &mut shutdown).await?;
    let assistant = Arc::new(create_agent(&cfg));
    let coordinator =
        ConversationCoordinator::new(assistant, store, cfg.assistant.default_title.clone());
    let app = router(Arc::new(AppState::new(coordinator, manager.token())));

    let listener = tokio::net::TcpListener::bind(&cfg.server.addr)
        .await
        .with_context(|| format!("failed to bind {}", cfg.server.addr))?;
    tracing::info!(addr = %cfg.server.addr, "bee-chat listening");

    let server_manager = Arc::clone(&manager);
    let server = async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_manager.wait_for_shutdown().await })
            .await;
        if let Err(e) = result {
            tracing::error!(error = %e, "server error");
        }
    };

    run_with_graceful_shutdown(&shutdown, server).await;
    tracing::info!("bee-chat stopped");
    Ok(())
}

use std::sync::Arc;
use std::time::Duration;

use sync_server::{
    CatalogDownloadJob, DbService, EventListener, HttpErpGateway, JobQueue, SyncConfig,
    SyncContext,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. 设置环境 (dotenv, 工作目录, 日志)
    dotenv::dotenv().ok();
    let config = SyncConfig::from_env();
    std::fs::create_dir_all(&config.work_dir)?;
    sync_server::utils::init_logger();

    tracing::info!("Catalog sync server starting...");
    tracing::info!(erp_host = %config.erp.host, work_dir = %config.work_dir, "Configuration loaded");

    // 2. 初始化存储和网关
    let db = DbService::new(&config.database_path).await?;
    let gateway = Arc::new(HttpErpGateway::new(config.erp.clone())?);
    let config = Arc::new(config);
    let ctx = SyncContext::new(db, gateway, config.clone());

    // 3. 任务队列和事件监听
    let queue = JobQueue::new();
    let shutdown = queue.shutdown_token();

    let listener = EventListener::new(ctx.clone(), queue.clone(), shutdown.clone());
    tokio::spawn(listener.run());

    // 4. 启动即执行一次全量同步, 之后按配置周期重复
    queue.enqueue(Box::new(CatalogDownloadJob::new(ctx.clone())));

    if config.sync_interval_secs > 0 {
        let interval_ctx = ctx.clone();
        let interval_queue = queue.clone();
        let interval_shutdown = shutdown.clone();
        let period = Duration::from_secs(config.sync_interval_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await; // skip immediate tick
            loop {
                tokio::select! {
                    _ = interval_shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        interval_queue.enqueue(Box::new(CatalogDownloadJob::new(interval_ctx.clone())));
                    }
                }
            }
        });
    }

    // 5. Graceful shutdown on ctrl-c
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    shutdown.cancel();

    Ok(())
}

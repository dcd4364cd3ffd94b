use rfpflow_core::config::AppConfig;

use crate::commands::{block_on, open_store, CommandResult};

pub fn run(config: &AppConfig) -> CommandResult {
    block_on("migrate", async {
        let (pool, _) = open_store(config).await?;
        pool.close().await;
        Ok(CommandResult::success("migrate", "applied pending migrations"))
    })
}

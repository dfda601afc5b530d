use signal_screener::alert::TelegramNotifier;
use signal_screener::storage_utils::{AsyncStorageManager, load_config};
use signal_screener::{analysis, comfy_table};
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Step 1: Storage and config
    let storage = AsyncStorageManager::from_env().await?;
    let config = load_config(&storage).await?;
    log::info!(
        "storage at {}, {} scanner(s) enabled",
        storage.base_dir.display(),
        config.scanners.iter().filter(|s| s.enabled).count()
    );

    // Step 2: Shared HTTP client and notifier
    let client = analysis::build_client(&config.http)?;
    let notifier = TelegramNotifier::from_env(client.clone(), config.telegram.parse_mode.clone());

    // Step 3: Poll
    loop {
        let reports = analysis::run_cycle(&client, &config, &storage, &notifier).await;
        comfy_table::print_reports(&reports);

        if config.poll_interval_secs == 0 {
            break;
        }
        log::info!("next cycle in {}s", config.poll_interval_secs);
        tokio::time::sleep(Duration::from_secs(config.poll_interval_secs)).await;
    }

    Ok(())
}

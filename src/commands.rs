use anyhow::{bail, Context, Result};
use indicatif::HumanBytes;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::{error, info, warn};

use crate::cli::RangeMode;
use crate::config::BenchConfig;
use crate::downloader::{AttemptLimits, DownloadMode, Downloader};
use crate::ledger::RangeLedger;
use crate::model::TransferResult;
use crate::progress::{ConsoleProgress, NoProgress, ProgressSink};
use crate::providers::{self, Network};
use crate::scenario::{self, DownloadProps, Scenario, UploadProps};
use crate::uploader::Uploader;
use crate::utils::{get_unique_filepath, list_to_console_string, sanitize_filename};

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub range_mode: RangeMode,
    pub show_progress: bool,
}

/// Run each named scenario in order. A scenario that fails to load or run is
/// reported and skipped; results of the others are still saved.
pub async fn run_scenarios(config: &BenchConfig, names: &[String], options: RunOptions) -> Result<()> {
    let network = providers::connect(config)?;
    let progress: Arc<dyn ProgressSink> = if options.show_progress {
        Arc::new(ConsoleProgress::new())
    } else {
        Arc::new(NoProgress)
    };

    let client = config.http_client();
    let downloader = Downloader::new(
        client.clone(),
        network.clone(),
        RangeLedger::new(config.ranges_dir()),
        progress.clone(),
        config.progress_every_bytes,
        config.rate_limit,
    );
    let uploader = Uploader::new(
        client,
        network.clone(),
        progress,
        config.progress_every_bytes,
        config.max_upload_bytes,
    );

    let total = names.len();
    for (i, name) in names.iter().enumerate() {
        let path = scenario::resolve_path(&config.scenarios_dir, name);
        println!("\nRun a test scenario #{}/{}: {}", i + 1, total, path.display());

        let scenario = match scenario::load(&path).await {
            Ok(s) => s,
            Err(e) => {
                error!("{:#}", e);
                println!("❌ Skipping scenario {}: {:#}", name, e);
                continue;
            }
        };
        info!(scenario = scenario.name(), kind = scenario.kind(), "starting scenario");

        let outcome = match &scenario {
            Scenario::Download(props) => {
                let mode = download_mode(props, options.range_mode);
                run_download_scenario(&network, &downloader, props, mode, scenario.pause()).await
            }
            Scenario::Upload(props) => {
                run_upload_scenario(config, &network, &uploader, props, scenario.pause()).await
            }
        };

        match outcome {
            Ok(results) => {
                print_summary(&results);
                let stem = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| scenario.kind().to_string());
                if let Err(e) = save_results(&config.results_dir(), &stem, &results).await {
                    error!(scenario = scenario.name(), "saving results failed: {:#}", e);
                    println!("❌ Could not save results of scenario {}: {:#}", scenario.name(), e);
                }
            }
            Err(e) => {
                error!(scenario = scenario.name(), "scenario failed: {:#}", e);
                println!("❌ Scenario {} failed: {:#}", scenario.name(), e);
            }
        }
    }
    Ok(())
}

/// Effective mode for a download scenario. Generation wins when a scenario
/// asks for both.
pub fn download_mode(props: &DownloadProps, override_mode: RangeMode) -> DownloadMode {
    let (generate, replay) = match override_mode {
        RangeMode::Auto => (props.generate_random_ranges, props.use_random_ranges),
        RangeMode::Generate => (true, false),
        RangeMode::Replay => (false, true),
        RangeMode::Off => (false, false),
    };
    if generate {
        DownloadMode::GenerateRanges
    } else if replay {
        DownloadMode::ReplayRanges {
            max_ranges: props.max_random_ranges,
        }
    } else {
        DownloadMode::Full
    }
}

/// Sequential download attempts over every (content, ready provider) pair.
/// A content item whose providers cannot be listed is reported and skipped.
pub async fn run_download_scenario(
    network: &Network,
    downloader: &Downloader,
    props: &DownloadProps,
    mode: DownloadMode,
    pause: Duration,
) -> Result<Vec<TransferResult>> {
    let content_ids = if props.content_ids.is_empty() {
        network
            .directory
            .known_content_ids()
            .await
            .context("list known content")?
    } else {
        props.content_ids.clone()
    };
    println!("Content ids to download:\n{}", list_to_console_string(&content_ids));

    let limits = AttemptLimits {
        max_time_per_byte: props.max_download_time_per_byte,
    };
    let mut results = Vec::new();
    for content_id in &content_ids {
        let ready = match network.directory.ready_providers(content_id).await {
            Ok(ready) => ready,
            Err(e) => {
                error!(content_id = %content_id, "provider lookup failed: {:#}", e);
                println!("❌ Could not look up providers of content {}: {:#}", content_id, e);
                continue;
            }
        };
        if ready.is_empty() {
            warn!(content_id = %content_id, "no ready storage providers");
            println!("No ready storage providers for content {}", content_id);
            continue;
        }
        println!(
            "Ready storage providers for content {}:\n{}",
            content_id,
            list_to_console_string(&ready)
        );

        for provider_id in &ready {
            if !results.is_empty() && !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
            let result = downloader.download_content(provider_id, content_id, mode, limits).await;
            let recorded = mode == DownloadMode::GenerateRanges && result.is_success();
            results.push(result);
            if recorded {
                // One ledger per content; a second pass would overwrite it.
                info!(content_id = %content_id, "ranges recorded, skipping remaining providers");
                break;
            }
        }
    }
    Ok(results)
}

/// Upload the scenario's file to the primary liaison. Other staked providers
/// do not accept uploads and are skipped.
pub async fn run_upload_scenario(
    config: &BenchConfig,
    network: &Network,
    uploader: &Uploader,
    props: &UploadProps,
    pause: Duration,
) -> Result<Vec<TransferResult>> {
    let file_path = if props.content_file_name.is_absolute() {
        props.content_file_name.clone()
    } else {
        config.sample_files_dir().join(&props.content_file_name)
    };
    let Some(liaison) = network.directory.primary_liaison().await else {
        bail!("no primary liaison is configured; uploads are not possible");
    };
    if let Some(account) = &props.uploader_account_id {
        info!(account = %account, "uploading on behalf of account");
    }

    let staked = network.directory.staked_providers().await.context("list staked providers")?;
    let mut results = Vec::new();
    for provider_id in &staked {
        if *provider_id != liaison {
            println!("Skip provider {}: uploads go to the primary liaison {} only", provider_id, liaison);
            continue;
        }
        if !results.is_empty() && !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
        results.push(uploader.upload_content(provider_id, &file_path).await);
    }
    if results.is_empty() {
        warn!(liaison = %liaison, "primary liaison is not among the staked providers");
    }
    Ok(results)
}

fn print_summary(results: &[TransferResult]) {
    let succeeded = results.iter().filter(|r| r.is_success()).count();
    let bytes: u64 = results.iter().map(|r| r.transferred_size).sum();
    println!(
        "\nFinished: {}/{} transfers succeeded, {} transferred",
        succeeded,
        results.len(),
        HumanBytes(bytes)
    );
}

/// Write `results` as pretty JSON to `<dir>/<name>_<YYYY-MM-DD_HH-MM>.json`,
/// never overwriting an earlier file.
pub async fn save_results(dir: &Path, name: &str, results: &[TransferResult]) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .await
        .with_context(|| format!("create results directory {}", dir.display()))?;

    let stamp = chrono::Local::now().format("%Y-%m-%d_%H-%M");
    let file_name = format!("{}_{}.json", sanitize_filename(name), stamp);
    let path = get_unique_filepath(dir, &file_name);

    let json = serde_json::to_string_pretty(results)?;
    fs::write(&path, json)
        .await
        .with_context(|| format!("write results {}", path.display()))?;
    println!("Test results saved to file: {}", path.display());
    Ok(path)
}

pub async fn list_scenarios(config: &BenchConfig) -> Result<()> {
    let dir = &config.scenarios_dir;
    if !dir.exists() {
        println!("Scenarios directory '{}' does not exist.", dir.display());
        println!("Tip: set scenarios_dir in {}", crate::config::DEFAULT_CONFIG_FILE);
        return Ok(());
    }

    let listed = scenario::list(dir).await?;
    if listed.is_empty() {
        println!("No scenarios found in {}", dir.display());
        return Ok(());
    }

    println!("Available test scenarios ({}):", dir.display());
    println!("{:<28} {:<9} {}", "Scenario", "Kind", "Description");
    println!("{}", "-".repeat(72));
    for (path, scenario) in listed {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        match scenario {
            Ok(s) => println!(
                "{:<28} {:<9} {}",
                stem,
                s.kind(),
                s.description().unwrap_or(s.name())
            ),
            Err(e) => println!("{:<28} {:<9} {:#}", stem, "invalid", e),
        }
    }
    Ok(())
}

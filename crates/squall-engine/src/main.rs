//! Replay engine binary for the Squall weather replay system.
//!
//! This is the main entry point that wires together the replay log
//! stores, the dispatchers, the control-plane client, and the two
//! dispatch loops. It loads configuration, initializes all subsystems,
//! and runs the selected command.
//!
//! # Commands
//!
//! - `run` (default) -- run both replay loops until they end
//! - `load <warnings.json> <radar.json>` -- bulk-load acquisition output
//! - `start <archive_epoch> <speed> [archive_end]` -- configure and start
//! - `stop` -- clear the running flag
//! - `reset --yes` -- undeliver everything and clear timing state
//! - `status` -- control state and per-store counts
//!
//! # Startup Sequence (`run`)
//!
//! 1. Initialize structured logging (tracing)
//! 2. Load configuration from `squall-config.yaml`
//! 3. Connect the store pool and run migrations
//! 4. Build the dispatchers and the control-plane client
//! 5. Run both replay loops concurrently
//! 6. Report completion to the control plane when configured

mod control_api;
mod error;
mod retry;
mod runner;

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use squall_core::clock::{SpeedFactor, format_std, parse_std};
use squall_core::config::ReplayConfig;
use squall_db::control_store::{ControlStore, StartParams};
use squall_db::pool::StorePool;
use squall_db::radar_store::RadarStore;
use squall_db::warning_store::WarningStore;
use squall_dispatch::{
    ExternalMunger, LocalScanFetcher, RadarDispatcher, WarningDispatcher,
};
use squall_types::{NewRadarScan, NewWarning};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::control_api::ControlApiClient;
use crate::error::EngineError;
use crate::runner::{LoopPolicy, RunSummary, run_loop};

/// Application entry point for the replay engine.
///
/// # Errors
///
/// Returns an error if configuration, the store, or a replay loop fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let config = load_config()?;

    // 2. Initialize structured logging; RUST_LOG overrides the config level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_target(true)
        .init();

    info!("squall-engine starting");

    let args: Vec<String> = std::env::args().skip(1).collect();
    let verb = args.first().map_or("run", String::as_str);

    match verb {
        "run" => cmd_run(&config).await?,
        "load" => cmd_load(&config, &args).await?,
        "start" => cmd_start(&config, &args).await?,
        "stop" => cmd_stop(&config).await?,
        "reset" => cmd_reset(&config, &args).await?,
        "status" => cmd_status(&config).await?,
        other => {
            return Err(Box::new(EngineError::Usage {
                message: format!(
                    "unknown command {other:?}; expected run, load, start, stop, reset or status"
                ),
            }) as Box<dyn std::error::Error>);
        }
    }

    Ok(())
}

/// Load the engine configuration from `squall-config.yaml`.
///
/// Looks for the config file relative to the current working directory;
/// a missing file yields the defaults.
fn load_config() -> Result<ReplayConfig, EngineError> {
    let config_path = Path::new("squall-config.yaml");
    if config_path.exists() {
        Ok(ReplayConfig::from_file(config_path)?)
    } else {
        let mut config = ReplayConfig::default();
        config.apply_env_overrides();
        Ok(config)
    }
}

/// Connect the store pool and run migrations.
async fn connect(config: &ReplayConfig) -> Result<StorePool, EngineError> {
    let pool = StorePool::connect_url(&config.database.url).await?;
    pool.run_migrations().await?;
    Ok(pool)
}

/// Run both replay loops until they end, then report completion.
async fn cmd_run(config: &ReplayConfig) -> Result<(), EngineError> {
    // 3. Connect the store pool.
    let pool = connect(config).await?;
    let warning_store = WarningStore::new(pool.pool());
    let radar_store = RadarStore::new(pool.pool());
    let warning_control = ControlStore::new(pool.pool());
    let radar_control = ControlStore::new(pool.pool());

    // 4. Build the dispatchers and the control-plane client.
    let warning_dispatcher = WarningDispatcher::new(&config.paths.warning_output_dir)?;
    let radar_dispatcher = RadarDispatcher::new(
        &config.paths.radar_deploy_root,
        LocalScanFetcher::new(&config.paths.scan_archive_root),
        ExternalMunger::new(
            &config.munger.binary,
            &config.paths.staging_dir,
            Duration::from_secs(config.munger.timeout_secs),
        ),
    );
    let api = if config.control_api.enabled() {
        info!(base_url = %config.control_api.base_url, "Control API enabled");
        Some(ControlApiClient::new(&config.control_api)?)
    } else {
        None
    };

    // 5. Run both replay loops concurrently.
    let warning_policy = LoopPolicy::from(&config.warning_scheduler);
    let radar_policy = LoopPolicy::from(&config.radar_scheduler);
    let (warning_summary, radar_summary) = tokio::try_join!(
        run_loop(
            &warning_store,
            &warning_dispatcher,
            &warning_control,
            api.as_ref(),
            &warning_policy,
        ),
        run_loop(
            &radar_store,
            &radar_dispatcher,
            &radar_control,
            api.as_ref(),
            &radar_policy,
        ),
    )?;

    log_summary("warning", warning_summary);
    log_summary("radar", radar_summary);

    // 6. Report completion to the control plane.
    if warning_summary.end_reason.is_complete() && radar_summary.end_reason.is_complete()
        && let Some(api) = &api
        && let Err(e) = api.notify_complete().await
    {
        warn!(error = %e, "Failed to report completion to control API");
    }

    pool.close().await;
    info!("squall-engine shutdown complete");
    Ok(())
}

/// Log one loop's outcome.
fn log_summary(kind: &str, summary: RunSummary) {
    info!(
        kind,
        end_reason = ?summary.end_reason,
        dispatched = summary.dispatched,
        failures = summary.failures,
        "Replay loop ended"
    );
}

/// Bulk-load acquisition output from two JSON files.
async fn cmd_load(config: &ReplayConfig, args: &[String]) -> Result<(), EngineError> {
    let warnings_path = args.get(1).ok_or_else(|| EngineError::Usage {
        message: String::from("load <warnings.json> <radar.json>"),
    })?;
    let radar_path = args.get(2).ok_or_else(|| EngineError::Usage {
        message: String::from("load <warnings.json> <radar.json>"),
    })?;

    let warnings: Vec<NewWarning> = read_rows(warnings_path)?;
    let scans: Vec<NewRadarScan> = read_rows(radar_path)?;

    let pool = connect(config).await?;
    let inserted_warnings = WarningStore::new(pool.pool()).bulk_insert(&warnings).await?;
    let inserted_scans = RadarStore::new(pool.pool()).bulk_insert(&scans).await?;
    pool.close().await;

    info!(
        warnings = inserted_warnings,
        warnings_total = warnings.len(),
        radar_scans = inserted_scans,
        radar_total = scans.len(),
        "Case loaded (duplicates ignored)"
    );
    Ok(())
}

/// Parse one acquisition JSON file.
fn read_rows<T: serde::de::DeserializeOwned>(path: &str) -> Result<Vec<T>, EngineError> {
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents).map_err(|e| EngineError::Load {
        message: format!("{path}: {e}"),
    })
}

/// Write control state and start the simulation clock now.
async fn cmd_start(config: &ReplayConfig, args: &[String]) -> Result<(), EngineError> {
    let usage = || EngineError::Usage {
        message: String::from("start <archive_epoch> <speed> [archive_end]"),
    };
    let archive_epoch = parse_std(args.get(1).ok_or_else(usage)?)?;
    let speed_raw: f64 = args
        .get(2)
        .ok_or_else(usage)?
        .parse()
        .map_err(|e| EngineError::Usage {
            message: format!("speed factor: {e}"),
        })?;
    let speed = SpeedFactor::new(speed_raw)?;
    let archive_end = args.get(3).map(|s| parse_std(s)).transpose()?;

    let params = StartParams {
        archive_epoch,
        current_epoch: Utc::now(),
        speed,
        archive_end,
    };

    let pool = connect(config).await?;
    let control = ControlStore::new(pool.pool());
    control.start(params).await?;
    let state = control.state().await?;
    pool.close().await;

    // Best-effort: local state is authoritative, the remote copy is for
    // downstream displays.
    if config.control_api.enabled()
        && let Some(state) = state
    {
        let api = ControlApiClient::new(&config.control_api)?;
        if let Err(e) = api.push_timings(&state.timings).await {
            warn!(error = %e, "Failed to push timings to control API");
        }
    }
    Ok(())
}

/// Clear the running flag; timing parameters are retained.
async fn cmd_stop(config: &ReplayConfig) -> Result<(), EngineError> {
    let pool = connect(config).await?;
    ControlStore::new(pool.pool()).stop().await?;
    pool.close().await;
    Ok(())
}

/// Destructive reset; refuses without `--yes`.
async fn cmd_reset(config: &ReplayConfig, args: &[String]) -> Result<(), EngineError> {
    if !args.iter().any(|a| a == "--yes") {
        return Err(EngineError::Usage {
            message: String::from(
                "reset undelivers every event and clears timing state; pass --yes to confirm",
            ),
        });
    }

    let pool = connect(config).await?;
    ControlStore::new(pool.pool()).reset().await?;
    pool.close().await;
    Ok(())
}

/// Print control state and per-store counts.
async fn cmd_status(config: &ReplayConfig) -> Result<(), EngineError> {
    let pool = connect(config).await?;
    let control = ControlStore::new(pool.pool());
    let warnings = WarningStore::new(pool.pool());
    let scans = RadarStore::new(pool.pool());

    match control.state().await? {
        Some(state) => {
            println!("running: {}", state.running);
            println!("archive epoch: {}", format_std(state.timings.archive_epoch));
            println!("current epoch: {}", format_std(state.timings.current_epoch));
            println!("speed factor: {}", state.timings.speed);
            match state.archive_end {
                Some(end) => println!("archive end: {}", format_std(end)),
                None => println!("archive end: none"),
            }
        }
        None => println!("running: false (not configured)"),
    }
    println!(
        "warnings: {} pending, {} delivered",
        warnings.pending_count().await?,
        warnings.delivered_count().await?
    );
    println!(
        "radar scans: {} pending, {} delivered",
        scans.pending_count().await?,
        scans.delivered_count().await?
    );

    pool.close().await;
    Ok(())
}

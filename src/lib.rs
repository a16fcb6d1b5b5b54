pub mod agent_engine;
pub mod config;
pub mod decision;
pub mod device;
pub mod errors;
pub mod executor;
pub mod llm;
pub mod ocr;
pub mod perception;

#[cfg(test)]
pub(crate) mod testing;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::agent_engine::engine::{ControlLoop, Pipeline};
use crate::agent_engine::history::SessionHistory;
use crate::config::{AppConfig, LoggingConfig, CONFIG_FILE_NAME};
use crate::decision::criteria::MatchingCriteria;
use crate::decision::watch::CriteriaWatch;
use crate::device::adb::AdbDevice;
use crate::device::{Device, DeviceGuard};
use crate::errors::BotResult;
use crate::llm::registry::{ProviderRegistry, Role};
use crate::ocr::engine::{OcrEngine, TesseractEngine};

pub const ENV_TEMPLATE_FILE_NAME: &str = ".env-template";

/// Install the global subscriber: `RUST_LOG` if set, else the configured level.
/// Output goes to stdout and, when a log file is configured, to that file too.
pub fn init_tracing(cfg: &LoggingConfig) -> BotResult<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.level));

    let file_layer = match &cfg.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    // A subscriber may already be installed (tests, repeated calls); keep it.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .try_init();
    Ok(())
}

fn load(config_path: Option<&Path>) -> BotResult<AppConfig> {
    let _ = dotenvy::dotenv();
    let config = config::load_config(config_path)?;
    init_tracing(&config.logging)?;
    config.validate()?;
    Ok(config)
}

/// Criteria from `matching.criteria_file` when it loads cleanly, otherwise the
/// inline `[matching]` values.
fn initial_criteria(config: &AppConfig) -> (MatchingCriteria, Option<CriteriaWatch>) {
    let inline = config.matching.criteria.clone();
    let Some(path) = &config.matching.criteria_file else {
        return (inline, None);
    };
    let criteria = match MatchingCriteria::load_from_file(path) {
        Ok(criteria) => {
            tracing::info!(path = %path.display(), "criteria loaded from file");
            criteria
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "criteria file unusable, using [matching] values");
            inline
        }
    };
    (criteria, Some(CriteriaWatch::new(path.clone())))
}

/// Run the bot until a limit is reached or Ctrl-C. Returns the number of
/// profiles evaluated.
pub async fn run(config_path: Option<&Path>) -> BotResult<u32> {
    let config = load(config_path)?;
    config.setup_directories()?;
    tracing::info!("starting hinge autobot");

    let registry = Arc::new(ProviderRegistry::from_config(&config.llm));
    for role in Role::ALL {
        if !registry.is_available(role) {
            tracing::warn!(%role, "no AI backend for role, local fallbacks will be used");
        }
    }

    let device = Arc::new(AdbDevice::new(&config.device));
    let ocr = Arc::new(TesseractEngine::new(&config.ocr));
    let evaluated = run_with(&config, device, registry, ocr, shutdown_signal()).await?;
    tracing::info!(profiles = evaluated, "bot stopped");
    Ok(evaluated)
}

/// Connect, wait for the app and drive the control loop until a limit is hit
/// or `shutdown` resolves. `shutdown` is honoured during every phase and the
/// device is released on every exit path.
pub async fn run_with<F>(
    config: &AppConfig,
    device: Arc<dyn Device>,
    registry: Arc<ProviderRegistry>,
    ocr: Arc<dyn OcrEngine>,
    shutdown: F,
) -> BotResult<u32>
where
    F: Future<Output = ()>,
{
    let (criteria, watch) = initial_criteria(config);
    let guard = DeviceGuard::new(device);
    let device = guard.device();
    tokio::pin!(shutdown);

    tokio::select! {
        biased;
        _ = &mut shutdown => {
            tracing::info!("shutdown requested while connecting");
            return Ok(0);
        }
        connected = device.connect() => connected.inspect_err(|e| {
            tracing::error!(error = %e, "failed to connect to device");
        })?,
    }

    let pipeline = Pipeline::new(device, registry, ocr, &config.ocr, criteria, config.bot.delays());

    tokio::select! {
        biased;
        _ = &mut shutdown => {
            tracing::info!("shutdown requested while waiting for the app");
            return Ok(0);
        }
        ready = pipeline.executor.wait_for_ready(config.bot.ready_polls()) => {
            if let Err(e) = ready {
                tracing::warn!(error = %e, "app not ready, starting anyway");
            }
        }
    }

    let mut control = ControlLoop::new(pipeline, &config.bot);
    if config.history.enabled {
        control = control.with_history(SessionHistory::new(&config.history_dir()));
    }
    if let Some(watch) = watch {
        control = control.with_criteria_watch(watch);
    }

    let evaluated = control.run(shutdown).await;
    drop(guard);
    Ok(evaluated)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "cannot listen for Ctrl-C, stop the process another way");
        std::future::pending::<()>().await;
    }
}

/// Write a default `config.toml` and `.env-template` into `dir`, leaving
/// existing files alone. Returns the files written.
pub fn init_files(dir: &Path) -> BotResult<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let mut written = Vec::new();

    let config_path = dir.join(CONFIG_FILE_NAME);
    if config_path.exists() {
        tracing::info!(path = %config_path.display(), "config already present, skipping");
    } else {
        config::save_config(&AppConfig::default(), &config_path)?;
        written.push(config_path);
    }

    let env_path = dir.join(ENV_TEMPLATE_FILE_NAME);
    if env_path.exists() {
        tracing::info!(path = %env_path.display(), "env template already present, skipping");
    } else {
        config::write_env_template(&env_path)?;
        written.push(env_path);
    }
    Ok(written)
}

/// Validate the configuration, report AI role availability and probe the device.
pub async fn check(config_path: Option<&Path>) -> BotResult<()> {
    let config = load(config_path)?;
    println!("configuration: ok");

    let registry = ProviderRegistry::from_config(&config.llm);
    for role in Role::ALL {
        let state = if registry.is_available(role) { "available" } else { "fallback only" };
        println!("ai role {role}: {state}");
    }

    let guard = DeviceGuard::new(Arc::new(AdbDevice::new(&config.device)));
    let device = guard.device();
    device.connect().await?;
    let (width, height) = device.screen_dimensions();
    println!("device {}: {width}x{height}", device.name());
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testing::{DeviceCall, RecordingDevice, StubOcr};

    fn quiet_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.history.enabled = false;
        config
    }

    #[tokio::test]
    async fn shutdown_before_connect_releases_device() {
        let device = Arc::new(RecordingDevice::new(1080, 1920));
        let evaluated = run_with(
            &quiet_config(),
            device.clone(),
            Arc::new(ProviderRegistry::empty()),
            Arc::new(StubOcr::new("")),
            std::future::ready(()),
        )
        .await
        .unwrap();

        assert_eq!(evaluated, 0);
        assert_eq!(device.calls(), vec![DeviceCall::Disconnect]);
    }

    #[tokio::test]
    async fn shutdown_while_waiting_for_app_releases_device() {
        let mut config = quiet_config();
        config.bot.ready_timeout_secs = 7200;
        config.bot.ready_poll_secs = 3600.0;
        // No screenshot configured, so every readiness poll fails and sleeps.
        let device = Arc::new(RecordingDevice::new(1080, 1920));

        let run = run_with(
            &config,
            device.clone(),
            Arc::new(ProviderRegistry::empty()),
            Arc::new(StubOcr::new("")),
            tokio::time::sleep(Duration::from_millis(50)),
        );
        let evaluated = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("shutdown was not honoured during the readiness wait")
            .unwrap();

        assert_eq!(evaluated, 0);
        assert_eq!(
            device.calls(),
            vec![DeviceCall::Connect, DeviceCall::Capture, DeviceCall::Disconnect]
        );
    }

    #[test]
    fn init_writes_missing_files_only() {
        let dir = tempfile::tempdir().unwrap();
        let written = init_files(dir.path()).unwrap();
        assert_eq!(written.len(), 2);

        let loaded = config::load_config(Some(&dir.path().join(CONFIG_FILE_NAME))).unwrap();
        assert!(loaded.validate().is_ok());
        let env = std::fs::read_to_string(dir.path().join(ENV_TEMPLATE_FILE_NAME)).unwrap();
        assert!(env.contains("DEVICE_IP"));

        assert!(init_files(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn criteria_file_overrides_inline_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("criteria.toml");
        std::fs::write(&path, "min_age = 30\nmax_age = 40\n").unwrap();

        let mut config = AppConfig::default();
        config.matching.criteria_file = Some(path);
        let (criteria, watch) = initial_criteria(&config);
        assert_eq!((criteria.min_age, criteria.max_age), (30, 40));
        assert!(watch.is_some());
    }

    #[test]
    fn invalid_criteria_file_keeps_inline_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("criteria.toml");
        std::fs::write(&path, "min_age = 50\nmax_age = 40\n").unwrap();

        let mut config = AppConfig::default();
        config.matching.criteria_file = Some(path);
        let (criteria, _) = initial_criteria(&config);
        assert_eq!(criteria, config.matching.criteria);
    }
}

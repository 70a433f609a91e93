//! Command handlers for the mavlog CLI

use tracing::{debug, info};

use mavlog_core::{
    AppEvent, Command, DirectoryStorage, LogCoordinator, MavlogError, RecordChange, RecordField,
    UploadError,
};
use mavlog_runtime::{HttpUploader, RuntimeBuilder, RuntimeError};

use crate::cli::{Cli, Commands, ConfigAction};
use crate::config::AppConfig;
use crate::error::{CliError, Result};
use crate::settings::JsonSettingsStore;

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(cli: Cli, config: AppConfig) -> Result<()> {
        let coordinator = Self::open_coordinator(&config)?;
        match cli.command {
            Commands::List => Self::handle_list_command(&coordinator),
            Commands::Upload { names, all } => {
                Self::handle_upload_command(coordinator, names, all).await
            }
            Commands::Delete { names } => Self::handle_delete_command(coordinator, names),
            Commands::Config { action } => match action {
                ConfigAction::Show => Self::handle_config_show(&config, &coordinator),
                ConfigAction::Set { key, value } => {
                    Self::handle_config_set(coordinator, &key, &value)
                }
            },
        }
    }

    /// Coordinator over the configured log directory and settings file
    pub fn open_coordinator(config: &AppConfig) -> Result<LogCoordinator> {
        let capture = config.resolved_capture()?;
        let settings = JsonSettingsStore::open(config.settings_path()?)?;
        let storage = DirectoryStorage::new(&capture.log_dir);
        debug!(log_dir = %capture.log_dir.display(), "Opening log directory");
        Ok(LogCoordinator::new(
            capture,
            Box::new(settings),
            Box::new(storage),
        ))
    }

    /// Handle the list command
    fn handle_list_command(coordinator: &LogCoordinator) -> Result<()> {
        if coordinator.records().is_empty() {
            println!(
                "No logs in {}",
                coordinator.config().log_dir.display()
            );
            return Ok(());
        }

        println!("{:<32} {:>10}  STATUS", "NAME", "SIZE");
        for record in coordinator.records().iter() {
            let status = if record.uploaded() { "uploaded" } else { "" };
            println!(
                "{:<32} {:>10}  {}",
                record.name(),
                format_size(record.size_bytes()),
                status
            );
        }
        Ok(())
    }

    /// Handle the upload command: drive the upload queue until it drains
    async fn handle_upload_command(
        mut coordinator: LogCoordinator,
        names: Vec<String>,
        all: bool,
    ) -> Result<()> {
        let targets = select_upload_targets(&coordinator, &names, all)?;
        if targets.is_empty() {
            println!("Nothing to upload");
            return Ok(());
        }
        if !coordinator.settings().has_credentials() {
            return Err(MavlogError::from(UploadError::MissingCredentials).into());
        }
        for name in &targets {
            coordinator.set_selected(name, true);
        }

        info!(count = targets.len(), url = %coordinator.settings().upload_url, "Starting upload");
        let mut runtime = RuntimeBuilder::new(coordinator, HttpUploader::new()?).build_and_start();
        let mut app_events = runtime
            .take_app_event_receiver()
            .ok_or_else(|| RuntimeError::channel_closed("App event receiver unavailable"))?;
        runtime.send_command(Command::UploadLogs).await?;

        let total = targets.len();
        let mut succeeded = 0;
        let mut failed = 0;
        let mut last_step: Option<(String, u32)> = None;
        let mut cancelled = false;
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                event = app_events.recv() => match event {
                    Some(AppEvent::RecordChanged(RecordChange {
                        name,
                        field: RecordField::Progress(progress),
                    })) => {
                        let step = (progress * 10.0).floor() as u32;
                        if last_step.as_ref() != Some(&(name.clone(), step)) {
                            println!("{}: {:>3}%", name, step * 10);
                            last_step = Some((name, step));
                        }
                    }
                    Some(AppEvent::UploadResponse { name, body }) => {
                        let body = body.trim();
                        if !body.is_empty() {
                            println!("{}: server response: {}", name, body);
                        }
                    }
                    Some(AppEvent::UploadSucceeded { name }) => {
                        succeeded += 1;
                        println!("{}: uploaded", name);
                    }
                    Some(AppEvent::UploadFailed { name, reason }) => {
                        failed += 1;
                        println!("{}: failed ({})", name, reason);
                    }
                    Some(AppEvent::UploadingChanged { uploading: false }) | None => break,
                    Some(_) => {}
                },
                _ = &mut ctrl_c, if !cancelled => {
                    cancelled = true;
                    println!("Cancelling upload...");
                    runtime.send_command(Command::CancelUpload).await?;
                }
            }
        }

        runtime.shutdown().await?;
        println!("{} of {} uploaded", succeeded, total);
        if failed > 0 {
            return Err(CliError::UploadsFailed { failed, total });
        }
        Ok(())
    }

    /// Handle the delete command
    fn handle_delete_command(mut coordinator: LogCoordinator, names: Vec<String>) -> Result<()> {
        for name in &names {
            if !coordinator.records().contains(name) {
                return Err(CliError::UnknownLog(name.clone()));
            }
        }
        for name in &names {
            coordinator.set_selected(name, true);
        }

        let outputs = coordinator.delete_selected();
        for event in outputs.app_events {
            if let AppEvent::RecordRemoved { name } = event {
                println!("Deleted {}", name);
            }
        }
        Ok(())
    }

    /// Handle the config show command
    fn handle_config_show(config: &AppConfig, coordinator: &LogCoordinator) -> Result<()> {
        let settings = coordinator.settings();
        println!("data directory:      {}", config.data_dir()?.display());
        println!("log directory:       {}", coordinator.config().log_dir.display());
        println!("settings file:       {}", config.settings_path()?.display());
        println!("email:               {}", settings.email);
        println!("description:         {}", settings.description);
        println!("upload-url:          {}", settings.upload_url);
        println!("auto-upload:         {}", settings.auto_upload);
        println!("auto-start:          {}", settings.auto_start);
        println!("delete-after-upload: {}", settings.delete_after_upload);
        Ok(())
    }

    /// Handle the config set command
    fn handle_config_set(mut coordinator: LogCoordinator, key: &str, value: &str) -> Result<()> {
        apply_setting(&mut coordinator, key, value)?;
        println!("{} = {}", key, value);
        Ok(())
    }
}

/// Names to upload: the given ones, or every log not uploaded yet
pub fn select_upload_targets(
    coordinator: &LogCoordinator,
    names: &[String],
    all: bool,
) -> Result<Vec<String>> {
    let records = coordinator.records();
    if all {
        return Ok(records
            .iter()
            .filter(|record| !record.uploaded())
            .map(|record| record.name().to_string())
            .collect());
    }

    let mut targets = Vec::new();
    for name in names {
        let Some(record) = records.get(name) else {
            return Err(CliError::UnknownLog(name.clone()));
        };
        if record.uploaded() {
            println!("{}: already uploaded, skipping", name);
            continue;
        }
        targets.push(name.clone());
    }
    Ok(targets)
}

/// Change one user setting through the coordinator, which persists it
pub fn apply_setting(coordinator: &mut LogCoordinator, key: &str, value: &str) -> Result<()> {
    match key {
        "email" => {
            coordinator.set_email(value.to_string());
        }
        "description" => {
            coordinator.set_description(value.to_string());
        }
        "upload-url" => {
            if !value.is_empty() {
                url::Url::parse(value)?;
            }
            coordinator.set_upload_url(value.to_string());
        }
        "auto-upload" => {
            coordinator.set_auto_upload(parse_bool(key, value)?);
        }
        "auto-start" => {
            coordinator.set_auto_start(parse_bool(key, value)?);
        }
        "delete-after-upload" => {
            coordinator.set_delete_after_upload(parse_bool(key, value)?);
        }
        _ => return Err(CliError::UnknownSetting(key.to_string())),
    }
    Ok(())
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(CliError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

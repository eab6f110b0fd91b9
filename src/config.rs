use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::FsmError;
use crate::utils::process_name;

/// Минимальный интервал опроса (мс)
pub const MIN_POLL_INTERVAL_MS: u64 = 100;
/// Максимальный интервал опроса (мс)
pub const MAX_POLL_INTERVAL_MS: u64 = 2000;
/// Интервал опроса по умолчанию (мс)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
/// Процессы, отслеживаемые по умолчанию
pub const DEFAULT_TARGET_PROCESSES: &[&str] = &["chrome", "firefox", "msedge"];

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub logging: LoggingConfig,
    pub monitor: MonitorSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub filter: String,
}

/// Настройки, которые потребляет сервис мониторинга
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MonitorSettings {
    /// Имена процессов в нижнем регистре и без расширения
    #[serde(default)]
    pub target_processes: Vec<String>,
    pub poll_interval_ms: u64,
    pub restore_on_full_screen_exit: bool,
    pub restore_on_settings_closed: bool,
    pub restore_on_app_exit: bool,
}

/// Что именно изменилось между двумя версиями настроек
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettingsDiff {
    pub interval_changed: bool,
    pub targets_changed: bool,
    pub restart_required: bool,
}

impl SettingsDiff {
    pub fn is_empty(&self) -> bool {
        !self.interval_changed && !self.targets_changed && !self.restart_required
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            target_processes: DEFAULT_TARGET_PROCESSES
                .iter()
                .map(|name| name.to_string())
                .collect(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            restore_on_full_screen_exit: true,
            restore_on_settings_closed: true,
            restore_on_app_exit: true,
        }
    }
}

impl MonitorSettings {
    /// Интервал опроса, приведённый к допустимому диапазону
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(
            self.poll_interval_ms
                .clamp(MIN_POLL_INTERVAL_MS, MAX_POLL_INTERVAL_MS),
        )
    }

    /// Привести имена процессов к каноническому виду и убрать дубликаты (порядок сохраняется)
    pub fn normalize(&mut self) {
        let mut seen = Vec::with_capacity(self.target_processes.len());
        for name in &self.target_processes {
            let normalized = process_name::normalize(name);
            if !normalized.is_empty() && !seen.contains(&normalized) {
                seen.push(normalized);
            }
        }
        self.target_processes = seen;
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        if !(MIN_POLL_INTERVAL_MS..=MAX_POLL_INTERVAL_MS).contains(&self.poll_interval_ms) {
            return Err(FsmError::Settings(format!(
                "poll_interval_ms должно быть в диапазоне {}..={}, получено {}",
                MIN_POLL_INTERVAL_MS, MAX_POLL_INTERVAL_MS, self.poll_interval_ms
            )));
        }

        for (i, name) in self.target_processes.iter().enumerate() {
            process_name::validate(name)
                .map_err(|e| FsmError::Settings(format!("процесс #{}: {}", i + 1, e)))?;
        }

        Ok(())
    }

    /// Сравнить старые и новые настройки.
    /// Интервал и список процессов применяются на лету, всё остальное требует перезапуска.
    pub fn diff(&self, new: &MonitorSettings) -> SettingsDiff {
        SettingsDiff {
            interval_changed: self.poll_interval_ms != new.poll_interval_ms,
            targets_changed: self.target_processes != new.target_processes,
            restart_required: self.restore_on_full_screen_exit != new.restore_on_full_screen_exit
                || self.restore_on_settings_closed != new.restore_on_settings_closed
                || self.restore_on_app_exit != new.restore_on_app_exit,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "compact".to_string(),
                filter: "fullscreen_monitor=info".to_string(),
            },
            monitor: MonitorSettings::default(),
        }
    }
}

impl Config {
    /// Загрузить конфигурацию: значения по умолчанию, затем TOML-файл, затем переменные FSM_*
    pub fn load<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref();

        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("FSM_").split("__"));

        let mut config: Config = figment
            .extract()
            .with_context(|| format!("Не удалось загрузить конфигурацию из {:?}", config_path))?;

        config.monitor.normalize();
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        // Валидация настроек логирования
        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!("Неверный уровень логирования: {}", self.logging.level),
        }

        match self.logging.format.as_str() {
            "compact" | "full" => {}
            _ => anyhow::bail!("Неверный формат логирования: {}", self.logging.format),
        }

        self.monitor
            .validate()
            .context("Неверные настройки мониторинга")?;

        Ok(())
    }
}

use crate::events::{Region, Rgb, WatchKind};
use crate::services::keycode_map::KeycodeMap;
use crate::services::Reaction;
use crate::watcher::{
    EventCallback, TemplateTarget, WatchSpec, WatcherConfig, DEFAULT_MIN_CHANGE, DEFAULT_MIN_DISTANCE,
    DEFAULT_TOLERANCE,
};
use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub watchers: Vec<WatcherEntry>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// pretty | compact | json
    pub format: String,
    /// Дополнительные директивы EnvFilter, например "autofish::watcher=debug"
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
            filter: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// xcap | dry_run
    pub backend: String,
    pub screen_width: u32,
    pub screen_height: u32,
    pub stop_timeout_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            backend: "xcap".to_string(),
            screen_width: 1920,
            screen_height: 1080,
            stop_timeout_ms: 1000,
        }
    }
}

impl CaptureConfig {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Порог уверенности для шаблонов, у которых он не задан явно
    pub threshold: f32,
    pub use_mask: bool,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            threshold: crate::watcher::DEFAULT_THRESHOLD,
            use_mask: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InputConfig {
    pub device_name: String,
    pub press_duration_ms: u64,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            device_name: "autofish virtual input".to_string(),
            press_duration_ms: 50,
        }
    }
}

impl InputConfig {
    pub fn press_duration(&self) -> Duration {
        Duration::from_millis(self.press_duration_ms)
    }
}

/// Описание наблюдателя в `[[watchers]]`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WatcherEntry {
    pub name: String,
    pub kind: WatchKind,

    // Пиксельные наблюдатели
    #[serde(default)]
    pub x: Option<i32>,
    #[serde(default)]
    pub y: Option<i32>,
    #[serde(default)]
    pub color: Option<Rgb>,
    #[serde(default = "default_tolerance")]
    pub tolerance: u8,
    #[serde(default = "default_min_change")]
    pub min_change: u32,

    // Шаблонные наблюдатели
    #[serde(default)]
    pub template: Option<PathBuf>,
    #[serde(default)]
    pub region: Option<Region>,
    #[serde(default)]
    pub threshold: Option<f32>,
    #[serde(default)]
    pub use_mask: Option<bool>,
    #[serde(default = "default_min_distance")]
    pub min_distance: f64,

    #[serde(default)]
    pub interval_ms: Option<u64>,
    #[serde(default)]
    pub cooldown_ms: u64,
    #[serde(default)]
    pub trigger_once: bool,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub reaction: Reaction,
}

fn default_tolerance() -> u8 {
    DEFAULT_TOLERANCE
}

fn default_min_change() -> u32 {
    DEFAULT_MIN_CHANGE
}

fn default_min_distance() -> f64 {
    DEFAULT_MIN_DISTANCE
}

fn default_enabled() -> bool {
    true
}

impl WatcherEntry {
    fn pixel(&self) -> Result<(i32, i32)> {
        match (self.x, self.y) {
            (Some(x), Some(y)) => Ok((x, y)),
            _ => anyhow::bail!("Наблюдатель '{}': для {} нужны x и y", self.name, self.kind),
        }
    }

    fn template_target(&self, matching: &MatchingConfig) -> Result<TemplateTarget> {
        let path = self
            .template
            .clone()
            .with_context(|| format!("Наблюдатель '{}': для {} нужен template", self.name, self.kind))?;

        Ok(TemplateTarget {
            path,
            region: self.region,
            threshold: self.threshold.unwrap_or(matching.threshold),
            use_mask: self.use_mask.unwrap_or(matching.use_mask),
        })
    }

    pub fn to_spec(&self, matching: &MatchingConfig) -> Result<WatchSpec> {
        let spec = match self.kind {
            WatchKind::ColorMatch => {
                let (x, y) = self.pixel()?;
                let target = self
                    .color
                    .with_context(|| format!("Наблюдатель '{}': для color_match нужен color", self.name))?;
                WatchSpec::PixelColor {
                    x,
                    y,
                    target,
                    tolerance: self.tolerance,
                }
            }
            WatchKind::ColorChange => {
                let (x, y) = self.pixel()?;
                WatchSpec::PixelChange {
                    x,
                    y,
                    min_change: self.min_change,
                }
            }
            WatchKind::TemplateFound => WatchSpec::TemplateFound(self.template_target(matching)?),
            WatchKind::TemplateLost => WatchSpec::TemplateLost(self.template_target(matching)?),
            WatchKind::TemplateMoved => WatchSpec::TemplateMoved {
                template: self.template_target(matching)?,
                min_distance: self.min_distance,
            },
        };

        spec.validate()
            .with_context(|| format!("Наблюдатель '{}'", self.name))?;
        Ok(spec)
    }

    /// Собрать конфигурацию наблюдателя с заданным колбэком
    pub fn to_watcher_config(&self, matching: &MatchingConfig, callback: EventCallback) -> Result<WatcherConfig> {
        let mut config = WatcherConfig::with_callback(self.name.clone(), self.to_spec(matching)?, callback)
            .cooldown(Duration::from_millis(self.cooldown_ms))
            .trigger_once(self.trigger_once)
            .enabled(self.enabled);
        if let Some(interval_ms) = self.interval_ms {
            config = config.interval(Duration::from_millis(interval_ms));
        }
        Ok(config)
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref();

        let figment = Figment::new()
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("AUTOFISH_").split("__"));

        let config: Config = figment
            .extract()
            .with_context(|| format!("Не удалось загрузить конфигурацию из {:?}", config_path))?;

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
            "pretty" | "compact" | "json" => {}
            _ => anyhow::bail!("Неверный формат логирования: {}", self.logging.format),
        }

        // Валидация захвата
        match self.capture.backend.as_str() {
            "xcap" | "dry_run" => {}
            _ => anyhow::bail!("Неверный бэкенд захвата: {}", self.capture.backend),
        }

        if self.capture.screen_width == 0 || self.capture.screen_height == 0 {
            anyhow::bail!("Размер экрана должен быть больше нуля");
        }

        if self.capture.stop_timeout_ms == 0 {
            anyhow::bail!("stop_timeout_ms должно быть больше 0");
        }

        if !(0.0..=1.0).contains(&self.matching.threshold) {
            anyhow::bail!("matching.threshold вне диапазона 0.0..=1.0: {}", self.matching.threshold);
        }

        // Валидация наблюдателей
        let mut names = HashSet::new();
        for (i, entry) in self.watchers.iter().enumerate() {
            if entry.name.trim().is_empty() {
                anyhow::bail!("Пустое имя наблюдателя #{}", i + 1);
            }
            if !names.insert(entry.name.as_str()) {
                anyhow::bail!("Повторяющееся имя наблюдателя: {}", entry.name);
            }
            if entry.interval_ms == Some(0) {
                anyhow::bail!("Наблюдатель '{}': interval_ms должно быть больше 0", entry.name);
            }

            entry.to_spec(&self.matching)?;

            if let Reaction::Key { key } = &entry.reaction {
                KeycodeMap::resolve(key)
                    .with_context(|| format!("Наблюдатель '{}': неверная клавиша реакции", entry.name))?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn load_str(toml: &str) -> Result<Config> {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(toml.as_bytes()).unwrap();
        Config::load(file.path())
    }

    #[test]
    fn test_default_config_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(config.watchers.is_empty());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = Config::load("/nonexistent/autofish.toml").unwrap();
        assert_eq!(config.capture.backend, "xcap");
        assert_eq!(config.input.press_duration(), Duration::from_millis(50));
    }

    #[test]
    fn test_load_watchers() {
        let config = load_str(
            r#"
            [capture]
            backend = "dry_run"

            [matching]
            threshold = 0.75

            [[watchers]]
            name = "bite"
            kind = "color_match"
            x = 960
            y = 540
            color = [255, 100, 0]
            tolerance = 20
            cooldown_ms = 1500
            reaction = { action = "key", key = "e" }

            [[watchers]]
            name = "float"
            kind = "template_moved"
            template = "templates/float.png"
            region = { left = 100, top = 100, width = 400, height = 300 }
            min_distance = 15.0
            interval_ms = 200
            reaction = { action = "click_match" }
            "#,
        )
        .unwrap();

        assert_eq!(config.watchers.len(), 2);

        let bite = config.watchers[0].to_spec(&config.matching).unwrap();
        assert_eq!(
            bite,
            WatchSpec::PixelColor {
                x: 960,
                y: 540,
                target: Rgb::new(255, 100, 0),
                tolerance: 20,
            }
        );
        assert_eq!(config.watchers[0].reaction, Reaction::Key { key: "e".into() });

        match config.watchers[1].to_spec(&config.matching).unwrap() {
            WatchSpec::TemplateMoved {
                template,
                min_distance,
            } => {
                assert_eq!(template.threshold, 0.75);
                assert!(template.use_mask);
                assert_eq!(template.region, Some(Region::new(100, 100, 400, 300)));
                assert_eq!(min_distance, 15.0);
            }
            other => panic!("unexpected spec: {:?}", other),
        }

        let watcher = config.watchers[1]
            .to_watcher_config(&config.matching, std::sync::Arc::new(|_: &crate::events::WatchEvent| Ok(())))
            .unwrap();
        assert_eq!(watcher.poll_interval(), Duration::from_millis(200));
        assert_eq!(watcher.cooldown_period(), Duration::ZERO);
    }

    #[test]
    fn test_rejects_incomplete_watchers() {
        let no_color = load_str(
            r#"
            [[watchers]]
            name = "bite"
            kind = "color_match"
            x = 1
            y = 1
            "#,
        );
        assert!(no_color.is_err());

        let no_template = load_str(
            r#"
            [[watchers]]
            name = "bobber"
            kind = "template_found"
            "#,
        );
        assert!(no_template.is_err());
    }

    #[test]
    fn test_rejects_duplicate_names_and_bad_keys() {
        let duplicate = load_str(
            r#"
            [[watchers]]
            name = "w"
            kind = "color_change"
            x = 1
            y = 1

            [[watchers]]
            name = "w"
            kind = "color_change"
            x = 2
            y = 2
            "#,
        );
        assert!(duplicate.is_err());

        let bad_key = load_str(
            r#"
            [[watchers]]
            name = "w"
            kind = "color_change"
            x = 1
            y = 1
            reaction = { action = "key", key = "hyper" }
            "#,
        );
        assert!(bad_key.is_err());
    }

    #[test]
    fn test_rejects_bad_logging_and_backend() {
        let mut config = Config::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.capture.backend = "vnc".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.matching.threshold = 1.5;
        assert!(config.validate().is_err());
    }
}

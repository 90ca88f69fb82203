use crate::autofish_error;
use crate::error::Result;
use crate::events::{Region, Rgb, WatchEvent, WatchKind, WatchTarget};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_TOLERANCE: u8 = 10;
pub const DEFAULT_MIN_CHANGE: u32 = 10;
pub const DEFAULT_THRESHOLD: f32 = 0.8;
pub const DEFAULT_MIN_DISTANCE: f64 = 10.0;
pub const DEFAULT_PIXEL_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_TEMPLATE_INTERVAL: Duration = Duration::from_millis(500);

/// Колбэк наблюдателя. Вызывается синхронно в контексте опроса.
pub type EventCallback = Arc<dyn Fn(&WatchEvent) -> anyhow::Result<()> + Send + Sync>;

/// Шаблон, который ищется на экране
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateTarget {
    pub path: PathBuf,
    #[serde(default)]
    pub region: Option<Region>,
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    #[serde(default = "default_use_mask")]
    pub use_mask: bool,
}

fn default_threshold() -> f32 {
    DEFAULT_THRESHOLD
}

fn default_use_mask() -> bool {
    true
}

impl TemplateTarget {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            region: None,
            threshold: DEFAULT_THRESHOLD,
            use_mask: true,
        }
    }

    pub fn with_region(mut self, region: Region) -> Self {
        self.region = Some(region);
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_mask(mut self, use_mask: bool) -> Self {
        self.use_mask = use_mask;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(autofish_error!(
                config,
                "Порог уверенности {} вне диапазона 0.0..=1.0 ({})",
                self.threshold,
                self.path.display()
            ));
        }
        if let Some(region) = &self.region {
            if region.is_empty() {
                return Err(autofish_error!(config, "Пустая область поиска: {}", region));
            }
        }
        Ok(())
    }
}

/// Что и как наблюдать
#[derive(Debug, Clone, PartialEq)]
pub enum WatchSpec {
    PixelColor {
        x: i32,
        y: i32,
        target: Rgb,
        tolerance: u8,
    },
    PixelChange {
        x: i32,
        y: i32,
        min_change: u32,
    },
    TemplateFound(TemplateTarget),
    TemplateLost(TemplateTarget),
    TemplateMoved {
        template: TemplateTarget,
        min_distance: f64,
    },
}

impl WatchSpec {
    pub fn kind(&self) -> WatchKind {
        match self {
            WatchSpec::PixelColor { .. } => WatchKind::ColorMatch,
            WatchSpec::PixelChange { .. } => WatchKind::ColorChange,
            WatchSpec::TemplateFound(_) => WatchKind::TemplateFound,
            WatchSpec::TemplateLost(_) => WatchKind::TemplateLost,
            WatchSpec::TemplateMoved { .. } => WatchKind::TemplateMoved,
        }
    }

    pub fn template(&self) -> Option<&TemplateTarget> {
        match self {
            WatchSpec::TemplateFound(template)
            | WatchSpec::TemplateLost(template)
            | WatchSpec::TemplateMoved { template, .. } => Some(template),
            _ => None,
        }
    }

    pub fn target(&self) -> WatchTarget {
        match self {
            WatchSpec::PixelColor { x, y, .. } | WatchSpec::PixelChange { x, y, .. } => {
                WatchTarget::Pixel { x: *x, y: *y }
            }
            WatchSpec::TemplateFound(template)
            | WatchSpec::TemplateLost(template)
            | WatchSpec::TemplateMoved { template, .. } => WatchTarget::Template {
                path: template.path.clone(),
                region: template.region,
            },
        }
    }

    fn default_interval(&self) -> Duration {
        if self.kind().is_template() {
            DEFAULT_TEMPLATE_INTERVAL
        } else {
            DEFAULT_PIXEL_INTERVAL
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            WatchSpec::TemplateMoved {
                template,
                min_distance,
            } => {
                if !min_distance.is_finite() || *min_distance < 0.0 {
                    return Err(autofish_error!(
                        config,
                        "Минимальное смещение должно быть конечным и >= 0, получено {}",
                        min_distance
                    ));
                }
                template.validate()
            }
            WatchSpec::TemplateFound(template) | WatchSpec::TemplateLost(template) => {
                template.validate()
            }
            WatchSpec::PixelColor { .. } | WatchSpec::PixelChange { .. } => Ok(()),
        }
    }
}

/// Неизменяемое описание наблюдателя
#[derive(Clone)]
pub struct WatcherConfig {
    name: String,
    spec: WatchSpec,
    interval: Duration,
    cooldown: Duration,
    trigger_once: bool,
    enabled: bool,
    callback: EventCallback,
}

impl WatcherConfig {
    pub fn new<F>(name: impl Into<String>, spec: WatchSpec, callback: F) -> Self
    where
        F: Fn(&WatchEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::with_callback(name, spec, Arc::new(callback))
    }

    pub fn with_callback(name: impl Into<String>, spec: WatchSpec, callback: EventCallback) -> Self {
        let interval = spec.default_interval();
        Self {
            name: name.into(),
            spec,
            interval,
            cooldown: Duration::ZERO,
            trigger_once: false,
            enabled: true,
            callback,
        }
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn trigger_once(mut self, trigger_once: bool) -> Self {
        self.trigger_once = trigger_once;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spec(&self) -> &WatchSpec {
        &self.spec
    }

    pub fn kind(&self) -> WatchKind {
        self.spec.kind()
    }

    pub fn poll_interval(&self) -> Duration {
        self.interval
    }

    pub fn cooldown_period(&self) -> Duration {
        self.cooldown
    }

    pub fn is_trigger_once(&self) -> bool {
        self.trigger_once
    }

    pub fn starts_enabled(&self) -> bool {
        self.enabled
    }

    pub fn callback(&self) -> &EventCallback {
        &self.callback
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(autofish_error!(config, "Имя наблюдателя не может быть пустым"));
        }
        if self.interval.is_zero() {
            return Err(autofish_error!(
                config,
                "Интервал опроса наблюдателя '{}' должен быть больше нуля",
                self.name
            ));
        }
        self.spec.validate()
    }
}

impl fmt::Debug for WatcherConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatcherConfig")
            .field("name", &self.name)
            .field("spec", &self.spec)
            .field("interval", &self.interval)
            .field("cooldown", &self.cooldown)
            .field("trigger_once", &self.trigger_once)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixel_spec() -> WatchSpec {
        WatchSpec::PixelColor {
            x: 1,
            y: 2,
            target: Rgb::new(255, 100, 0),
            tolerance: DEFAULT_TOLERANCE,
        }
    }

    #[test]
    fn test_defaults_depend_on_kind() {
        let pixel = WatcherConfig::new("pixel", pixel_spec(), |_| Ok(()));
        assert_eq!(pixel.poll_interval(), DEFAULT_PIXEL_INTERVAL);
        assert_eq!(pixel.cooldown_period(), Duration::ZERO);
        assert!(pixel.starts_enabled());
        assert!(!pixel.is_trigger_once());

        let template = WatcherConfig::new(
            "template",
            WatchSpec::TemplateFound(TemplateTarget::new("bobber.png")),
            |_| Ok(()),
        );
        assert_eq!(template.poll_interval(), DEFAULT_TEMPLATE_INTERVAL);
        assert_eq!(template.kind(), WatchKind::TemplateFound);
    }

    #[test]
    fn test_builder_overrides() {
        let config = WatcherConfig::new("bite", pixel_spec(), |_| Ok(()))
            .interval(Duration::from_millis(50))
            .cooldown(Duration::from_secs(1))
            .trigger_once(true)
            .enabled(false);

        assert_eq!(config.poll_interval(), Duration::from_millis(50));
        assert_eq!(config.cooldown_period(), Duration::from_secs(1));
        assert!(config.is_trigger_once());
        assert!(!config.starts_enabled());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_numbers() {
        let zero = WatcherConfig::new("zero", pixel_spec(), |_| Ok(())).interval(Duration::ZERO);
        assert!(zero.validate().is_err());

        let unnamed = WatcherConfig::new("  ", pixel_spec(), |_| Ok(()));
        assert!(unnamed.validate().is_err());

        let threshold = WatchSpec::TemplateFound(TemplateTarget::new("a.png").with_threshold(1.5));
        assert!(threshold.validate().is_err());

        for min_distance in [-1.0, f64::NAN, f64::INFINITY] {
            let moved = WatchSpec::TemplateMoved {
                template: TemplateTarget::new("a.png"),
                min_distance,
            };
            assert!(moved.validate().is_err());
        }

        let empty_region =
            WatchSpec::TemplateLost(TemplateTarget::new("a.png").with_region(Region::new(0, 0, 0, 10)));
        assert!(empty_region.validate().is_err());
    }

    #[test]
    fn test_target_description() {
        assert_eq!(pixel_spec().target(), WatchTarget::Pixel { x: 1, y: 2 });

        let spec = WatchSpec::TemplateMoved {
            template: TemplateTarget::new("float.png").with_region(Region::new(0, 0, 100, 100)),
            min_distance: DEFAULT_MIN_DISTANCE,
        };
        assert_eq!(
            spec.target(),
            WatchTarget::Template {
                path: PathBuf::from("float.png"),
                region: Some(Region::new(0, 0, 100, 100)),
            }
        );
        assert!(spec.template().is_some());
        assert!(pixel_spec().template().is_none());
    }

    #[test]
    fn test_template_target_from_toml() {
        use figment::providers::{Format, Toml};

        let target: TemplateTarget = figment::Figment::from(Toml::string(r#"path = "bobber.png""#))
            .extract()
            .unwrap();
        assert_eq!(target, TemplateTarget::new("bobber.png"));
    }
}

use super::{Region, Rgb, TemplateMatch};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::SystemTime;

/// Вид события, за которым следит наблюдатель
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchKind {
    ColorMatch,
    ColorChange,
    TemplateFound,
    TemplateLost,
    TemplateMoved,
}

impl WatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WatchKind::ColorMatch => "color_match",
            WatchKind::ColorChange => "color_change",
            WatchKind::TemplateFound => "template_found",
            WatchKind::TemplateLost => "template_lost",
            WatchKind::TemplateMoved => "template_moved",
        }
    }

    pub fn is_template(&self) -> bool {
        matches!(
            self,
            WatchKind::TemplateFound | WatchKind::TemplateLost | WatchKind::TemplateMoved
        )
    }
}

impl fmt::Display for WatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Идентификатор наблюдателя внутри реестра
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WatcherId(pub u64);

impl fmt::Display for WatcherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Что именно наблюдается: пиксель или шаблон
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WatchTarget {
    Pixel { x: i32, y: i32 },
    Template {
        path: PathBuf,
        region: Option<Region>,
    },
}

impl fmt::Display for WatchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchTarget::Pixel { x, y } => write!(f, "pixel ({}, {})", x, y),
            WatchTarget::Template { path, region: None } => {
                write!(f, "template {}", path.display())
            }
            WatchTarget::Template {
                path,
                region: Some(region),
            } => write!(f, "template {} in {}", path.display(), region),
        }
    }
}

/// Данные, специфичные для вида события
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventDetail {
    ColorMatch {
        color: Rgb,
        target: Rgb,
        tolerance: u8,
    },
    ColorChange {
        previous: Rgb,
        current: Rgb,
        difference: u32,
    },
    TemplateFound {
        found: TemplateMatch,
    },
    TemplateLost {
        last_seen: Option<TemplateMatch>,
    },
    TemplateMoved {
        previous: TemplateMatch,
        current: TemplateMatch,
        distance: f64,
    },
}

impl EventDetail {
    pub fn kind(&self) -> WatchKind {
        match self {
            EventDetail::ColorMatch { .. } => WatchKind::ColorMatch,
            EventDetail::ColorChange { .. } => WatchKind::ColorChange,
            EventDetail::TemplateFound { .. } => WatchKind::TemplateFound,
            EventDetail::TemplateLost { .. } => WatchKind::TemplateLost,
            EventDetail::TemplateMoved { .. } => WatchKind::TemplateMoved,
        }
    }
}

/// Снимок одного срабатывания наблюдателя
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchEvent {
    pub watcher: String,
    pub watcher_id: WatcherId,
    pub target: WatchTarget,
    /// Порядковый номер срабатывания (монотонный в пределах наблюдателя)
    pub sequence: u64,
    pub timestamp: SystemTime,
    pub detail: EventDetail,
}

impl WatchEvent {
    pub fn kind(&self) -> WatchKind {
        self.detail.kind()
    }

    /// Текущий цвет для пиксельных событий
    pub fn current_color(&self) -> Option<Rgb> {
        match &self.detail {
            EventDetail::ColorMatch { color, .. } => Some(*color),
            EventDetail::ColorChange { current, .. } => Some(*current),
            _ => None,
        }
    }

    /// Текущее совпадение шаблона, если шаблон виден
    pub fn current_match(&self) -> Option<&TemplateMatch> {
        match &self.detail {
            EventDetail::TemplateFound { found } => Some(found),
            EventDetail::TemplateMoved { current, .. } => Some(current),
            _ => None,
        }
    }

    /// Точка на экране, к которой относится событие
    pub fn location(&self) -> Option<(i32, i32)> {
        match (&self.target, self.current_match()) {
            (_, Some(found)) => Some(found.center),
            (WatchTarget::Pixel { x, y }, None) => Some((*x, *y)),
            (WatchTarget::Template { .. }, None) => None,
        }
    }
}

impl fmt::Display for WatchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} #{} ({})",
            self.watcher,
            self.kind(),
            self.sequence,
            self.target
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(target: WatchTarget, detail: EventDetail) -> WatchEvent {
        WatchEvent {
            watcher: "test".to_string(),
            watcher_id: WatcherId(1),
            target,
            sequence: 1,
            timestamp: SystemTime::now(),
            detail,
        }
    }

    #[test]
    fn test_kind_follows_detail() {
        let detail = EventDetail::ColorChange {
            previous: Rgb::BLACK,
            current: Rgb::new(10, 0, 0),
            difference: 10,
        };
        assert_eq!(detail.kind(), WatchKind::ColorChange);
        assert!(!detail.kind().is_template());
        assert!(WatchKind::TemplateLost.is_template());
    }

    #[test]
    fn test_location_prefers_match_center() {
        let pixel = event(
            WatchTarget::Pixel { x: 10, y: 20 },
            EventDetail::ColorMatch {
                color: Rgb::BLACK,
                target: Rgb::BLACK,
                tolerance: 0,
            },
        );
        assert_eq!(pixel.location(), Some((10, 20)));
        assert_eq!(pixel.current_color(), Some(Rgb::BLACK));

        let found = TemplateMatch::new((100, 100), 0.95, (20, 20), true);
        let template = event(
            WatchTarget::Template {
                path: PathBuf::from("bobber.png"),
                region: None,
            },
            EventDetail::TemplateFound { found },
        );
        assert_eq!(template.location(), Some((110, 110)));

        let lost = event(
            WatchTarget::Template {
                path: PathBuf::from("bobber.png"),
                region: None,
            },
            EventDetail::TemplateLost { last_seen: None },
        );
        assert_eq!(lost.location(), None);
    }

    #[test]
    fn test_display() {
        let e = event(
            WatchTarget::Pixel { x: 1, y: 2 },
            EventDetail::ColorMatch {
                color: Rgb::BLACK,
                target: Rgb::BLACK,
                tolerance: 0,
            },
        );
        assert_eq!(e.to_string(), "[test] color_match #1 (pixel (1, 2))");
    }
}

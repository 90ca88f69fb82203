use crate::events::WatchEvent;
use crate::services::VirtualDevice;
use crate::watcher::EventCallback;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Что сделать, когда наблюдатель сработал
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Reaction {
    /// Только записать событие в лог
    #[default]
    Log,
    /// Нажать и отпустить клавишу
    Key { key: String },
    /// Клик в фиксированной точке
    Click { x: i32, y: i32 },
    /// Клик в точке события: центр совпадения или наблюдаемый пиксель
    ClickMatch,
}

/// Исполняет реакции через виртуальное устройство
pub struct Reactor {
    device: Arc<VirtualDevice>,
    press_duration: Duration,
}

impl Reactor {
    pub fn new(device: Arc<VirtualDevice>, press_duration: Duration) -> Self {
        Self {
            device,
            press_duration,
        }
    }

    /// Выполнить реакцию; `false`, если ввод не удался
    pub fn react(&self, reaction: &Reaction, event: &WatchEvent) -> bool {
        match reaction {
            Reaction::Log => {
                info!("Событие: {}", event);
                true
            }
            Reaction::Key { key } => {
                info!("{} -> клавиша '{}'", event, key);
                self.device.press(key, self.press_duration)
            }
            Reaction::Click { x, y } => {
                info!("{} -> клик в ({}, {})", event, x, y);
                self.device.click(*x, *y)
            }
            Reaction::ClickMatch => match event.location() {
                Some((x, y)) => {
                    info!("{} -> клик в точке события ({}, {})", event, x, y);
                    self.device.click(x, y)
                }
                None => {
                    warn!("{}: у события нет координат для клика", event);
                    false
                }
            },
        }
    }

    /// Колбэк наблюдателя, исполняющий реакцию
    pub fn callback(self: &Arc<Self>, reaction: Reaction) -> EventCallback {
        let reactor = Arc::clone(self);
        Arc::new(move |event: &WatchEvent| -> anyhow::Result<()> {
            if !reactor.react(&reaction, event) {
                anyhow::bail!("реакция {:?} не выполнена", reaction);
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventDetail, Rgb, TemplateMatch, WatchTarget, WatcherId};
    use std::path::PathBuf;
    use std::time::SystemTime;

    fn reactor() -> Arc<Reactor> {
        let device = Arc::new(VirtualDevice::new("autofish test", (1920, 1080), true).unwrap());
        Arc::new(Reactor::new(device, Duration::ZERO))
    }

    fn lost_event() -> WatchEvent {
        WatchEvent {
            watcher: "bobber".to_string(),
            watcher_id: WatcherId(1),
            target: WatchTarget::Template {
                path: PathBuf::from("bobber.png"),
                region: None,
            },
            sequence: 1,
            timestamp: SystemTime::now(),
            detail: EventDetail::TemplateLost {
                last_seen: Some(TemplateMatch::new((0, 0), 0.9, (4, 4), true)),
            },
        }
    }

    fn color_event() -> WatchEvent {
        WatchEvent {
            watcher: "bite".to_string(),
            watcher_id: WatcherId(2),
            target: WatchTarget::Pixel { x: 960, y: 540 },
            sequence: 3,
            timestamp: SystemTime::now(),
            detail: EventDetail::ColorMatch {
                color: Rgb::new(255, 100, 0),
                target: Rgb::new(255, 100, 0),
                tolerance: 10,
            },
        }
    }

    #[test]
    fn test_reactions_in_dry_run() {
        let reactor = reactor();

        assert!(reactor.react(&Reaction::Log, &color_event()));
        assert!(reactor.react(&Reaction::Key { key: "e".into() }, &color_event()));
        assert!(reactor.react(&Reaction::Click { x: 1, y: 2 }, &color_event()));
        assert!(reactor.react(&Reaction::ClickMatch, &color_event()));
        assert!(!reactor.react(&Reaction::Key { key: "hyper".into() }, &color_event()));
    }

    #[test]
    fn test_click_match_needs_location() {
        let reactor = reactor();
        assert!(!reactor.react(&Reaction::ClickMatch, &lost_event()));
    }

    #[test]
    fn test_callback_reports_failure() {
        let reactor = reactor();
        let callback = reactor.callback(Reaction::Key {
            key: "hyper".into(),
        });

        assert!(callback(&color_event()).is_err());
        assert!(reactor.callback(Reaction::Log)(&color_event()).is_ok());
    }

    #[test]
    fn test_reaction_from_toml() {
        use figment::providers::{Format, Toml};

        #[derive(Deserialize)]
        struct Entry {
            reaction: Reaction,
        }

        let entry: Entry = figment::Figment::from(Toml::string(
            r#"reaction = { action = "key", key = "e" }"#,
        ))
        .extract()
        .unwrap();
        assert_eq!(entry.reaction, Reaction::Key { key: "e".into() });
    }
}

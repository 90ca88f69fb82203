use crate::events::{TemplateMatch, WatchKind, WatchTarget, WatcherId};
use serde::Serialize;
use std::fmt;
use std::time::{Duration, SystemTime};

/// Снимок состояния наблюдателя
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WatcherStatus {
    pub name: String,
    pub id: WatcherId,
    pub kind: WatchKind,
    pub target: WatchTarget,
    pub running: bool,
    pub enabled: bool,
    pub trigger_count: u64,
    pub last_trigger_time: Option<SystemTime>,
    /// Для шаблонных наблюдателей: виден ли шаблон на последнем опросе
    pub template_present: Option<bool>,
    /// Последнее замеченное положение шаблона
    pub last_match: Option<TemplateMatch>,
    pub interval: Duration,
}

impl fmt::Display for WatcherStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match (self.running, self.enabled) {
            (true, true) => "активен",
            (true, false) => "приостановлен",
            (false, _) => "остановлен",
        };
        write!(
            f,
            "{} {} [{}] {}: срабатываний {}",
            self.id, self.name, self.kind, state, self.trigger_count
        )?;
        if let Some(present) = self.template_present {
            write!(f, ", шаблон {}", if present { "виден" } else { "не виден" })?;
        }
        if let Some(found) = &self.last_match {
            write!(f, ", последнее положение ({}, {})", found.center.0, found.center.1)?;
        }
        Ok(())
    }
}

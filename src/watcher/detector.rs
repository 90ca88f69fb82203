//! Детектор переходов состояния одного наблюдателя.
//!
//! Не знает ничего о захвате экрана и потоках: получает наблюдение и момент
//! времени, возвращает событие, если переход произошёл и кулдаун позволяет.

use super::config::WatchSpec;
use crate::events::{colors_match, EventDetail, Rgb, TemplateMatch};
use std::time::{Duration, Instant};

/// Результат одного опроса
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Observation {
    Color(Rgb),
    /// `None`: шаблон не найден (или уверенность ниже порога)
    Template(Option<TemplateMatch>),
}

#[derive(Debug, Clone)]
enum DetectorState {
    ColorMatch {
        target: Rgb,
        tolerance: u8,
    },
    ColorChange {
        min_change: u32,
        baseline: Option<Rgb>,
    },
    TemplateFound {
        present: bool,
        last: Option<TemplateMatch>,
    },
    TemplateLost {
        present: bool,
        last: Option<TemplateMatch>,
    },
    TemplateMoved {
        min_distance: f64,
        last: Option<TemplateMatch>,
    },
}

#[derive(Debug, Clone)]
pub struct Detector {
    state: DetectorState,
    cooldown: Duration,
    last_trigger: Option<Instant>,
}

impl Detector {
    pub fn new(spec: &WatchSpec, cooldown: Duration) -> Self {
        let state = match spec {
            WatchSpec::PixelColor {
                target, tolerance, ..
            } => DetectorState::ColorMatch {
                target: *target,
                tolerance: *tolerance,
            },
            WatchSpec::PixelChange { min_change, .. } => DetectorState::ColorChange {
                min_change: *min_change,
                baseline: None,
            },
            WatchSpec::TemplateFound(_) => DetectorState::TemplateFound {
                present: false,
                last: None,
            },
            WatchSpec::TemplateLost(_) => DetectorState::TemplateLost {
                present: false,
                last: None,
            },
            WatchSpec::TemplateMoved { min_distance, .. } => DetectorState::TemplateMoved {
                min_distance: *min_distance,
                last: None,
            },
        };

        Self {
            state,
            cooldown,
            last_trigger: None,
        }
    }

    /// Задать начальный базовый цвет (только для ColorChange)
    pub fn seed_baseline(&mut self, color: Rgb) {
        if let DetectorState::ColorChange { baseline, .. } = &mut self.state {
            *baseline = Some(color);
        }
    }

    #[cfg(test)]
    pub fn baseline(&self) -> Option<Rgb> {
        match &self.state {
            DetectorState::ColorChange { baseline, .. } => *baseline,
            _ => None,
        }
    }

    /// Виден ли шаблон по мнению детектора; `None` для пиксельных детекторов
    pub fn template_present(&self) -> Option<bool> {
        match &self.state {
            DetectorState::TemplateFound { present, .. } | DetectorState::TemplateLost { present, .. } => {
                Some(*present)
            }
            DetectorState::TemplateMoved { last, .. } => Some(last.is_some()),
            _ => None,
        }
    }

    /// Последнее замеченное положение шаблона
    pub fn last_match(&self) -> Option<TemplateMatch> {
        match &self.state {
            DetectorState::TemplateFound { last, .. }
            | DetectorState::TemplateLost { last, .. }
            | DetectorState::TemplateMoved { last, .. } => *last,
            _ => None,
        }
    }

    fn cooldown_ready(&self, now: Instant) -> bool {
        match self.last_trigger {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.cooldown,
        }
    }

    /// Обработать наблюдение. Состояние (базовый цвет, присутствие, последнее
    /// совпадение) обновляется всегда, кулдаун подавляет только само событие.
    pub fn observe(&mut self, observation: Observation, now: Instant) -> Option<EventDetail> {
        let candidate = match (&mut self.state, observation) {
            (DetectorState::ColorMatch { target, tolerance }, Observation::Color(color)) => {
                colors_match(&color, target, *tolerance).then(|| EventDetail::ColorMatch {
                    color,
                    target: *target,
                    tolerance: *tolerance,
                })
            }

            (
                DetectorState::ColorChange {
                    min_change,
                    baseline,
                },
                Observation::Color(color),
            ) => match *baseline {
                None => {
                    *baseline = Some(color);
                    None
                }
                Some(previous) => {
                    let difference = color.difference(&previous);
                    if difference >= *min_change {
                        *baseline = Some(color);
                        Some(EventDetail::ColorChange {
                            previous,
                            current: color,
                            difference,
                        })
                    } else {
                        None
                    }
                }
            },

            (DetectorState::TemplateFound { present, last }, Observation::Template(found)) => {
                let appeared = found.is_some() && !*present;
                *present = found.is_some();
                if found.is_some() {
                    *last = found;
                }
                match found {
                    Some(found) if appeared => Some(EventDetail::TemplateFound { found }),
                    _ => None,
                }
            }

            (DetectorState::TemplateLost { present, last }, Observation::Template(found)) => {
                match found {
                    Some(found) => {
                        *present = true;
                        *last = Some(found);
                        None
                    }
                    None if *present => {
                        *present = false;
                        Some(EventDetail::TemplateLost {
                            last_seen: last.take(),
                        })
                    }
                    None => None,
                }
            }

            (DetectorState::TemplateMoved { min_distance, last }, Observation::Template(found)) => {
                let previous = *last;
                *last = found;
                match (previous, found) {
                    (Some(previous), Some(current)) => {
                        let distance = previous.distance_to(&current);
                        (distance >= *min_distance).then_some(EventDetail::TemplateMoved {
                            previous,
                            current,
                            distance,
                        })
                    }
                    _ => None,
                }
            }

            // Наблюдение не того вида: игнорируем
            _ => None,
        };

        let detail = candidate?;
        if !self.cooldown_ready(now) {
            return None;
        }
        self.last_trigger = Some(now);
        Some(detail)
    }
}

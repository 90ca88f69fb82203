//! Постоянные наблюдатели за экраном для автоматизации рыбалки.
//!
//! Наблюдатель опрашивает пиксель или шаблон на своём таймере и вызывает
//! колбэки на переходах: цвет совпал, цвет изменился, шаблон появился,
//! пропал или сдвинулся. [`Vision`] собирает захват, матчер и реестр в
//! одну точку входа.

pub mod config;
pub mod error;
pub mod events;
pub mod services;
pub mod utils;
pub mod vision;
pub mod watcher;

#[cfg(test)]
mod testing;

pub use error::{AutofishError, Result};
pub use events::{EventDetail, Region, Rgb, TemplateMatch, WatchEvent, WatchKind, WatchTarget, WatcherId};
pub use services::MaskShape;
pub use vision::{Vision, WatchOptions};
pub use watcher::{TemplateTarget, WatchContext, WatchSpec, WatcherConfig, WatcherRegistry, WatcherStatus};

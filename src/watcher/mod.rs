//! Persistent screen watchers: responsibility and boundaries
//!
//! A watcher polls one pixel or one template on its own timer, turns the
//! observations into transition events and hands them to callbacks. It does
//! not decide what to do about an event: reactions (input injection, logging)
//! are supplied by the caller as callbacks.

pub mod config;
mod context;
mod detector;
mod registry;
mod status;
#[allow(clippy::module_inception)]
mod watcher;

pub use self::config::{
    EventCallback, TemplateTarget, WatchSpec, WatcherConfig, DEFAULT_MIN_CHANGE, DEFAULT_MIN_DISTANCE,
    DEFAULT_THRESHOLD, DEFAULT_TOLERANCE,
};
pub use self::context::{WatchContext, DEFAULT_STOP_TIMEOUT};
pub use self::detector::{Detector, Observation};
pub use self::registry::WatcherRegistry;
pub use self::status::WatcherStatus;
pub use self::watcher::Watcher;
pub(crate) use self::watcher::{locate_masked, locate_template};

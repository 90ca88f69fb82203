pub mod color;
pub mod template;
pub mod watch;

pub use color::{colors_match, Rgb};
pub use template::{Region, TemplateMatch};
pub use watch::{EventDetail, WatchEvent, WatchKind, WatchTarget, WatcherId};

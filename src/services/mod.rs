pub mod keycode_map;
pub mod matcher;
pub mod reactor;
pub mod screen_source;
pub mod virtual_device;

pub use matcher::{MaskShape, NccMatcher, TemplateMatcher, TemplateStore};
pub use reactor::{Reaction, Reactor};
pub use screen_source::{create_screen_source, ScreenCapture, ScreenSource};
pub use virtual_device::VirtualDevice;

//! ScreenSource service: responsibility and boundaries
//!
//! This module only acquires screen pixels. Each polling context opens its own
//! ScreenCapture handle and drops it when the context ends. Matching, detection
//! and reactions live elsewhere.

mod dry_run;
#[cfg(any(feature = "xcap", test))]
mod frame_cache;
mod r#trait;
#[cfg(feature = "xcap")]
mod xcap;

pub use self::dry_run::DryRunScreen;
#[cfg(any(feature = "xcap", test))]
pub(crate) use self::r#trait::crop_region;
pub(crate) use self::r#trait::crop_to_region;
pub use self::r#trait::{create_screen_source, ScreenCapture, ScreenSource};
#[cfg(feature = "xcap")]
pub use self::xcap::XcapScreen;

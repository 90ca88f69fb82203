//! Template matching: the cached template store and the matching primitive.
//!
//! The matcher only answers "where is the best match and how confident is it".
//! Thresholds, regions and state transitions belong to the callers.

mod mask;
mod ncc;
mod template_store;

pub use self::mask::MaskShape;
pub use self::ncc::NccMatcher;
pub use self::template_store::{Template, TemplateStore, TransparencyInfo};

use crate::events::TemplateMatch;
use image::{GrayImage, RgbImage};

/// Поиск шаблона на кадре
pub trait TemplateMatcher: Send + Sync {
    /// Лучшая позиция шаблона на кадре (координаты относительно кадра)
    fn best_match(
        &self,
        screen: &RgbImage,
        template: &RgbImage,
        mask: Option<&GrayImage>,
    ) -> Option<TemplateMatch>;

    /// Все позиции с уверенностью не ниже порога, лучшие первыми
    fn all_matches(
        &self,
        screen: &RgbImage,
        template: &RgbImage,
        mask: Option<&GrayImage>,
        threshold: f32,
    ) -> Vec<TemplateMatch> {
        self.best_match(screen, template, mask)
            .filter(|found| found.confidence >= threshold)
            .into_iter()
            .collect()
    }
}

use crate::autofish_error;
use crate::config::CaptureConfig;
use crate::error::Result;
use crate::events::{Region, Rgb};
use image::RgbImage;
use std::sync::Arc;

/// Открытый дескриптор захвата экрана.
///
/// Дескриптор принадлежит ровно одному контексту опроса и закрывается вместе с ним (Drop).
pub trait ScreenCapture: Send {
    /// Снимок области экрана или всего основного монитора
    fn capture(&mut self, region: Option<Region>) -> Result<RgbImage>;

    /// Цвет одного пикселя
    fn pixel(&mut self, x: i32, y: i32) -> Result<Rgb> {
        let frame = self.capture(Some(Region::pixel(x, y)))?;
        frame
            .get_pixel_checked(0, 0)
            .map(|pixel| Rgb::from(*pixel))
            .ok_or_else(|| autofish_error!(capture, "Пустой кадр для пикселя ({}, {})", x, y))
    }
}

/// Источник экранных кадров, разделяемый между наблюдателями
pub trait ScreenSource: Send + Sync {
    fn name(&self) -> &str;

    /// Открыть новый дескриптор захвата для вызывающего контекста
    fn open(&self) -> Result<Box<dyn ScreenCapture>>;
}

/// Factory function to create a screen source based on the configured backend and the dry_run flag
pub fn create_screen_source(config: &CaptureConfig, dry_run: bool) -> Result<Arc<dyn ScreenSource>> {
    if dry_run || config.backend == "dry_run" {
        return Ok(Arc::new(super::dry_run::DryRunScreen::new(
            config.screen_width,
            config.screen_height,
        )));
    }

    match config.backend.as_str() {
        #[cfg(feature = "xcap")]
        "xcap" => Ok(Arc::new(super::xcap::XcapScreen::new())),
        #[cfg(not(feature = "xcap"))]
        "xcap" => Err(autofish_error!(
            config,
            "Бэкенд захвата 'xcap' недоступен: соберите с --features xcap или используйте --dry-run"
        )),
        other => Err(autofish_error!(config, "Неизвестный бэкенд захвата: {}", other)),
    }
}

/// Обрезать кадр монитора до области, заданной в координатах экрана
pub(crate) fn crop_to_region(
    frame: RgbImage,
    origin: (i32, i32),
    region: Option<Region>,
) -> Result<RgbImage> {
    match region {
        Some(region) => crop_region(&frame, origin, region),
        None => Ok(frame),
    }
}

/// Копия области кадра; `origin` - экранные координаты левого верхнего угла кадра
pub(crate) fn crop_region(frame: &RgbImage, origin: (i32, i32), region: Region) -> Result<RgbImage> {
    if region.is_empty() {
        return Err(autofish_error!(capture, "Пустая область захвата: {}", region));
    }

    let left = i64::from(region.left) - i64::from(origin.0);
    let top = i64::from(region.top) - i64::from(origin.1);
    let right = left + i64::from(region.width);
    let bottom = top + i64::from(region.height);

    if left < 0 || top < 0 || right > i64::from(frame.width()) || bottom > i64::from(frame.height()) {
        return Err(autofish_error!(
            capture,
            "Область {} выходит за пределы экрана {}x{}",
            region,
            frame.width(),
            frame.height()
        ));
    }

    Ok(image::imageops::crop_imm(frame, left as u32, top as u32, region.width, region.height).to_image())
}

use super::crop_region;
use crate::autofish_error;
use crate::error::Result;
use crate::events::{Region, Rgb};
use image::RgbImage;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Снимок монитора и экранные координаты его левого верхнего угла
#[derive(Clone)]
pub(crate) struct Frame {
    pub origin: (i32, i32),
    pub image: Arc<RgbImage>,
}

impl Frame {
    pub(crate) fn new(origin: (i32, i32), image: RgbImage) -> Self {
        Self {
            origin,
            image: Arc::new(image),
        }
    }

    pub(crate) fn region(&self, region: Option<Region>) -> Result<RgbImage> {
        match region {
            Some(region) => crop_region(&self.image, self.origin, region),
            None => Ok(self.image.as_ref().clone()),
        }
    }

    /// Пиксель в экранных координатах без копирования кадра
    pub(crate) fn pixel(&self, x: i32, y: i32) -> Result<Rgb> {
        let local_x = u32::try_from(i64::from(x) - i64::from(self.origin.0)).ok();
        let local_y = u32::try_from(i64::from(y) - i64::from(self.origin.1)).ok();

        local_x
            .zip(local_y)
            .and_then(|(lx, ly)| self.image.get_pixel_checked(lx, ly))
            .map(|pixel| Rgb::from(*pixel))
            .ok_or_else(|| {
                autofish_error!(
                    capture,
                    "Пиксель ({}, {}) вне экрана {}x{}",
                    x,
                    y,
                    self.image.width(),
                    self.image.height()
                )
            })
    }
}

/// Последний снимок, общий для всех дескрипторов одного источника.
///
/// Наблюдатели, опрашивающие экран в пределах `max_age`, читают один кадр
/// вместо того, чтобы каждый снимал монитор целиком.
pub(crate) struct FrameCache {
    max_age: Duration,
    latest: Mutex<Option<(Instant, Frame)>>,
}

impl FrameCache {
    pub(crate) fn new(max_age: Duration) -> Self {
        Self {
            max_age,
            latest: Mutex::new(None),
        }
    }

    /// Свежий кадр из кэша или новый снимок. Параллельные вызовы ждут один снимок.
    pub(crate) fn get_or_capture(&self, capture: impl FnOnce() -> Result<Frame>) -> Result<Frame> {
        let mut latest = self.latest.lock();
        if let Some((taken, frame)) = latest.as_ref() {
            if taken.elapsed() <= self.max_age {
                return Ok(frame.clone());
            }
        }

        let frame = capture()?;
        *latest = Some((Instant::now(), frame.clone()));
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn gradient_frame(origin: (i32, i32)) -> Frame {
        Frame::new(origin, RgbImage::from_fn(8, 6, |x, y| image::Rgb([x as u8, y as u8, 7])))
    }

    #[test]
    fn test_fresh_frame_is_reused() {
        let cache = FrameCache::new(Duration::from_secs(60));
        let captures = Cell::new(0);
        let capture = || {
            captures.set(captures.get() + 1);
            Ok(gradient_frame((0, 0)))
        };

        for _ in 0..5 {
            cache.get_or_capture(capture).unwrap();
        }
        assert_eq!(captures.get(), 1);
    }

    #[test]
    fn test_stale_frame_is_recaptured() {
        let cache = FrameCache::new(Duration::ZERO);
        let captures = Cell::new(0);
        let capture = || {
            captures.set(captures.get() + 1);
            Ok(gradient_frame((0, 0)))
        };

        cache.get_or_capture(capture).unwrap();
        std::thread::sleep(Duration::from_millis(2));
        cache.get_or_capture(capture).unwrap();
        assert_eq!(captures.get(), 2);
    }

    #[test]
    fn test_failed_capture_is_not_cached() {
        let cache = FrameCache::new(Duration::from_secs(60));
        assert!(cache
            .get_or_capture(|| Err(autofish_error!(capture, "нет экрана")))
            .is_err());
        assert!(cache.get_or_capture(|| Ok(gradient_frame((0, 0)))).is_ok());
    }

    #[test]
    fn test_pixel_and_region_use_screen_coordinates() {
        let frame = gradient_frame((100, 50));

        assert_eq!(frame.pixel(103, 52).unwrap(), Rgb::new(3, 2, 7));
        assert!(frame.pixel(99, 50).is_err());
        assert!(frame.pixel(108, 50).is_err());

        let region = frame.region(Some(Region::new(102, 53, 3, 2))).unwrap();
        assert_eq!(region.dimensions(), (3, 2));
        assert_eq!(region.get_pixel(0, 0).0, [2, 3, 7]);
        assert_eq!(frame.region(None).unwrap().dimensions(), (8, 6));
    }
}

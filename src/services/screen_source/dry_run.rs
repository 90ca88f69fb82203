use super::{crop_to_region, ScreenCapture, ScreenSource};
use crate::error::Result;
use crate::events::{Region, Rgb};
use image::RgbImage;
use std::time::{Duration, Instant};
use tracing::{debug, info};

const BACKGROUND: Rgb = Rgb::new(40, 60, 90);
const BITE: Rgb = Rgb::new(255, 100, 0);
const BITE_PERIOD: Duration = Duration::from_secs(10);
const BITE_LENGTH: Duration = Duration::from_millis(1500);

/// Эмуляция экрана для dry-run режима.
///
/// Экран залит фоновым цветом; каждые 10 секунд на полторы секунды он
/// окрашивается в цвет поклёвки, так что пиксельные наблюдатели срабатывают без игры.
pub struct DryRunScreen {
    width: u32,
    height: u32,
    started: Instant,
}

impl DryRunScreen {
    pub fn new(width: u32, height: u32) -> Self {
        info!(
            "Dry-run режим - захват экрана эмулируется ({}x{})",
            width, height
        );
        Self {
            width,
            height,
            started: Instant::now(),
        }
    }

    fn color_at(started: Instant) -> Rgb {
        let phase = started.elapsed().as_millis() % BITE_PERIOD.as_millis();
        if phase < BITE_LENGTH.as_millis() {
            BITE
        } else {
            BACKGROUND
        }
    }
}

impl ScreenSource for DryRunScreen {
    fn name(&self) -> &str {
        "dry_run"
    }

    fn open(&self) -> Result<Box<dyn ScreenCapture>> {
        debug!("Dry-run: открыт дескриптор захвата");
        Ok(Box::new(DryRunCapture {
            width: self.width,
            height: self.height,
            started: self.started,
        }))
    }
}

struct DryRunCapture {
    width: u32,
    height: u32,
    started: Instant,
}

impl ScreenCapture for DryRunCapture {
    fn capture(&mut self, region: Option<Region>) -> Result<RgbImage> {
        let color = DryRunScreen::color_at(self.started);

        // Полный кадр нужен только для обрезки, поэтому сразу рисуем область
        match region {
            Some(region) => {
                let bounds = RgbImage::new(self.width, self.height);
                let cropped = crop_to_region(bounds, (0, 0), Some(region))?;
                Ok(RgbImage::from_pixel(
                    cropped.width(),
                    cropped.height(),
                    image::Rgb(color.channels()),
                ))
            }
            None => Ok(RgbImage::from_pixel(
                self.width,
                self.height,
                image::Rgb(color.channels()),
            )),
        }
    }

    fn pixel(&mut self, x: i32, y: i32) -> Result<Rgb> {
        if x < 0 || y < 0 || x as u32 >= self.width || y as u32 >= self.height {
            return Err(crate::autofish_error!(
                capture,
                "Пиксель ({}, {}) вне экрана {}x{}",
                x,
                y,
                self.width,
                self.height
            ));
        }
        Ok(DryRunScreen::color_at(self.started))
    }
}

impl Drop for DryRunCapture {
    fn drop(&mut self) {
        debug!("Dry-run: дескриптор захвата закрыт");
    }
}

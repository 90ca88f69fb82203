use super::frame_cache::{Frame, FrameCache};
use super::{ScreenCapture, ScreenSource};
use crate::autofish_error;
use crate::error::Result;
use crate::events::{Region, Rgb};
use image::{DynamicImage, RgbImage};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use ::xcap::Monitor;

/// Сколько живёт общий кадр: xcap умеет снимать только монитор целиком
const FRAME_MAX_AGE: Duration = Duration::from_millis(25);

/// Захват основного монитора через xcap (X11 / Wayland portal)
pub struct XcapScreen {
    frames: Arc<FrameCache>,
}

impl Default for XcapScreen {
    fn default() -> Self {
        Self::new()
    }
}

impl XcapScreen {
    pub fn new() -> Self {
        info!("Используется бэкенд захвата экрана: xcap");
        Self {
            frames: Arc::new(FrameCache::new(FRAME_MAX_AGE)),
        }
    }
}

impl ScreenSource for XcapScreen {
    fn name(&self) -> &str {
        "xcap"
    }

    fn open(&self) -> Result<Box<dyn ScreenCapture>> {
        // Проверяем, что монитор вообще доступен, до первого опроса
        let monitor = primary_monitor()?;
        debug!(
            "xcap: основной монитор {}x{} в ({}, {})",
            monitor.width(),
            monitor.height(),
            monitor.x(),
            monitor.y()
        );
        Ok(Box::new(XcapCapture {
            frames: Arc::clone(&self.frames),
        }))
    }
}

/// Мониторы перечисляются при каждом снимке: дескрипторы xcap не везде Send
struct XcapCapture {
    frames: Arc<FrameCache>,
}

impl XcapCapture {
    fn frame(&self) -> Result<Frame> {
        self.frames.get_or_capture(|| {
            let monitor = primary_monitor()?;
            let image = monitor
                .capture_image()
                .map_err(|e| autofish_error!(capture, "xcap не смог снять экран: {}", e))?;
            Ok(Frame::new(
                (monitor.x(), monitor.y()),
                DynamicImage::ImageRgba8(image).to_rgb8(),
            ))
        })
    }
}

impl ScreenCapture for XcapCapture {
    fn capture(&mut self, region: Option<Region>) -> Result<RgbImage> {
        self.frame()?.region(region)
    }

    fn pixel(&mut self, x: i32, y: i32) -> Result<Rgb> {
        self.frame()?.pixel(x, y)
    }
}

fn primary_monitor() -> Result<Monitor> {
    let monitors =
        Monitor::all().map_err(|e| autofish_error!(capture, "Не удалось получить мониторы: {}", e))?;

    let mut fallback = None;
    for monitor in monitors {
        if monitor.is_primary() {
            return Ok(monitor);
        }
        fallback.get_or_insert(monitor);
    }

    fallback.ok_or_else(|| autofish_error!(capture, "Мониторы не найдены"))
}

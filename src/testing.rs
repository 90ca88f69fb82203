//! Заглушки для тестов: управляемый экран, управляемый матчер и запись событий

use crate::error::Result;
use crate::events::{Region, Rgb, TemplateMatch, WatchEvent};
use crate::services::matcher::{Template, TemplateMatcher};
use crate::services::screen_source::{ScreenCapture, ScreenSource};
use crate::watcher::{EventCallback, TemplateTarget, WatchContext};
use image::{GrayImage, RgbImage, Rgba, RgbaImage};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct ScreenScript {
    color: Rgb,
    delay: Duration,
}

/// Экран одного цвета, который тест меняет на лету
#[derive(Default)]
pub(crate) struct ScriptedScreen {
    script: Mutex<ScreenScript>,
    failing: AtomicBool,
    panics: AtomicUsize,
    samples: AtomicUsize,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl ScriptedScreen {
    pub(crate) fn new(color: Rgb) -> Arc<Self> {
        let screen = Self::default();
        screen.script.lock().color = color;
        Arc::new(screen)
    }

    pub(crate) fn set_color(&self, color: Rgb) {
        self.script.lock().color = color;
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Следующие `count` захватов паникуют, имитируя сбой бэкенда
    pub(crate) fn panic_next(&self, count: usize) {
        self.panics.store(count, Ordering::SeqCst);
    }

    /// Задержка каждого захвата, имитирует медленный бэкенд
    pub(crate) fn set_delay(&self, delay: Duration) {
        self.script.lock().delay = delay;
    }

    pub(crate) fn samples(&self) -> usize {
        self.samples.load(Ordering::SeqCst)
    }

    pub(crate) fn live_handles(&self) -> usize {
        self.opened.load(Ordering::SeqCst) - self.closed.load(Ordering::SeqCst)
    }

    fn sample(&self) -> Result<Rgb> {
        self.samples.fetch_add(1, Ordering::SeqCst);
        let (color, delay) = {
            let script = self.script.lock();
            (script.color, script.delay)
        };
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        let panicking = self
            .panics
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if panicking {
            panic!("scripted capture panic");
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(crate::autofish_error!(capture, "scripted capture failure"));
        }
        Ok(color)
    }
}

impl ScreenSource for Arc<ScriptedScreen> {
    fn name(&self) -> &str {
        "scripted"
    }

    fn open(&self) -> Result<Box<dyn ScreenCapture>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedCapture {
            screen: Arc::clone(self),
        }))
    }
}

struct ScriptedCapture {
    screen: Arc<ScriptedScreen>,
}

impl ScreenCapture for ScriptedCapture {
    fn capture(&mut self, region: Option<Region>) -> Result<RgbImage> {
        let color = self.screen.sample()?;
        let region = region.unwrap_or(Region::new(0, 0, 64, 64));
        Ok(RgbImage::from_pixel(
            region.width,
            region.height,
            image::Rgb(color.channels()),
        ))
    }

    fn pixel(&mut self, _x: i32, _y: i32) -> Result<Rgb> {
        self.screen.sample()
    }
}

impl Drop for ScriptedCapture {
    fn drop(&mut self) {
        self.screen.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Матчер, возвращающий заранее заданное совпадение (в координатах кадра)
#[derive(Default)]
pub(crate) struct ScriptedMatcher {
    current: Mutex<Option<TemplateMatch>>,
    last_mask: Mutex<Option<GrayImage>>,
}

impl ScriptedMatcher {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn set(&self, found: Option<TemplateMatch>) {
        *self.current.lock() = found;
    }

    /// Маска, переданная в последний поиск
    pub(crate) fn last_mask(&self) -> Option<GrayImage> {
        self.last_mask.lock().clone()
    }
}

impl TemplateMatcher for ScriptedMatcher {
    fn best_match(&self, _screen: &RgbImage, _template: &RgbImage, mask: Option<&GrayImage>) -> Option<TemplateMatch> {
        *self.last_mask.lock() = mask.cloned();
        *self.current.lock()
    }
}

/// Записывает все полученные события
#[derive(Clone, Default)]
pub(crate) struct Recorder {
    events: Arc<Mutex<Vec<WatchEvent>>>,
}

impl Recorder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn callback(&self) -> EventCallback {
        let events = Arc::clone(&self.events);
        Arc::new(move |event: &WatchEvent| -> anyhow::Result<()> {
            events.lock().push(event.clone());
            Ok(())
        })
    }

    pub(crate) fn count(&self) -> usize {
        self.events.lock().len()
    }

    pub(crate) fn events(&self) -> Vec<WatchEvent> {
        self.events.lock().clone()
    }
}

pub(crate) fn test_context(screen: Arc<ScriptedScreen>, matcher: Arc<ScriptedMatcher>) -> WatchContext {
    // Arc<ScriptedScreen> сам реализует ScreenSource, чтобы дескрипторы держали экран
    WatchContext::new(Arc::new(screen), matcher).expect("tests run inside a tokio runtime")
}

/// Положить в кэш контекста небольшой шаблон с маской и вернуть цель для него
pub(crate) fn register_template(context: &WatchContext, key: &str) -> TemplateTarget {
    let image = RgbaImage::from_fn(10, 10, |x, y| {
        if x < 2 || y < 2 {
            Rgba([255, 100, 0, 255])
        } else {
            Rgba([0, 0, 0, 0])
        }
    });
    let template = Template::from_rgba(key, &image, true).expect("valid test template");
    context.templates.insert(template);
    TemplateTarget::new(key)
}

/// Ждать выполнения условия, опрашивая его каждые 5 мс
pub(crate) async fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

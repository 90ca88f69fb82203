use crate::autofish_error;
use crate::error::{AutofishError, Result};
use crate::events::{colors_match, Rgb, TemplateMatch, WatchEvent, WatcherId};
use crate::services::matcher::{MaskShape, NccMatcher, Template, TransparencyInfo};
use crate::services::screen_source::ScreenSource;
use crate::watcher::{
    locate_masked, locate_template, TemplateTarget, WatchContext, WatchSpec, WatcherConfig, WatcherRegistry, WatcherStatus,
};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

/// Общие параметры для `watch_*`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatchOptions {
    /// `None`: интервал по умолчанию для вида наблюдателя
    pub interval: Option<Duration>,
    pub cooldown: Duration,
    pub trigger_once: bool,
    pub auto_start: bool,
    pub enabled: bool,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            interval: None,
            cooldown: Duration::ZERO,
            trigger_once: false,
            auto_start: true,
            enabled: true,
        }
    }
}

impl WatchOptions {
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn once(mut self) -> Self {
        self.trigger_once = true;
        self
    }

    pub fn manual_start(mut self) -> Self {
        self.auto_start = false;
        self
    }
}

/// Единая точка входа: захват экрана, шаблоны и наблюдатели
pub struct Vision {
    registry: WatcherRegistry,
}

impl Vision {
    /// Фасад на текущем tokio runtime с матчером по умолчанию
    pub fn new(screen: Arc<dyn ScreenSource>) -> Result<Self> {
        let context = WatchContext::new(screen, Arc::new(NccMatcher::new()))?;
        Ok(Self::with_context(context))
    }

    pub fn with_context(context: WatchContext) -> Self {
        Self {
            registry: WatcherRegistry::new(context),
        }
    }

    pub fn context(&self) -> &WatchContext {
        self.registry.context()
    }

    pub fn registry(&self) -> &WatcherRegistry {
        &self.registry
    }

    fn register<F>(&self, name: &str, spec: WatchSpec, options: WatchOptions, callback: F) -> Result<WatcherId>
    where
        F: Fn(&WatchEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let mut config = WatcherConfig::new(name, spec, callback)
            .cooldown(options.cooldown)
            .trigger_once(options.trigger_once)
            .enabled(options.enabled);
        if let Some(interval) = options.interval {
            config = config.interval(interval);
        }

        let id = self.registry.add(config)?;
        if options.auto_start {
            self.registry.start(name)?;
        }
        Ok(id)
    }

    pub fn watch_pixel_color<F>(
        &self,
        name: &str,
        x: i32,
        y: i32,
        target: Rgb,
        tolerance: u8,
        options: WatchOptions,
        callback: F,
    ) -> Result<WatcherId>
    where
        F: Fn(&WatchEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let spec = WatchSpec::PixelColor {
            x,
            y,
            target,
            tolerance,
        };
        self.register(name, spec, options, callback)
    }

    pub fn watch_pixel_change<F>(
        &self,
        name: &str,
        x: i32,
        y: i32,
        min_change: u32,
        options: WatchOptions,
        callback: F,
    ) -> Result<WatcherId>
    where
        F: Fn(&WatchEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register(name, WatchSpec::PixelChange { x, y, min_change }, options, callback)
    }

    pub fn watch_template_found<F>(
        &self,
        name: &str,
        target: TemplateTarget,
        options: WatchOptions,
        callback: F,
    ) -> Result<WatcherId>
    where
        F: Fn(&WatchEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register(name, WatchSpec::TemplateFound(target), options, callback)
    }

    pub fn watch_template_lost<F>(
        &self,
        name: &str,
        target: TemplateTarget,
        options: WatchOptions,
        callback: F,
    ) -> Result<WatcherId>
    where
        F: Fn(&WatchEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register(name, WatchSpec::TemplateLost(target), options, callback)
    }

    pub fn watch_template_moved<F>(
        &self,
        name: &str,
        target: TemplateTarget,
        min_distance: f64,
        options: WatchOptions,
        callback: F,
    ) -> Result<WatcherId>
    where
        F: Fn(&WatchEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let spec = WatchSpec::TemplateMoved {
            template: target,
            min_distance,
        };
        self.register(name, spec, options, callback)
    }

    pub fn start_watcher(&self, name: &str) -> Result<bool> {
        self.registry.start(name)
    }

    pub async fn stop_watcher(&self, name: &str) -> Result<bool> {
        self.registry.stop(name).await
    }

    pub fn request_stop(&self, name: &str) -> Result<bool> {
        self.registry.request_stop(name)
    }

    pub async fn remove_watcher(&self, name: &str) -> Result<()> {
        self.registry.remove(name).await
    }

    pub fn enable_watcher(&self, name: &str) -> Result<()> {
        self.registry.enable(name)
    }

    pub fn disable_watcher(&self, name: &str) -> Result<()> {
        self.registry.disable(name)
    }

    pub fn watcher_status(&self, name: &str) -> Option<WatcherStatus> {
        self.registry.status(name)
    }

    pub fn all_watcher_status(&self) -> BTreeMap<String, WatcherStatus> {
        self.registry.status_all()
    }

    pub fn add_global_callback<F>(&self, callback: F)
    where
        F: Fn(&WatchEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.registry.add_global_callback(callback);
    }

    pub fn start_all(&self) -> usize {
        self.registry.start_all()
    }

    pub async fn stop_all(&self) -> usize {
        self.registry.stop_all().await
    }

    /// Цвет пикселя; при ошибке захвата возвращается чёрный
    pub fn pixel_color(&self, x: i32, y: i32) -> Rgb {
        match sample_pixel(self.context(), x, y) {
            Ok(color) => color,
            Err(e) => {
                warn!("Не удалось получить цвет пикселя ({}, {}): {}", x, y, e);
                Rgb::BLACK
            }
        }
    }

    /// Лучшее совпадение шаблона не ниже порога цели
    pub fn find_on_screen(&self, target: &TemplateTarget) -> Result<Option<TemplateMatch>> {
        target.validate()?;
        search_template(self.context(), target)
    }

    /// Лучшее совпадение, где вместо альфа-канала шаблона учитывается маска заданной формы
    pub fn find_with_shape_mask(&self, target: &TemplateTarget, shape: MaskShape) -> Result<Option<TemplateMatch>> {
        target.validate()?;
        let context = self.context();
        let template = context.templates.load(&target.path)?;
        let mask = context.templates.shape_mask(&template, shape);
        let mut capture = context.screen.open()?;
        locate_masked(capture.as_mut(), context.matcher.as_ref(), &template.pixels, Some(&mask), target)
    }

    /// Все совпадения не ниже порога, лучшие первыми
    pub fn find_all_on_screen(&self, target: &TemplateTarget) -> Result<Vec<TemplateMatch>> {
        target.validate()?;
        let context = self.context();
        let template = context.templates.load(&target.path)?;
        let mut capture = context.screen.open()?;
        let frame = capture.capture(target.region)?;
        let (dx, dy) = target.region.map_or((0, 0), |region| (region.left, region.top));

        Ok(context
            .matcher
            .all_matches(
                &frame,
                &template.pixels,
                template.mask_for(target.use_mask),
                target.threshold,
            )
            .into_iter()
            .map(|found| found.translated(dx, dy))
            .collect())
    }

    /// Ждать, пока пиксель не примет нужный цвет
    pub async fn wait_for_pixel_color(
        &self,
        x: i32,
        y: i32,
        target: Rgb,
        tolerance: u8,
        timeout: Duration,
        interval: Duration,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if let Ok(color) = self.blocking(move |context| sample_pixel(context, x, y)).await {
                if colors_match(&color, &target, tolerance) {
                    return true;
                }
            }
            if Instant::now() + interval > deadline {
                return false;
            }
            sleep(interval).await;
        }
    }

    /// Ждать изменения пикселя относительно первого снятого цвета.
    /// Возвращает новый цвет или `None` по таймауту.
    pub async fn wait_for_pixel_change(
        &self,
        x: i32,
        y: i32,
        min_change: u32,
        timeout: Duration,
        interval: Duration,
    ) -> Option<Rgb> {
        let deadline = Instant::now() + timeout;
        let mut baseline: Option<Rgb> = None;
        loop {
            if let Ok(color) = self.blocking(move |context| sample_pixel(context, x, y)).await {
                match baseline {
                    None => baseline = Some(color),
                    Some(initial) if color.difference(&initial) >= min_change => return Some(color),
                    Some(_) => {}
                }
            }
            if Instant::now() + interval > deadline {
                return None;
            }
            sleep(interval).await;
        }
    }

    /// Ждать появления шаблона. Ошибки загрузки шаблона возвращаются сразу.
    pub async fn wait_for_template(
        &self,
        target: &TemplateTarget,
        timeout: Duration,
        interval: Duration,
    ) -> Result<Option<TemplateMatch>> {
        target.validate()?;
        self.context().templates.load(&target.path)?;

        let deadline = Instant::now() + timeout;
        loop {
            let pending = target.clone();
            match self.blocking(move |context| search_template(context, &pending)).await {
                Ok(Some(found)) => return Ok(Some(found)),
                Ok(None) => {}
                Err(e) => warn!("Поиск шаблона {} не удался: {}", target.path.display(), e),
            }
            if Instant::now() + interval > deadline {
                return Ok(None);
            }
            sleep(interval).await;
        }
    }

    pub fn transparency_info(&self, path: &Path) -> Result<TransparencyInfo> {
        Ok(self.context().templates.load(path)?.transparency_info())
    }

    /// Сохранить маску прозрачности шаблона как изображение в оттенках серого
    pub fn save_template_mask(&self, path: &Path, output: &Path) -> Result<()> {
        let template = self.context().templates.load(path)?;
        let mask = template
            .mask
            .as_ref()
            .ok_or_else(|| AutofishError::template(path, "у шаблона нет альфа-канала, маски нет"))?;
        mask.save(output)?;
        info!("Маска шаблона {} сохранена в {}", path.display(), output.display());
        Ok(())
    }

    /// Зарегистрировать шаблон, собранный в памяти
    pub fn register_template(&self, template: Template) -> Arc<Template> {
        self.context().templates.insert(template)
    }

    pub fn clear_template_cache(&self) {
        self.context().templates.clear();
    }

    /// Остановить все наблюдатели и очистить кэш шаблонов
    pub async fn shutdown(&self) {
        let stopped = self.registry.stop_all().await;
        self.clear_template_cache();
        info!("Vision остановлен (остановлено наблюдателей: {})", stopped);
    }

    /// Выполнить блокирующую проверку экрана на пуле блокирующих потоков
    async fn blocking<T, F>(&self, check: F) -> Result<T>
    where
        F: FnOnce(&WatchContext) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let context = self.context().clone();
        tokio::task::spawn_blocking(move || check(&context))
            .await
            .map_err(|e| autofish_error!(internal, "Проверка экрана прервана: {}", e))?
    }
}

fn sample_pixel(context: &WatchContext, x: i32, y: i32) -> Result<Rgb> {
    context.screen.open()?.pixel(x, y)
}

fn search_template(context: &WatchContext, target: &TemplateTarget) -> Result<Option<TemplateMatch>> {
    let template = context.templates.load(&target.path)?;
    let mut capture = context.screen.open()?;
    locate_template(capture.as_mut(), context.matcher.as_ref(), &template, target)
}

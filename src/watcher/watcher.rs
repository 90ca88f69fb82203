use super::config::{EventCallback, TemplateTarget, WatchSpec, WatcherConfig};
use super::context::WatchContext;
use super::detector::{Detector, Observation};
use super::status::WatcherStatus;
use crate::autofish_error;
use crate::{debug_if_enabled, trace_if_enabled};
use crate::error::Result;
use crate::events::{TemplateMatch, WatchEvent, WatchKind, WatcherId};
use crate::services::matcher::{Template, TemplateMatcher};
use crate::services::screen_source::ScreenCapture;
use image::{GrayImage, RgbImage};
use parking_lot::{Mutex, RwLock};
use smallvec::SmallVec;
use std::any::Any;
use std::cell::Cell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Глобальные колбэки реестра в порядке добавления
pub(crate) type GlobalCallbacks = Arc<RwLock<SmallVec<[EventCallback; 4]>>>;

static NEXT_WATCHER_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Наблюдатель, чей тик сейчас выполняется в этом потоке
    static POLLING_WATCHER: Cell<Option<WatcherId>> = const { Cell::new(None) };
}

/// Сбрасывает POLLING_WATCHER даже при панике внутри тика
struct PollingGuard;

impl PollingGuard {
    fn enter(id: WatcherId) -> Self {
        POLLING_WATCHER.with(|current| current.set(Some(id)));
        Self
    }
}

impl Drop for PollingGuard {
    fn drop(&mut self) {
        POLLING_WATCHER.with(|current| current.set(None));
    }
}

/// Рассылка события: сначала колбэк наблюдателя, затем глобальные
#[derive(Clone)]
pub(crate) struct Dispatcher {
    callback: EventCallback,
    globals: GlobalCallbacks,
}

impl Dispatcher {
    pub(crate) fn new(callback: EventCallback, globals: GlobalCallbacks) -> Self {
        Self { callback, globals }
    }

    fn dispatch(&self, event: &WatchEvent) {
        invoke(&self.callback, event, "колбэке наблюдателя");

        // Снимок под коротким чтением: колбэки могут добавлять новые глобальные колбэки
        let globals: SmallVec<[EventCallback; 4]> = self.globals.read().clone();
        for callback in &globals {
            invoke(callback, event, "глобальном колбэке");
        }
    }
}

fn invoke(callback: &EventCallback, event: &WatchEvent, role: &str) {
    match catch_unwind(AssertUnwindSafe(|| callback(event))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(
            watcher = %event.watcher,
            kind = %event.kind(),
            "Ошибка в {}: {:#}",
            role,
            e
        ),
        Err(payload) => error!(
            watcher = %event.watcher,
            kind = %event.kind(),
            "Паника в {}: {}",
            role,
            panic_message(payload.as_ref())
        ),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "<неизвестная паника>"
    }
}

/// Найти шаблон в области цели; совпадение возвращается в координатах экрана
pub(crate) fn locate_template(
    capture: &mut dyn ScreenCapture,
    matcher: &dyn TemplateMatcher,
    template: &Template,
    target: &TemplateTarget,
) -> Result<Option<TemplateMatch>> {
    locate_masked(capture, matcher, &template.pixels, template.mask_for(target.use_mask), target)
}

/// Поиск с произвольной маской: кадр области, лучшее совпадение, порог, экранные координаты
pub(crate) fn locate_masked(
    capture: &mut dyn ScreenCapture,
    matcher: &dyn TemplateMatcher,
    pixels: &RgbImage,
    mask: Option<&GrayImage>,
    target: &TemplateTarget,
) -> Result<Option<TemplateMatch>> {
    let frame = capture.capture(target.region)?;
    let found = matcher.best_match(&frame, pixels, mask);
    let (dx, dy) = target.region.map_or((0, 0), |region| (region.left, region.top));

    Ok(found
        .filter(|found| found.confidence >= target.threshold)
        .map(|found| found.translated(dx, dy)))
}

#[derive(Debug, Default, Clone, Copy)]
struct TriggerStats {
    count: u64,
    last_at: Option<SystemTime>,
}

/// Состояние, которым владеет только контекст опроса
struct PollCore {
    detector: Detector,
    template: Option<Arc<Template>>,
    capture: Option<Box<dyn ScreenCapture>>,
}

impl PollCore {
    fn new(config: &WatcherConfig, context: &WatchContext) -> Result<Self> {
        let template = match config.spec().template() {
            Some(target) => Some(context.templates.load(&target.path)?),
            None => None,
        };

        Ok(Self {
            detector: Detector::new(config.spec(), config.cooldown_period()),
            template,
            capture: None,
        })
    }

    fn sample(&mut self, config: &WatcherConfig, context: &WatchContext) -> Result<Observation> {
        if self.capture.is_none() {
            self.capture = Some(context.screen.open()?);
        }
        let capture = self
            .capture
            .as_mut()
            .ok_or_else(|| autofish_error!(internal, "Дескриптор захвата не открыт"))?;

        let result = match config.spec() {
            WatchSpec::PixelColor { x, y, .. } | WatchSpec::PixelChange { x, y, .. } => {
                capture.pixel(*x, *y).map(Observation::Color)
            }
            spec => {
                let target = spec
                    .template()
                    .ok_or_else(|| autofish_error!(internal, "Шаблонный наблюдатель без шаблона"))?;
                let template = self
                    .template
                    .as_ref()
                    .ok_or_else(|| autofish_error!(internal, "Шаблон {} не загружен", target.path.display()))?;
                locate_template(capture.as_mut(), context.matcher.as_ref(), template, target)
                    .map(Observation::Template)
            }
        };

        // После ошибки открываем дескриптор заново на следующем тике
        if result.is_err() {
            self.capture = None;
        }
        result
    }

    fn release_capture(&mut self) {
        self.capture = None;
    }
}

#[derive(Debug, PartialEq, Eq)]
enum TickOutcome {
    Continue,
    Finished,
}

/// Сигнал остановки одного запуска цикла опроса
struct RunSignal {
    stopped: AtomicBool,
    wake: Notify,
    /// Сколько частей запуска ещё живо: сам цикл и его текущий тик
    active: AtomicUsize,
}

impl RunSignal {
    fn new() -> Self {
        Self {
            stopped: AtomicBool::new(false),
            wake: Notify::new(),
            active: AtomicUsize::new(0),
        }
    }

    /// Цикл или его блокирующий тик ещё выполняется
    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire) > 0
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        // notify_one сохраняет разрешение, если цикл ещё не ждёт
        self.wake.notify_one();
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

/// Держит запуск активным, пока жив его владелец. Снимается и при abort задачи.
struct ActiveGuard(Arc<RunSignal>);

impl ActiveGuard {
    fn enter(signal: &Arc<RunSignal>) -> Self {
        signal.active.fetch_add(1, Ordering::AcqRel);
        Self(Arc::clone(signal))
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::AcqRel);
    }
}

#[derive(Default)]
struct Lifecycle {
    generation: u64,
    task: Option<JoinHandle<()>>,
    /// Сигнал последнего запуска; остаётся после stop, пока не начат новый
    signal: Option<Arc<RunSignal>>,
}

impl Lifecycle {
    fn signal_stop(&self) {
        if let Some(signal) = self.signal.as_ref() {
            signal.stop();
        }
    }
}

struct WatcherInner {
    id: WatcherId,
    config: WatcherConfig,
    context: WatchContext,
    dispatcher: Dispatcher,
    running: AtomicBool,
    enabled: AtomicBool,
    template_present: AtomicBool,
    last_match: Mutex<Option<TemplateMatch>>,
    stats: Mutex<TriggerStats>,
    /// Ядро опроса между запусками (базовый цвет, присутствие шаблона)
    parked: Mutex<Option<PollCore>>,
    lifecycle: Mutex<Lifecycle>,
}

impl WatcherInner {
    fn name(&self) -> &str {
        self.config.name()
    }

    fn tick(&self, core: &mut PollCore) -> TickOutcome {
        let _guard = PollingGuard::enter(self.id);

        let sampled = catch_unwind(AssertUnwindSafe(|| core.sample(&self.config, &self.context)));
        let observation = match sampled {
            Ok(Ok(observation)) => observation,
            Ok(Err(e)) => {
                warn!("Наблюдатель '{}': опрос не удался, тик пропущен: {}", self.name(), e);
                return TickOutcome::Continue;
            }
            Err(payload) => {
                // Дескриптор после паники мог остаться в любом состоянии
                core.release_capture();
                warn!(
                    "Наблюдатель '{}': паника при опросе, тик пропущен: {}",
                    self.name(),
                    panic_message(payload.as_ref())
                );
                return TickOutcome::Continue;
            }
        };

        trace_if_enabled!("Наблюдатель '{}': {:?}", self.name(), observation);
        let detail = core.detector.observe(observation, Instant::now());
        if let Some(present) = core.detector.template_present() {
            self.template_present.store(present, Ordering::Release);
            *self.last_match.lock() = core.detector.last_match();
        }

        let Some(detail) = detail else {
            return TickOutcome::Continue;
        };

        let (sequence, timestamp) = self.record_trigger();
        let event = WatchEvent {
            watcher: self.name().to_string(),
            watcher_id: self.id,
            target: self.config.spec().target(),
            sequence,
            timestamp,
            detail,
        };

        debug_if_enabled!("Сработал наблюдатель: {}", event);
        self.dispatcher.dispatch(&event);

        if self.config.is_trigger_once() {
            info!("Наблюдатель '{}' однократный - останавливается после срабатывания", self.name());
            TickOutcome::Finished
        } else {
            TickOutcome::Continue
        }
    }

    fn record_trigger(&self) -> (u64, SystemTime) {
        let mut stats = self.stats.lock();
        let now = SystemTime::now();
        stats.count += 1;
        stats.last_at = Some(now);
        (stats.count, now)
    }

    /// Завершение цикла: ядро паркуется, флаг running снимается, если запуск всё ещё текущий
    fn finish(&self, generation: u64, core: Option<PollCore>) {
        let lifecycle = self.lifecycle.lock();
        if lifecycle.generation != generation {
            return;
        }
        if let Some(core) = core {
            *self.parked.lock() = Some(core);
        }
        self.running.store(false, Ordering::Release);
    }
}

async fn poll_loop(
    inner: Arc<WatcherInner>,
    generation: u64,
    signal: Arc<RunSignal>,
    _active: ActiveGuard,
    mut core: PollCore,
) {
    let interval = inner.config.poll_interval();
    info!(
        "Наблюдатель '{}' запущен ({}, интервал {:?})",
        inner.name(),
        inner.config.kind(),
        interval
    );

    loop {
        if signal.is_stopped() {
            break;
        }

        if inner.enabled.load(Ordering::Acquire) {
            let job = Arc::clone(&inner);
            let ticking = ActiveGuard::enter(&signal);
            let tick = tokio::task::spawn_blocking(move || {
                let _ticking = ticking;
                let outcome = job.tick(&mut core);
                (core, outcome)
            })
            .await;

            match tick {
                Ok((returned, outcome)) => {
                    core = returned;
                    if outcome == TickOutcome::Finished {
                        break;
                    }
                }
                Err(e) => {
                    error!("Цикл опроса наблюдателя '{}' аварийно завершён: {}", inner.name(), e);
                    inner.finish(generation, None);
                    return;
                }
            }
        } else {
            debug_if_enabled!("Наблюдатель '{}' выключен - опрос пропущен", inner.name());
        }

        if signal.is_stopped() {
            break;
        }

        tokio::select! {
            _ = sleep(interval) => {}
            _ = signal.wake.notified() => {}
        }
    }

    core.release_capture();
    inner.finish(generation, Some(core));

    let count = inner.stats.lock().count;
    info!("Наблюдатель '{}' остановлен (срабатываний: {})", inner.name(), count);
}

/// Независимый наблюдатель за пикселем или шаблоном со своим циклом опроса
pub struct Watcher {
    inner: Arc<WatcherInner>,
}

impl Watcher {
    /// Создать остановленный наблюдатель. Шаблон загружается сразу, для
    /// ColorChange снимается начальный базовый цвет.
    pub(crate) fn new(config: WatcherConfig, context: WatchContext, globals: GlobalCallbacks) -> Result<Self> {
        config.validate()?;

        let id = WatcherId(NEXT_WATCHER_ID.fetch_add(1, Ordering::Relaxed));
        let mut core = PollCore::new(&config, &context)?;

        if let WatchSpec::PixelChange { x, y, .. } = config.spec() {
            let initial = context.screen.open().and_then(|mut capture| capture.pixel(*x, *y));
            match initial {
                Ok(color) => {
                    debug!("Наблюдатель '{}': начальный цвет {}", config.name(), color);
                    core.detector.seed_baseline(color);
                }
                Err(e) => debug!(
                    "Наблюдатель '{}': начальный цвет не получен ({}), базой станет первый опрос",
                    config.name(),
                    e
                ),
            }
        }

        let dispatcher = Dispatcher::new(Arc::clone(config.callback()), globals);
        let enabled = config.starts_enabled();

        Ok(Self {
            inner: Arc::new(WatcherInner {
                id,
                config,
                context,
                dispatcher,
                running: AtomicBool::new(false),
                enabled: AtomicBool::new(enabled),
                template_present: AtomicBool::new(false),
                last_match: Mutex::new(None),
                stats: Mutex::new(TriggerStats::default()),
                parked: Mutex::new(Some(core)),
                lifecycle: Mutex::new(Lifecycle::default()),
            }),
        })
    }

    pub fn id(&self) -> WatcherId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn kind(&self) -> WatchKind {
        self.inner.config.kind()
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.inner.config
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Acquire)
    }

    /// Включить или выключить опрос без остановки цикла
    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::Release);
    }

    pub fn trigger_count(&self) -> u64 {
        self.inner.stats.lock().count
    }

    pub fn status(&self) -> WatcherStatus {
        let stats = *self.inner.stats.lock();
        let kind = self.kind();

        WatcherStatus {
            name: self.name().to_string(),
            id: self.id(),
            kind,
            target: self.inner.config.spec().target(),
            running: self.is_running(),
            enabled: self.is_enabled(),
            trigger_count: stats.count,
            last_trigger_time: stats.last_at,
            template_present: kind
                .is_template()
                .then(|| self.inner.template_present.load(Ordering::Acquire)),
            last_match: *self.inner.last_match.lock(),
            interval: self.inner.config.poll_interval(),
        }
    }

    /// Запустить цикл опроса. `Ok(false)`, если наблюдатель уже запущен или
    /// его предыдущий цикл ещё не вышел из тика.
    pub fn start(&self) -> Result<bool> {
        let mut lifecycle = self.inner.lifecycle.lock();
        if self.is_running() {
            return Ok(false);
        }

        // Два цикла одного наблюдателя не должны опрашивать экран одновременно
        if let Some(previous) = lifecycle.signal.as_ref() {
            previous.stop();
            if previous.is_active() {
                warn!(
                    "Наблюдатель '{}': предыдущий цикл опроса ещё не завершился - запуск отклонён",
                    self.name()
                );
                return Ok(false);
            }
        }

        let parked = self.inner.parked.lock().take();
        let core = match parked {
            Some(core) => core,
            None => PollCore::new(&self.inner.config, &self.inner.context)?,
        };

        lifecycle.generation += 1;
        let generation = lifecycle.generation;
        let signal = Arc::new(RunSignal::new());
        let active = ActiveGuard::enter(&signal);

        self.inner.running.store(true, Ordering::Release);
        let span = info_span!("watcher", name = %self.name(), id = %self.id());
        let task = self.inner.context.runtime().spawn(
            poll_loop(Arc::clone(&self.inner), generation, Arc::clone(&signal), active, core).instrument(span),
        );

        lifecycle.task = Some(task);
        lifecycle.signal = Some(signal);
        Ok(true)
    }

    /// Поднять сигнал остановки, не дожидаясь завершения цикла.
    /// Безопасно вызывать из колбэков.
    pub fn request_stop(&self) -> bool {
        let lifecycle = self.inner.lifecycle.lock();
        let was_running = self.inner.running.swap(false, Ordering::AcqRel);
        lifecycle.signal_stop();
        was_running
    }

    /// Остановить цикл и дождаться его завершения (не дольше stop_timeout).
    ///
    /// Возвращает `false`, если наблюдатель уже был остановлен. Из собственного
    /// контекста опроса только поднимает сигнал.
    pub async fn stop(&self) -> bool {
        let (was_running, task) = {
            let mut lifecycle = self.inner.lifecycle.lock();
            let was_running = self.inner.running.swap(false, Ordering::AcqRel);
            lifecycle.signal_stop();
            (was_running, lifecycle.task.take())
        };

        let Some(mut task) = task else {
            return was_running;
        };

        if self.in_own_polling_context() {
            debug!("Наблюдатель '{}' останавливает сам себя - ожидание пропущено", self.name());
            return was_running;
        }

        let stop_timeout = self.inner.context.stop_timeout();
        match timeout(stop_timeout, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.is_panic() => {
                error!("Цикл опроса наблюдателя '{}' завершился паникой", self.name());
            }
            Ok(Err(_)) => {}
            Err(_) => {
                warn!(
                    "Наблюдатель '{}' не остановился за {:?} - задача прервана",
                    self.name(),
                    stop_timeout
                );
                task.abort();
            }
        }

        was_running
    }

    fn in_own_polling_context(&self) -> bool {
        POLLING_WATCHER.with(|current| current.get() == Some(self.id()))
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        // Только сигнал: ожидать в Drop нельзя
        let lifecycle = self.inner.lifecycle.lock();
        self.inner.running.store(false, Ordering::Release);
        lifecycle.signal_stop();
    }
}

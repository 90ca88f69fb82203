use crate::error::{AutofishError, Result};
use crate::services::matcher::{TemplateMatcher, TemplateStore};
use crate::services::screen_source::ScreenSource;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(1);

/// Общие зависимости всех наблюдателей: источник кадров, кэш шаблонов,
/// алгоритм сопоставления и runtime, на котором запускаются циклы опроса.
#[derive(Clone)]
pub struct WatchContext {
    pub screen: Arc<dyn ScreenSource>,
    pub templates: Arc<TemplateStore>,
    pub matcher: Arc<dyn TemplateMatcher>,
    runtime: Handle,
    stop_timeout: Duration,
}

impl WatchContext {
    /// Создать контекст на текущем tokio runtime
    pub fn new(screen: Arc<dyn ScreenSource>, matcher: Arc<dyn TemplateMatcher>) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| AutofishError::NoRuntime(e.to_string()))?;
        Ok(Self::with_runtime(screen, matcher, runtime))
    }

    pub fn with_runtime(
        screen: Arc<dyn ScreenSource>,
        matcher: Arc<dyn TemplateMatcher>,
        runtime: Handle,
    ) -> Self {
        Self {
            screen,
            templates: Arc::new(TemplateStore::new()),
            matcher,
            runtime,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }

    pub fn with_templates(mut self, templates: Arc<TemplateStore>) -> Self {
        self.templates = templates;
        self
    }

    pub fn with_stop_timeout(mut self, stop_timeout: Duration) -> Self {
        self.stop_timeout = stop_timeout;
        self
    }

    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }

    pub fn stop_timeout(&self) -> Duration {
        self.stop_timeout
    }
}

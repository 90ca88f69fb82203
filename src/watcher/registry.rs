use super::config::WatcherConfig;
use super::context::WatchContext;
use super::status::WatcherStatus;
use super::watcher::{GlobalCallbacks, Watcher};
use crate::error::{AutofishError, Result};
use crate::events::{WatchEvent, WatcherId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Именованный набор наблюдателей
pub struct WatcherRegistry {
    context: WatchContext,
    watchers: DashMap<String, Arc<Watcher>>,
    globals: GlobalCallbacks,
}

impl WatcherRegistry {
    pub fn new(context: WatchContext) -> Self {
        Self {
            context,
            watchers: DashMap::new(),
            globals: Arc::new(RwLock::new(SmallVec::new())),
        }
    }

    pub fn context(&self) -> &WatchContext {
        &self.context
    }

    /// Зарегистрировать остановленный наблюдатель
    pub fn add(&self, config: WatcherConfig) -> Result<WatcherId> {
        let name = config.name().to_string();
        if self.watchers.contains_key(&name) {
            warn!("Наблюдатель '{}' уже существует - добавление отклонено", name);
            return Err(AutofishError::DuplicateWatcher(name));
        }

        let kind = config.kind();
        let watcher = Watcher::new(config, self.context.clone(), Arc::clone(&self.globals))?;
        let id = watcher.id();

        // Повторная проверка: между contains_key и вставкой мог успеть другой поток
        match self.watchers.entry(name.clone()) {
            Entry::Occupied(_) => {
                warn!("Наблюдатель '{}' уже существует - добавление отклонено", name);
                Err(AutofishError::DuplicateWatcher(name))
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(watcher));
                info!("Добавлен наблюдатель '{}' {} ({})", name, id, kind);
                Ok(id)
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<Watcher>> {
        self.watchers.get(name).map(|entry| Arc::clone(entry.value()))
    }

    fn lookup(&self, name: &str) -> Result<Arc<Watcher>> {
        match self.get(name) {
            Some(watcher) => Ok(watcher),
            None => {
                warn!("Наблюдатель '{}' не найден", name);
                AutofishError::unknown_watcher(name)
            }
        }
    }

    /// Все наблюдатели без удержания шардов DashMap
    fn snapshot(&self) -> Vec<Arc<Watcher>> {
        self.watchers.iter().map(|entry| Arc::clone(entry.value())).collect()
    }

    pub fn start(&self, name: &str) -> Result<bool> {
        let watcher = self.lookup(name)?;
        let started = watcher.start()?;
        if !started {
            warn!("Наблюдатель '{}' уже запущен", name);
        }
        Ok(started)
    }

    pub async fn stop(&self, name: &str) -> Result<bool> {
        let watcher = self.lookup(name)?;
        let stopped = watcher.stop().await;
        if !stopped {
            warn!("Наблюдатель '{}' уже остановлен", name);
        }
        Ok(stopped)
    }

    /// Неблокирующий сигнал остановки; подходит для вызова из колбэков
    pub fn request_stop(&self, name: &str) -> Result<bool> {
        let watcher = self.lookup(name)?;
        Ok(watcher.request_stop())
    }

    /// Запустить все остановленные наблюдатели, вернуть число запущенных
    pub fn start_all(&self) -> usize {
        let mut started = 0;
        for watcher in self.snapshot() {
            match watcher.start() {
                Ok(true) => started += 1,
                Ok(false) => {}
                Err(e) => error!("Не удалось запустить наблюдатель '{}': {}", watcher.name(), e),
            }
        }
        info!("Запущено наблюдателей: {}", started);
        started
    }

    /// Остановить все наблюдатели: сначала сигнал всем, затем ожидание каждого
    pub async fn stop_all(&self) -> usize {
        let watchers = self.snapshot();
        let signalled = watchers.iter().filter(|watcher| watcher.request_stop()).count();

        for watcher in &watchers {
            watcher.stop().await;
        }

        if signalled > 0 {
            info!("Остановлено наблюдателей: {}", signalled);
        }
        signalled
    }

    /// Остановить и удалить наблюдатель
    pub async fn remove(&self, name: &str) -> Result<()> {
        let Some((_, watcher)) = self.watchers.remove(name) else {
            warn!("Наблюдатель '{}' не найден", name);
            return AutofishError::unknown_watcher(name);
        };

        watcher.stop().await;
        info!("Наблюдатель '{}' удалён", name);
        Ok(())
    }

    pub fn enable(&self, name: &str) -> Result<()> {
        self.lookup(name)?.set_enabled(true);
        info!("Наблюдатель '{}' включён", name);
        Ok(())
    }

    pub fn disable(&self, name: &str) -> Result<()> {
        self.lookup(name)?.set_enabled(false);
        info!("Наблюдатель '{}' выключен", name);
        Ok(())
    }

    pub fn status(&self, name: &str) -> Option<WatcherStatus> {
        self.get(name).map(|watcher| watcher.status())
    }

    pub fn status_all(&self) -> BTreeMap<String, WatcherStatus> {
        self.snapshot()
            .into_iter()
            .map(|watcher| (watcher.name().to_string(), watcher.status()))
            .collect()
    }

    /// Колбэк, который получает события всех наблюдателей после их собственных колбэков
    pub fn add_global_callback<F>(&self, callback: F)
    where
        F: Fn(&WatchEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.globals.write().push(Arc::new(callback));
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.watchers.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.watchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watchers.is_empty()
    }
}

impl Drop for WatcherRegistry {
    fn drop(&mut self) {
        // Ждать здесь нельзя, поэтому только сигналим; циклы выйдут сами
        for entry in self.watchers.iter() {
            entry.value().request_stop();
        }
    }
}

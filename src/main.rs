use anyhow::Result;
use autofish::config::{Config, LoggingConfig};
use autofish::services::{create_screen_source, NccMatcher, Reactor, VirtualDevice};
use autofish::utils::check_permissions;
use autofish::{Vision, WatchContext, WatchEvent};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "autofish")]
#[command(about = "Наблюдатели за пикселями и шаблонами экрана с реакциями через виртуальный ввод")]
struct Args {
    /// Путь к файлу конфигурации
    #[arg(short, long, default_value = "autofish.toml")]
    config: String,

    /// Режим сухого запуска (синтетический экран, без реального ввода)
    #[arg(long)]
    dry_run: bool,

    /// Уровень логирования (перекрывает logging.level из конфигурации)
    #[arg(long)]
    log_level: Option<String>,

    /// Период вывода состояния наблюдателей, секунды (0 - не выводить)
    #[arg(long, default_value_t = 30)]
    status_interval: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(&args.config)?;
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
        config.validate()?;
    }

    init_tracing(&config.logging)?;

    info!("Запуск autofish v{}", env!("CARGO_PKG_VERSION"));
    info!("Конфигурация загружена из: {}", args.config);

    if args.dry_run {
        warn!("Режим сухого запуска - экран синтетический, ввод только в лог");
    }

    check_permissions(args.dry_run)?;

    // Компоненты: экран, контекст наблюдателей, виртуальное устройство
    let screen = create_screen_source(&config.capture, args.dry_run)?;
    info!("Источник экрана: {}", screen.name());

    let context = WatchContext::new(screen, Arc::new(NccMatcher::new()))?
        .with_stop_timeout(config.capture.stop_timeout());
    let vision = Vision::with_context(context);

    let device = Arc::new(VirtualDevice::new(
        &config.input.device_name,
        (config.capture.screen_width, config.capture.screen_height),
        args.dry_run,
    )?);
    let reactor = Arc::new(Reactor::new(device.clone(), config.input.press_duration()));

    for entry in &config.watchers {
        let callback = reactor.callback(entry.reaction.clone());
        let watcher_config = entry.to_watcher_config(&config.matching, callback)?;
        vision.registry().add(watcher_config)?;
    }

    vision.add_global_callback(|event: &WatchEvent| -> anyhow::Result<()> {
        info!(
            watcher = %event.watcher,
            sequence = event.sequence,
            detail = ?event.detail,
            "Событие наблюдателя"
        );
        Ok(())
    });

    if vision.registry().is_empty() {
        warn!("В конфигурации нет наблюдателей ([[watchers]]) - ждём только Ctrl+C");
    }

    vision.start_all();

    wait_for_shutdown(&vision, args.status_interval).await;

    info!("Завершение работы...");

    let shutdown_timeout = Duration::from_secs(5);
    match tokio::time::timeout(shutdown_timeout, vision.shutdown()).await {
        Ok(()) => info!("Все наблюдатели завершили работу корректно"),
        Err(_) => warn!("Таймаут при остановке наблюдателей"),
    }

    // Гарантируем отсутствие залипших клавиш
    if let Err(e) = device.release_all_keys() {
        warn!("Не удалось выполнить release_all_keys: {}", e);
    }

    info!("autofish завершил работу");
    Ok(())
}

/// Ждать Ctrl+C, периодически выводя состояние наблюдателей
async fn wait_for_shutdown(vision: &Vision, status_interval: u64) {
    let period = Duration::from_secs(status_interval.max(1));
    let mut ticker = tokio::time::interval(period);
    ticker.tick().await;

    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                match result {
                    Ok(()) => info!("Получен сигнал завершения (Ctrl+C)"),
                    Err(err) => error!("Ошибка при ожидании сигнала завершения: {}", err),
                }
                return;
            }
            _ = ticker.tick(), if status_interval > 0 => {
                for status in vision.all_watcher_status().values() {
                    info!("{}", status);
                }
            }
        }
    }
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let mut directives = logging.level.clone();
    if let Some(extra) = &logging.filter {
        directives = format!("{},{}", directives, extra);
    }

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&directives))?;
    let registry = tracing_subscriber::registry().with(filter);

    match logging.format.as_str() {
        "json" => registry.with(fmt::layer().json()).try_init()?,
        "pretty" => registry.with(fmt::layer().pretty()).try_init()?,
        _ => registry.with(fmt::layer().compact()).try_init()?,
    }

    Ok(())
}

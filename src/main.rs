use anyhow::Result;
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};

use fullscreen_monitor::config::{Config, LoggingConfig};
use fullscreen_monitor::debug_if_enabled;
use fullscreen_monitor::platform::{self, PlatformBackend};
use fullscreen_monitor::services::{
    spawn_notification_pump, LogNotificationSink, WindowMonitorService, WindowSnapshotCache,
};

#[derive(Parser, Debug)]
#[command(name = "fullscreen-monitor")]
#[command(about = "Сворачивает окна на мониторе, пока на нём открыто полноэкранное приложение")]
struct Args {
    /// Путь к файлу конфигурации
    #[arg(short, long, default_value = "fsm.toml")]
    config: String,

    /// Эмулированный рабочий стол вместо Win32 API
    #[arg(long)]
    dry_run: bool,

    /// Уровень логирования (перекрывает значение из конфигурации)
    #[arg(long)]
    log_level: Option<String>,

    /// Вывести процессы, у которых есть видимые окна, и выйти
    #[arg(long)]
    list_processes: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Загрузка конфигурации
    let config = Config::load(&args.config)?;

    // Инициализация системы логирования
    init_tracing(&config.logging, args.log_level.as_deref())?;

    info!("Запуск fullscreen-monitor v{}", env!("CARGO_PKG_VERSION"));
    info!("Конфигурация загружена из: {}", args.config);

    if args.dry_run {
        warn!("Режим сухого запуска - окна эмулируются");
    }

    let PlatformBackend { platform, scenario } = platform::create_platform(args.dry_run)?;

    if args.list_processes {
        let cache = WindowSnapshotCache::new(platform);
        for name in cache.process_names_with_windows() {
            println!("{}", name);
        }
        if let Some(task) = scenario {
            task.abort();
        }
        return Ok(());
    }

    let service = WindowMonitorService::new(platform, config.monitor.clone());
    let notifications = spawn_notification_pump(service.subscribe(), Box::new(LogNotificationSink));

    service.start_monitoring().await;
    let stats = service.get_stats();
    info!(
        "Сервис запущен: целевых процессов {}, интервал {} мс",
        stats.target_process_count, stats.poll_interval_ms
    );

    // Ожидание сигнала завершения
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Получен сигнал завершения (Ctrl+C)");
        }
        Err(err) => {
            error!("Ошибка при ожидании сигнала завершения: {}", err);
        }
    }

    info!("Завершение работы...");

    let restored = service.shutdown().await;
    info!("Восстановлено окон при выходе: {}", restored);

    if let Some(task) = scenario {
        task.abort();
        debug_if_enabled!("Сценарий dry-run остановлен");
    }

    // Канал уведомлений закрывается вместе с сервисом
    drop(service);

    let shutdown_timeout = tokio::time::Duration::from_secs(5);
    match tokio::time::timeout(shutdown_timeout, notifications).await {
        Ok(_) => info!("Все уведомления доставлены"),
        Err(_) => warn!("Таймаут при доставке уведомлений"),
    }

    info!("fullscreen-monitor завершил работу");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig, level_override: Option<&str>) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let directives = match level_override {
        Some(level) => level.to_string(),
        None => format!("{},{}", logging.level, logging.filter),
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&directives))?;

    let registry = tracing_subscriber::registry().with(filter);
    match logging.format.as_str() {
        "full" => registry.with(fmt::layer()).init(),
        _ => registry.with(fmt::layer().compact()).init(),
    }

    Ok(())
}

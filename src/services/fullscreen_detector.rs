use crate::config::MIN_POLL_INTERVAL_MS;
use crate::error::Result;
use crate::events::{DetectorEvent, FullScreenState, MonitorHandle, WindowHandle};
use crate::fsm_error;
use crate::platform::NativePlatform;
use crate::services::window_cache::WindowSnapshotCache;
use crate::{debug_if_enabled, trace_if_enabled};
use parking_lot::{Mutex, RwLock};
use smallvec::SmallVec;
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

/// Получатель событий детектора.
///
/// Вызывается синхронно из цикла опроса: следующий тик не начнётся, пока
/// обработчик не вернёт управление.
pub trait DetectorEventHandler: Send + Sync {
    fn handle_detector_event(&self, event: DetectorEvent);
}

#[derive(Debug, Default)]
struct DetectorState {
    was_full_screen: bool,
    current_full_screen_window: Option<WindowHandle>,
    current_monitor: Option<MonitorHandle>,
    last_foreground_window: Option<WindowHandle>,
}

struct PollingTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Детектор полноэкранного режима: два состояния, переходы по тикам таймера
pub struct FullScreenDetector {
    cache: Arc<WindowSnapshotCache>,
    platform: Arc<dyn NativePlatform>,
    target_processes: RwLock<Vec<String>>,
    state: Mutex<DetectorState>,
    interval: watch::Sender<Duration>,
    task: Mutex<Option<PollingTask>>,
}

impl FullScreenDetector {
    pub fn new(
        cache: Arc<WindowSnapshotCache>,
        platform: Arc<dyn NativePlatform>,
        target_processes: Vec<String>,
        interval: Duration,
    ) -> Self {
        let (interval_tx, _) = watch::channel(Self::sanitize_interval(interval));

        Self {
            cache,
            platform,
            target_processes: RwLock::new(target_processes),
            state: Mutex::new(DetectorState::default()),
            interval: interval_tx,
            task: Mutex::new(None),
        }
    }

    /// Запустить цикл опроса. Возвращает `false`, если он уже запущен.
    pub fn start(self: &Arc<Self>, handler: Arc<dyn DetectorEventHandler>) -> bool {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            warn!("Детектор уже запущен");
            return false;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let interval_rx = self.interval.subscribe();
        let handle = tokio::spawn(Self::run(
            Arc::downgrade(self),
            handler,
            interval_rx,
            shutdown_rx,
        ));

        *task = Some(PollingTask {
            shutdown: shutdown_tx,
            handle,
        });

        info!(
            "Детектор запущен: интервал {:?}, целевые процессы {:?}",
            *self.interval.borrow(),
            *self.target_processes.read()
        );
        true
    }

    /// Остановить цикл опроса; текущий тик успевает завершиться
    pub async fn stop(&self) {
        let task = self.task.lock().take();
        let Some(task) = task else {
            return;
        };

        let _ = task.shutdown.send(true);
        if let Err(e) = task.handle.await {
            error!("Цикл опроса завершился с ошибкой: {}", e);
        }
        info!("Детектор остановлен");
    }

    pub fn is_monitoring(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    pub fn is_full_screen(&self) -> bool {
        self.state.lock().was_full_screen
    }

    /// Текущее полноэкранное окно и его монитор
    pub fn current_window(&self) -> Option<(WindowHandle, MonitorHandle)> {
        let state = self.state.lock();
        state.current_full_screen_window.zip(state.current_monitor)
    }

    /// Продолжить эпизод, начатый прежним детектором: окно уже считается
    /// полноэкранным, и повторного входа на первом тике не будет.
    pub fn resume_full_screen(&self, window: WindowHandle, monitor: MonitorHandle) {
        let mut state = self.state.lock();
        state.was_full_screen = true;
        state.current_full_screen_window = Some(window);
        state.current_monitor = Some(monitor);
        debug_if_enabled!("Детектор продолжает эпизод: окно {} на {}", window, monitor);
    }

    pub fn current_interval(&self) -> Duration {
        *self.interval.borrow()
    }

    /// Новый интервал применяется без остановки цикла
    pub fn update_interval(&self, interval: Duration) {
        let interval = Self::sanitize_interval(interval);
        let previous = self.interval.send_replace(interval);
        if previous != interval {
            info!("Интервал опроса изменён: {:?} -> {:?}", previous, interval);
        }
    }

    pub fn update_target_processes(&self, target_processes: Vec<String>) {
        info!("Целевые процессы обновлены: {:?}", target_processes);
        *self.target_processes.write() = target_processes;
    }

    /// Один шаг конечного автомата. Возвращает события в порядке возникновения.
    pub fn tick(&self) -> SmallVec<[DetectorEvent; 2]> {
        let mut events = SmallVec::new();

        let targets = self.target_processes.read().clone();
        if targets.is_empty() {
            return events;
        }

        let mut state = self.state.lock();
        let found = self.cache.find_fullscreen_window(&targets);
        let is_full_screen = found.is_some();

        if is_full_screen != state.was_full_screen {
            state.was_full_screen = is_full_screen;
            state.current_full_screen_window = found.as_ref().map(|w| w.handle);
            state.current_monitor = found.as_ref().map(|w| w.monitor);

            let full_screen_state = match &found {
                Some(window) => {
                    info!(
                        "Обнаружено полноэкранное окно: {} ({}) на {}",
                        window.process_name, window.title, window.monitor
                    );
                    FullScreenState::entered(
                        window.handle,
                        window.monitor,
                        window.process_name.clone(),
                        window.title.clone(),
                    )
                }
                None => {
                    info!("Полноэкранный режим завершён");
                    state.last_foreground_window = None;
                    FullScreenState::exited()
                }
            };
            events.push(DetectorEvent::FullScreenStateChanged(full_screen_state));
        }

        if is_full_screen {
            match self.check_focus(&mut state, &targets) {
                Ok(Some(event)) => events.push(event),
                Ok(None) => {}
                Err(e) => debug_if_enabled!("Ошибка проверки смены фокуса: {}", e),
            }
        }

        events
    }

    fn check_focus(
        &self,
        state: &mut DetectorState,
        targets: &[String],
    ) -> Result<Option<DetectorEvent>> {
        let Some(foreground) = self.platform.get_foreground_window() else {
            return Ok(None);
        };

        if state.last_foreground_window == Some(foreground) {
            return Ok(None);
        }
        state.last_foreground_window = Some(foreground);

        let Some(process_name) = self.cache.resolve_process_name(foreground) else {
            trace_if_enabled!("Не удалось определить процесс окна {}", foreground);
            return Ok(None);
        };

        if !targets.contains(&process_name) {
            return Ok(None);
        }

        let monitor = state
            .current_monitor
            .ok_or_else(|| fsm_error!(internal, "нет монитора полноэкранного окна"))?;
        let window_title = self.platform.get_window_title(foreground)?;

        info!("Фокус на целевом процессе: {} ({})", process_name, window_title);

        Ok(Some(DetectorEvent::TargetProcessFocused(FullScreenState::entered(
            foreground,
            monitor,
            process_name,
            window_title,
        ))))
    }

    async fn run(
        detector: Weak<Self>,
        handler: Arc<dyn DetectorEventHandler>,
        mut interval_rx: watch::Receiver<Duration>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let period = *interval_rx.borrow_and_update();
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => break,
                changed = interval_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let period = *interval_rx.borrow_and_update();
                    ticker = time::interval_at(Instant::now() + period, period);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                }
                _ = ticker.tick() => {
                    let Some(detector) = detector.upgrade() else {
                        break;
                    };

                    for event in detector.tick() {
                        debug_if_enabled!("Событие детектора: {}", event);
                        handler.handle_detector_event(event);
                    }
                }
            }
        }

        debug_if_enabled!("Цикл опроса завершён");
    }

    fn sanitize_interval(interval: Duration) -> Duration {
        interval.max(Duration::from_millis(MIN_POLL_INTERVAL_MS))
    }
}

impl Drop for FullScreenDetector {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            info!("FullScreenDetector завершает работу");
            let _ = task.shutdown.send(true);
        }
    }
}

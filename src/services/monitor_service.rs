//! Координатор мониторинга.
//!
//! Связывает детектор и минимизатор согласно настройкам, управляет жизненным
//! циклом сессии и публикует `MonitorEvent` для внешних подписчиков.
//! Ошибки обработчиков никогда не попадают в цикл опроса: они логируются и
//! превращаются в `MonitorEvent::ErrorOccurred`.

use crate::config::MonitorSettings;
use crate::error::{FsmError, Result};
use crate::events::{
    DetectorEvent, FullScreenState, MonitorEvent, MonitorHandle, MonitoringStats, WindowHandle,
};
use crate::fsm_error;
use crate::platform::NativePlatform;
use crate::services::fullscreen_detector::{DetectorEventHandler, FullScreenDetector};
use crate::services::window_cache::WindowSnapshotCache;
use crate::services::window_minimizer::WindowMinimizer;
use crate::debug_if_enabled;
use chrono::{DateTime, Local};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{error, info};

/// Ёмкость канала уведомлений
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Состояние, разделяемое между командами сервиса и циклом опроса
struct ServiceCore {
    cache: Arc<WindowSnapshotCache>,
    minimizer: WindowMinimizer,
    settings: RwLock<MonitorSettings>,
    is_monitoring: AtomicBool,
    last_check_time: RwLock<Option<DateTime<Local>>>,
    events: broadcast::Sender<MonitorEvent>,
}

impl ServiceCore {
    fn publish(&self, event: MonitorEvent) {
        debug_if_enabled!("Публикация события: {}", event);
        // Отсутствие подписчиков не ошибка
        let _ = self.events.send(event);
    }

    fn report_error(&self, error: &FsmError) {
        error!("[{}] {}", error.code(), error);
        self.publish(MonitorEvent::ErrorOccurred(format!("[{}] {}", error.code(), error)));
    }

    fn restore_windows(&self) -> usize {
        let restored = self.minimizer.restore_minimized();
        if restored > 0 {
            self.publish(MonitorEvent::WindowsRestored(restored));
        }
        restored
    }

    fn on_full_screen_changed(&self, state: FullScreenState) -> Result<()> {
        if state.is_full_screen {
            let monitor = state
                .monitor
                .ok_or_else(|| fsm_error!(monitoring, "событие полноэкранного режима без монитора"))?;

            let minimized = self.minimizer.minimize_on_monitor(monitor, state.window)?;
            if minimized > 0 {
                self.publish(MonitorEvent::WindowsMinimized(minimized));
            }
            return Ok(());
        }

        if self.settings.read().restore_on_full_screen_exit {
            self.restore_windows();
        } else {
            info!(
                "Восстановление при выходе из полноэкранного режима отключено, свернутых окон: {}",
                self.minimizer.minimized_count()
            );
        }
        Ok(())
    }

    fn on_target_focused(&self, state: FullScreenState) -> Result<()> {
        let (Some(window), Some(monitor)) = (state.window, state.monitor) else {
            return Err(fsm_error!(monitoring, "событие фокуса без окна или монитора"));
        };

        let minimized = self.minimizer.minimize_all_non_target(window, monitor)?;
        if minimized > 0 {
            self.publish(MonitorEvent::WindowsMinimized(minimized));
        }
        Ok(())
    }
}

impl DetectorEventHandler for ServiceCore {
    fn handle_detector_event(&self, event: DetectorEvent) {
        *self.last_check_time.write() = Some(Local::now());

        let result = match event {
            DetectorEvent::FullScreenStateChanged(state) => self.on_full_screen_changed(state),
            DetectorEvent::TargetProcessFocused(state) => self.on_target_focused(state),
        };

        if let Err(e) = result {
            self.report_error(&e);
        }
    }
}

/// Сервис мониторинга полноэкранных окон
pub struct WindowMonitorService {
    platform: Arc<dyn NativePlatform>,
    core: Arc<ServiceCore>,
    // Команды управления сериализуются этим мьютексом
    detector: Mutex<Option<Arc<FullScreenDetector>>>,
}

impl WindowMonitorService {
    pub fn new(platform: Arc<dyn NativePlatform>, settings: MonitorSettings) -> Self {
        let cache = Arc::new(WindowSnapshotCache::new(platform.clone()));
        Self::with_cache(platform, cache, settings)
    }

    pub fn with_cache(
        platform: Arc<dyn NativePlatform>,
        cache: Arc<WindowSnapshotCache>,
        mut settings: MonitorSettings,
    ) -> Self {
        settings.normalize();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        info!(
            "Инициализация WindowMonitorService: процессы {:?}, интервал {} мс",
            settings.target_processes, settings.poll_interval_ms
        );

        Self {
            core: Arc::new(ServiceCore {
                minimizer: WindowMinimizer::new(cache.clone(), platform.clone()),
                cache,
                settings: RwLock::new(settings),
                is_monitoring: AtomicBool::new(false),
                last_check_time: RwLock::new(None),
                events,
            }),
            platform,
            detector: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.core.events.subscribe()
    }

    pub fn cache(&self) -> &Arc<WindowSnapshotCache> {
        &self.core.cache
    }

    pub fn settings(&self) -> MonitorSettings {
        self.core.settings.read().clone()
    }

    pub fn is_monitoring(&self) -> bool {
        self.core.is_monitoring.load(Ordering::SeqCst)
    }

    pub async fn start_monitoring(&self) {
        let mut detector = self.detector.lock().await;
        self.start_locked(&mut detector, None);
    }

    /// Остановить опрос. Свернутые окна остаются свернутыми.
    pub async fn stop_monitoring(&self) {
        let mut detector = self.detector.lock().await;
        self.stop_locked(&mut detector).await;
    }

    /// Применить новые настройки: интервал и список процессов на лету,
    /// остальное через перезапуск сессии.
    pub async fn update_settings(&self, mut settings: MonitorSettings) -> Result<()> {
        settings.normalize();
        if let Err(e) = settings.validate() {
            self.core.report_error(&e);
            return Err(e);
        }

        let mut slot = self.detector.lock().await;

        let diff = {
            let mut current = self.core.settings.write();
            let diff = current.diff(&settings);
            *current = settings.clone();
            diff
        };

        if diff.is_empty() {
            debug_if_enabled!("Настройки не изменились");
            return Ok(());
        }

        let Some(detector) = slot.clone() else {
            info!("Настройки обновлены");
            return Ok(());
        };

        if diff.interval_changed {
            detector.update_interval(settings.poll_interval());
        }

        if diff.targets_changed {
            detector.update_target_processes(settings.target_processes.clone());
        }

        if diff.restart_required {
            info!("Изменение настроек требует перезапуска мониторинга");
            // Открытый эпизод переживает перезапуск, иначе свернутые окна потеряются
            let episode = self.stop_locked(&mut slot).await;
            self.start_locked(&mut slot, episode);
        }

        Ok(())
    }

    pub fn restore_windows_manually(&self) -> usize {
        let restored = self.core.restore_windows();
        info!("Ручное восстановление: {} окон", restored);
        restored
    }

    /// Окно настроек закрыто
    pub fn on_settings_closed(&self) -> usize {
        if self.core.settings.read().restore_on_settings_closed {
            self.core.restore_windows()
        } else {
            0
        }
    }

    /// Завершение приложения: остановить опрос и вернуть окна, если это разрешено
    pub async fn shutdown(&self) -> usize {
        self.stop_monitoring().await;

        if self.core.settings.read().restore_on_app_exit {
            self.core.restore_windows()
        } else {
            info!(
                "Восстановление при выходе отключено, свернутых окон: {}",
                self.core.minimizer.minimized_count()
            );
            0
        }
    }

    pub fn get_stats(&self) -> MonitoringStats {
        let settings = self.core.settings.read();
        MonitoringStats {
            is_monitoring: self.is_monitoring(),
            last_check_time: *self.core.last_check_time.read(),
            minimized_count: self.core.minimizer.minimized_count(),
            target_process_count: settings.target_processes.len(),
            poll_interval_ms: settings.poll_interval().as_millis() as u64,
        }
    }

    fn start_locked(
        &self,
        slot: &mut Option<Arc<FullScreenDetector>>,
        episode: Option<(WindowHandle, MonitorHandle)>,
    ) {
        if slot.is_some() {
            debug_if_enabled!("Мониторинг уже запущен");
            return;
        }

        let settings = self.core.settings.read().clone();
        let interval = settings.poll_interval();
        let detector = Arc::new(FullScreenDetector::new(
            self.core.cache.clone(),
            self.platform.clone(),
            settings.target_processes,
            interval,
        ));
        if let Some((window, monitor)) = episode {
            detector.resume_full_screen(window, monitor);
        }

        let handler: Arc<dyn DetectorEventHandler> = self.core.clone();
        detector.start(handler);
        *slot = Some(detector);

        self.core.is_monitoring.store(true, Ordering::SeqCst);
        info!("Мониторинг запущен");
        self.core.publish(MonitorEvent::MonitoringStateChanged(true));
    }

    /// Возвращает полноэкранное окно, на котором остановился детектор
    async fn stop_locked(
        &self,
        slot: &mut Option<Arc<FullScreenDetector>>,
    ) -> Option<(WindowHandle, MonitorHandle)> {
        let detector = slot.take()?;

        detector.stop().await;

        self.core.is_monitoring.store(false, Ordering::SeqCst);
        info!("Мониторинг остановлен");
        self.core.publish(MonitorEvent::MonitoringStateChanged(false));
        detector.current_window()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Rect, ShowState};
    use crate::platform::{DryRunPlatform, DryRunWindow};
    use pretty_assertions::assert_eq;
    use tokio::time::{self, Duration};

    const WORK_AREA: Rect = Rect {
        left: 0,
        top: 0,
        right: 1920,
        bottom: 1080,
    };

    struct Desk {
        platform: Arc<DryRunPlatform>,
        service: WindowMonitorService,
    }

    fn settings(targets: &[&str]) -> MonitorSettings {
        MonitorSettings {
            target_processes: targets.iter().map(|t| t.to_string()).collect(),
            poll_interval_ms: 200,
            ..MonitorSettings::default()
        }
    }

    fn desk(settings: MonitorSettings) -> Desk {
        let platform = Arc::new(DryRunPlatform::new());
        platform.add_monitor(WORK_AREA, WORK_AREA);
        platform.add_process(1, r"C:\Games\game.exe");
        platform.add_process(2, r"C:\Windows\notepad.exe");
        platform.add_process(3, r"C:\Windows\calc.exe");

        let cache = Arc::new(WindowSnapshotCache::with_staleness(
            platform.clone(),
            Duration::ZERO,
        ));
        let service = WindowMonitorService::with_cache(platform.clone(), cache, settings);
        Desk { platform, service }
    }

    /// Детектор, управляемый вручную: один вызов - один тик
    fn manual_detector(desk: &Desk) -> FullScreenDetector {
        let settings = desk.service.settings();
        let interval = settings.poll_interval();
        FullScreenDetector::new(
            desk.service.cache().clone(),
            desk.platform.clone(),
            settings.target_processes,
            interval,
        )
    }

    fn pump(desk: &Desk, detector: &FullScreenDetector) -> Vec<DetectorEvent> {
        let events: Vec<_> = detector.tick().into_iter().collect();
        for event in &events {
            desk.service.core.handle_detector_event(event.clone());
        }
        events
    }

    fn drain(receiver: &mut broadcast::Receiver<MonitorEvent>) -> Vec<MonitorEvent> {
        let mut events = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_screen_session_minimizes_and_restores() {
        let desk = desk(settings(&["game"]));
        let mut receiver = desk.service.subscribe();
        let notepad = desk.platform.open_window(DryRunWindow::new(2, "Notepad"));
        let calc = desk.platform.open_window(DryRunWindow::new(3, "Calculator"));

        desk.service.start_monitoring().await;
        assert!(desk.service.is_monitoring());

        let game = desk
            .platform
            .open_window(DryRunWindow::new(1, "Game").maximized(WORK_AREA));
        time::sleep(Duration::from_millis(250)).await;

        assert_eq!(
            drain(&mut receiver),
            vec![
                MonitorEvent::MonitoringStateChanged(true),
                MonitorEvent::WindowsMinimized(2)
            ]
        );
        assert_eq!(desk.platform.show_state(notepad), Some(ShowState::Minimized));
        assert_eq!(desk.platform.show_state(calc), Some(ShowState::Minimized));
        assert_eq!(desk.service.get_stats().minimized_count, 2);

        desk.platform.close_window(game);
        time::sleep(Duration::from_millis(250)).await;

        assert_eq!(drain(&mut receiver), vec![MonitorEvent::WindowsRestored(2)]);
        assert_eq!(desk.platform.show_state(notepad), Some(ShowState::Normal));
        assert_eq!(desk.platform.show_state(calc), Some(ShowState::Normal));

        desk.service.stop_monitoring().await;
        assert!(!desk.service.is_monitoring());
        assert_eq!(
            drain(&mut receiver),
            vec![MonitorEvent::MonitoringStateChanged(false)]
        );

        let stats = desk.service.get_stats();
        assert!(stats.last_check_time.is_some());
        assert_eq!(stats.minimized_count, 0);
    }

    #[test]
    fn test_no_restore_when_policy_is_off() {
        let desk = desk(MonitorSettings {
            restore_on_full_screen_exit: false,
            ..settings(&["game"])
        });
        let mut receiver = desk.service.subscribe();
        let detector = manual_detector(&desk);
        let notepad = desk.platform.open_window(DryRunWindow::new(2, "Notepad"));
        let game = desk
            .platform
            .open_window(DryRunWindow::new(1, "Game").maximized(WORK_AREA));

        pump(&desk, &detector);
        desk.platform.close_window(game);
        let requests = desk.platform.state_requests();
        pump(&desk, &detector);

        assert_eq!(desk.platform.state_requests(), requests);
        assert_eq!(desk.service.get_stats().minimized_count, 1);
        assert_eq!(desk.platform.show_state(notepad), Some(ShowState::Minimized));
        assert_eq!(drain(&mut receiver), vec![MonitorEvent::WindowsMinimized(1)]);

        assert_eq!(desk.service.restore_windows_manually(), 1);
        assert_eq!(desk.platform.show_state(notepad), Some(ShowState::Normal));
    }

    #[test]
    fn test_focus_change_rehides_without_full_screen_transition() {
        let desk = desk(settings(&["game"]));
        let mut receiver = desk.service.subscribe();
        let detector = manual_detector(&desk);
        let notepad = desk.platform.open_window(DryRunWindow::new(2, "Notepad"));
        let launcher = desk.platform.open_window(DryRunWindow::new(1, "Game Launcher"));
        let main = desk
            .platform
            .open_window(DryRunWindow::new(1, "Game").maximized(WORK_AREA));
        desk.platform.set_foreground(Some(main));

        pump(&desk, &detector);
        assert_eq!(drain(&mut receiver), vec![MonitorEvent::WindowsMinimized(2)]);

        // Пользователь вернул блокнот и переключился на лаунчер игры
        desk.platform.set_show_state(notepad, ShowState::Normal);
        desk.platform.set_show_state(launcher, ShowState::Normal);
        desk.platform.set_foreground(Some(launcher));

        let events = pump(&desk, &detector);
        assert!(matches!(&events[..], [DetectorEvent::TargetProcessFocused(s)] if s.window == Some(launcher)));
        assert_eq!(drain(&mut receiver), vec![MonitorEvent::WindowsMinimized(1)]);
        assert_eq!(desk.platform.show_state(notepad), Some(ShowState::Minimized));
        assert_eq!(desk.platform.show_state(launcher), Some(ShowState::Normal));
        assert_eq!(desk.platform.show_state(main), Some(ShowState::Maximized));
    }

    #[test]
    fn test_handler_errors_become_notifications() {
        let desk = desk(settings(&["game"]));
        let mut receiver = desk.service.subscribe();

        desk.service
            .core
            .handle_detector_event(DetectorEvent::FullScreenStateChanged(FullScreenState::entered(
                WindowHandle::from_raw(0x10),
                MonitorHandle::from_raw(0x99),
                "game".to_string(),
                "Game".to_string(),
            )));
        desk.service
            .core
            .handle_detector_event(DetectorEvent::TargetProcessFocused(FullScreenState::exited()));

        let events = drain(&mut receiver);
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], MonitorEvent::ErrorOccurred(m) if m.starts_with("[PLATFORM_ERROR]")));
        assert!(matches!(&events[1], MonitorEvent::ErrorOccurred(m) if m.starts_with("[MONITORING_ERROR]")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_settings_in_place_and_with_restart() {
        let desk = desk(settings(&["game"]));
        let mut receiver = desk.service.subscribe();
        desk.service.start_monitoring().await;
        let initial = desk.service.detector.lock().await.clone().unwrap();
        drain(&mut receiver);

        desk.service
            .update_settings(MonitorSettings {
                poll_interval_ms: 300,
                target_processes: vec!["Game.exe".to_string(), "player".to_string()],
                ..settings(&[])
            })
            .await
            .unwrap();

        let current = desk.service.detector.lock().await.clone().unwrap();
        assert!(Arc::ptr_eq(&initial, &current));
        assert_eq!(current.current_interval(), Duration::from_millis(300));
        assert!(drain(&mut receiver).is_empty());
        assert_eq!(desk.service.get_stats().target_process_count, 2);
        assert_eq!(desk.service.settings().target_processes, vec!["game", "player"]);

        desk.service
            .update_settings(MonitorSettings {
                restore_on_app_exit: false,
                ..desk.service.settings()
            })
            .await
            .unwrap();

        let restarted = desk.service.detector.lock().await.clone().unwrap();
        assert!(!Arc::ptr_eq(&initial, &restarted));
        assert!(!initial.is_monitoring());
        assert!(desk.service.is_monitoring());
        assert_eq!(
            drain(&mut receiver),
            vec![
                MonitorEvent::MonitoringStateChanged(false),
                MonitorEvent::MonitoringStateChanged(true)
            ]
        );

        desk.service.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_keeps_open_episode() {
        let desk = desk(settings(&["game"]));
        let mut receiver = desk.service.subscribe();
        let notepad = desk.platform.open_window(DryRunWindow::new(2, "Notepad"));

        desk.service.start_monitoring().await;
        let game = desk
            .platform
            .open_window(DryRunWindow::new(1, "Game").maximized(WORK_AREA));
        time::sleep(Duration::from_millis(250)).await;
        assert_eq!(desk.service.get_stats().minimized_count, 1);
        drain(&mut receiver);

        desk.service
            .update_settings(MonitorSettings {
                restore_on_app_exit: false,
                ..desk.service.settings()
            })
            .await
            .unwrap();
        time::sleep(Duration::from_millis(250)).await;

        assert_eq!(desk.service.get_stats().minimized_count, 1);
        assert_eq!(
            drain(&mut receiver),
            vec![
                MonitorEvent::MonitoringStateChanged(false),
                MonitorEvent::MonitoringStateChanged(true)
            ]
        );

        desk.platform.close_window(game);
        time::sleep(Duration::from_millis(250)).await;

        assert_eq!(drain(&mut receiver), vec![MonitorEvent::WindowsRestored(1)]);
        assert_eq!(desk.platform.show_state(notepad), Some(ShowState::Normal));

        desk.service.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalid_settings_are_rejected() {
        let desk = desk(settings(&["game"]));
        let mut receiver = desk.service.subscribe();

        let result = desk
            .service
            .update_settings(MonitorSettings {
                poll_interval_ms: 5,
                ..settings(&["game"])
            })
            .await;

        assert!(matches!(result, Err(FsmError::Settings(_))));
        assert_eq!(desk.service.settings().poll_interval_ms, 200);
        assert!(matches!(
            &drain(&mut receiver)[..],
            [MonitorEvent::ErrorOccurred(m)] if m.starts_with("[SETTINGS_ERROR]")
        ));
    }

    #[tokio::test]
    async fn test_shutdown_and_settings_closed_follow_policy() {
        let desk = desk(MonitorSettings {
            restore_on_full_screen_exit: false,
            restore_on_settings_closed: false,
            ..settings(&["game"])
        });
        let detector = manual_detector(&desk);
        let notepad = desk.platform.open_window(DryRunWindow::new(2, "Notepad"));
        desk.platform
            .open_window(DryRunWindow::new(1, "Game").maximized(WORK_AREA));
        pump(&desk, &detector);

        assert_eq!(desk.service.on_settings_closed(), 0);
        assert_eq!(desk.platform.show_state(notepad), Some(ShowState::Minimized));

        desk.service.start_monitoring().await;
        assert_eq!(desk.service.shutdown().await, 1);
        assert!(!desk.service.is_monitoring());
        assert_eq!(desk.platform.show_state(notepad), Some(ShowState::Normal));
    }

    #[test]
    fn test_stats_reflect_settings() {
        let desk = desk(MonitorSettings {
            poll_interval_ms: 5000,
            ..settings(&["game", "player"])
        });

        let stats = desk.service.get_stats();
        assert!(!stats.is_monitoring);
        assert!(stats.last_check_time.is_none());
        assert_eq!(stats.target_process_count, 2);
        assert_eq!(stats.poll_interval_ms, 2000);
    }
}

use crate::error::Result;
use crate::events::{MonitorHandle, ShowState, WindowCommand, WindowHandle};
use crate::platform::{is_system_window, NativePlatform};
use crate::services::window_cache::WindowSnapshotCache;
use crate::{debug_if_enabled, trace_if_enabled};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

/// Сворачивает окна и возвращает ровно те, что свернул сам.
///
/// Список свернутых окон живёт один "эпизод": от сворачивания до восстановления.
/// Окна, которые пользователь свернул заранее, в список не попадают и
/// никогда не восстанавливаются.
pub struct WindowMinimizer {
    cache: Arc<WindowSnapshotCache>,
    platform: Arc<dyn NativePlatform>,
    minimized: Mutex<Vec<WindowHandle>>,
}

impl WindowMinimizer {
    pub fn new(cache: Arc<WindowSnapshotCache>, platform: Arc<dyn NativePlatform>) -> Self {
        Self {
            cache,
            platform,
            minimized: Mutex::new(Vec::new()),
        }
    }

    /// Свернуть все окна монитора, кроме `exclude`. Начинает новый эпизод.
    pub fn minimize_on_monitor(
        &self,
        monitor: MonitorHandle,
        exclude: Option<WindowHandle>,
    ) -> Result<usize> {
        let mut minimized = self.minimized.lock();
        minimized.clear();

        self.platform.get_monitor_info(monitor)?;

        for window in self.cache.get_windows_on_monitor(monitor, exclude) {
            // Снимок мог устареть: окно, свернутое пользователем, не попадает в эпизод
            if !self.is_still_eligible(window.handle) {
                trace_if_enabled!("Окно {} уже свернуто или недоступно", window.handle);
                continue;
            }

            if self.request(window.handle, WindowCommand::Minimize) {
                debug_if_enabled!("Свернуто: {}", window);
                minimized.push(window.handle);
            }
        }

        info!("Свернуто окон на {}: {}", monitor, minimized.len());
        Ok(minimized.len())
    }

    /// Свернуть окна, снова появившиеся на мониторе при смене фокуса внутри целевого процесса.
    /// Дописывает в открытый эпизод.
    ///
    /// Не трогает ни одно окно процесса `target_window`, а не только само окно:
    /// переключение на второе окно игры не сворачивает её главное окно.
    pub fn minimize_all_non_target(
        &self,
        target_window: WindowHandle,
        monitor: MonitorHandle,
    ) -> Result<usize> {
        let mut minimized = self.minimized.lock();

        self.platform.get_monitor_info(monitor)?;
        let target_process = self.platform.get_window_process_id(target_window).ok();

        let mut count = 0;
        for window in self.cache.get_windows_on_monitor(monitor, Some(target_window)) {
            if Some(window.process_id) == target_process {
                continue;
            }

            // Снимок мог устареть: состояние проверяется заново перед изменением
            if !self.is_still_eligible(window.handle) {
                continue;
            }

            if self.request(window.handle, WindowCommand::Minimize) {
                debug_if_enabled!("Свернуто при смене фокуса: {}", window);
                if !minimized.contains(&window.handle) {
                    minimized.push(window.handle);
                }
                count += 1;
            }
        }

        if count > 0 {
            info!("Свернуто окон при смене фокуса: {}", count);
        }
        Ok(count)
    }

    /// Восстановить окна текущего эпизода. Список очищается в любом случае.
    pub fn restore_minimized(&self) -> usize {
        let mut minimized = self.minimized.lock();
        let windows = std::mem::take(&mut *minimized);

        let mut restored = 0;
        for window in windows {
            // Свернутое окно тоже "видимо", поэтому это только проверка существования
            if !self.platform.is_window(window) || !self.platform.is_window_visible(window) {
                trace_if_enabled!("Окно {} больше не существует", window);
                continue;
            }

            if self.request(window, WindowCommand::Restore) {
                restored += 1;
            }
        }

        if restored > 0 {
            info!("Восстановлено окон: {}", restored);
        }
        restored
    }

    pub fn minimized_count(&self) -> usize {
        self.minimized.lock().len()
    }

    pub fn minimized_windows(&self) -> Vec<WindowHandle> {
        self.minimized.lock().clone()
    }

    /// Забыть текущий эпизод без восстановления окон
    pub fn clear_history(&self) {
        let mut minimized = self.minimized.lock();
        if !minimized.is_empty() {
            info!("Сброшен список свернутых окон ({})", minimized.len());
        }
        minimized.clear();
    }

    fn is_still_eligible(&self, window: WindowHandle) -> bool {
        if !self.platform.is_window_visible(window) {
            return false;
        }

        if is_system_window(self.platform.as_ref(), window).unwrap_or(true) {
            return false;
        }

        matches!(
            self.platform.get_window_placement(window),
            Ok(ShowState::Normal) | Ok(ShowState::Maximized)
        )
    }

    fn request(&self, window: WindowHandle, command: WindowCommand) -> bool {
        match self.platform.set_window_state(window, command) {
            Ok(true) => true,
            Ok(false) => {
                debug_if_enabled!("ОС не подтвердила {:?} для окна {}", command, window);
                false
            }
            Err(e) => {
                debug_if_enabled!("{:?} для окна {} не выполнено: {}", command, window, e);
                false
            }
        }
    }
}

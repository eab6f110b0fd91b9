use crate::error::{FsmError, Result};
use crate::events::{MonitorHandle, MonitorInfo, Rect, ShowState, WindowCommand, WindowHandle};
use crate::fsm_error;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tracing::info;

use super::r#trait::NativePlatform;

/// Описание окна эмулированного рабочего стола
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DryRunWindow {
    pub process_id: u32,
    pub class_name: String,
    pub title: String,
    pub bounds: Rect,
    pub show_state: ShowState,
    pub visible: bool,
    pub tool_window: bool,
}

impl DryRunWindow {
    pub fn new(process_id: u32, title: &str) -> Self {
        Self {
            process_id,
            class_name: "DryRunWindow".to_string(),
            title: title.to_string(),
            bounds: Rect::from_size(100, 100, 800, 600),
            show_state: ShowState::Normal,
            visible: true,
            tool_window: false,
        }
    }

    pub fn with_class(mut self, class_name: &str) -> Self {
        self.class_name = class_name.to_string();
        self
    }

    pub fn with_bounds(mut self, bounds: Rect) -> Self {
        self.bounds = bounds;
        self
    }

    /// Развернуть на указанную область (обычно рабочую область монитора)
    pub fn maximized(mut self, bounds: Rect) -> Self {
        self.bounds = bounds;
        self.show_state = ShowState::Maximized;
        self
    }

    pub fn minimized(mut self) -> Self {
        self.show_state = ShowState::Minimized;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn tool_window(mut self) -> Self {
        self.tool_window = true;
        self
    }
}

#[derive(Default)]
struct Desktop {
    monitors: Vec<(MonitorHandle, MonitorInfo)>,
    processes: HashMap<u32, String>,
    // Индекс 0 - самое верхнее окно
    windows: Vec<(WindowHandle, DryRunWindow)>,
    restore_states: HashMap<WindowHandle, ShowState>,
    foreground: Option<WindowHandle>,
    next_handle: isize,
    fail_enumeration: bool,
    failing_windows: HashSet<WindowHandle>,
    refusing_windows: HashSet<WindowHandle>,
    enumeration_count: usize,
    image_name_queries: usize,
    state_requests: usize,
}

impl Desktop {
    fn window(&self, handle: WindowHandle) -> Result<&DryRunWindow> {
        if self.failing_windows.contains(&handle) {
            return Err(fsm_error!(platform, "эмулированный сбой окна {}", handle));
        }
        self.windows
            .iter()
            .find(|(h, _)| *h == handle)
            .map(|(_, w)| w)
            .ok_or(FsmError::WindowNotFound(handle))
    }

    fn window_mut(&mut self, handle: WindowHandle) -> Option<&mut DryRunWindow> {
        self.windows
            .iter_mut()
            .find(|(h, _)| *h == handle)
            .map(|(_, w)| w)
    }
}

/// Эмулированный рабочий стол: мониторы, процессы и окна в Z-порядке.
///
/// Используется в режиме `--dry-run` и как подставная платформа в тестах.
/// Умеет имитировать сбои: отказ перечисления целиком, ошибку отдельного окна
/// и отказ ОС менять состояние окна.
pub struct DryRunPlatform {
    desktop: Mutex<Desktop>,
}

impl Default for DryRunPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl DryRunPlatform {
    pub fn new() -> Self {
        Self {
            desktop: Mutex::new(Desktop {
                next_handle: 0x1000,
                ..Desktop::default()
            }),
        }
    }

    /// Рабочий стол для демонстрационного режима: монитор 1920x1080 и пара обычных окон
    pub fn demo() -> Self {
        let platform = Self::new();
        let monitor = platform.add_monitor(
            Rect::from_size(0, 0, 1920, 1080),
            Rect::from_size(0, 0, 1920, 1040),
        );
        let work_area = platform
            .monitor_info(monitor)
            .map(|m| m.work_area)
            .unwrap_or_default();

        platform.add_process(100, r"C:\Windows\explorer.exe");
        platform.add_process(200, r"C:\Windows\System32\notepad.exe");
        platform.add_process(300, r"C:\Program Files\Mozilla Firefox\firefox.exe");

        platform.open_window(
            DryRunWindow::new(100, "")
                .with_class("Shell_TrayWnd")
                .with_bounds(Rect::new(0, work_area.bottom, 1920, 1080)),
        );
        platform.open_window(DryRunWindow::new(200, "notes.txt - Notepad"));
        platform.open_window(
            DryRunWindow::new(300, "Mozilla Firefox").with_bounds(Rect::from_size(200, 80, 1200, 800)),
        );
        platform
    }

    pub fn add_monitor(&self, bounds: Rect, work_area: Rect) -> MonitorHandle {
        let mut desktop = self.desktop.lock();
        let handle = MonitorHandle::from_raw(0x10 + desktop.monitors.len() as isize);
        desktop
            .monitors
            .push((handle, MonitorInfo { bounds, work_area }));
        handle
    }

    pub fn monitor_info(&self, monitor: MonitorHandle) -> Option<MonitorInfo> {
        self.desktop
            .lock()
            .monitors
            .iter()
            .find(|(h, _)| *h == monitor)
            .map(|(_, info)| *info)
    }

    pub fn add_process(&self, process_id: u32, image_path: &str) {
        self.desktop
            .lock()
            .processes
            .insert(process_id, image_path.to_string());
    }

    /// Открыть окно поверх остальных
    pub fn open_window(&self, window: DryRunWindow) -> WindowHandle {
        let mut desktop = self.desktop.lock();
        let handle = WindowHandle::from_raw(desktop.next_handle);
        desktop.next_handle += 0x10;
        desktop.windows.insert(0, (handle, window));
        handle
    }

    pub fn close_window(&self, window: WindowHandle) {
        let mut desktop = self.desktop.lock();
        desktop.windows.retain(|(h, _)| *h != window);
        desktop.restore_states.remove(&window);
        if desktop.foreground == Some(window) {
            desktop.foreground = None;
        }
    }

    pub fn set_foreground(&self, window: Option<WindowHandle>) {
        self.desktop.lock().foreground = window;
    }

    /// Действие пользователя: сменить состояние окна в обход программы
    pub fn set_show_state(&self, window: WindowHandle, show_state: ShowState) {
        if let Some(w) = self.desktop.lock().window_mut(window) {
            w.show_state = show_state;
        }
    }

    pub fn show_state(&self, window: WindowHandle) -> Option<ShowState> {
        self.desktop.lock().window(window).ok().map(|w| w.show_state)
    }

    pub fn fail_enumeration(&self, fail: bool) {
        self.desktop.lock().fail_enumeration = fail;
    }

    pub fn fail_window(&self, window: WindowHandle) {
        self.desktop.lock().failing_windows.insert(window);
    }

    pub fn refuse_state_changes(&self, window: WindowHandle) {
        self.desktop.lock().refusing_windows.insert(window);
    }

    pub fn enumeration_count(&self) -> usize {
        self.desktop.lock().enumeration_count
    }

    pub fn image_name_queries(&self) -> usize {
        self.desktop.lock().image_name_queries
    }

    pub fn state_requests(&self) -> usize {
        self.desktop.lock().state_requests
    }
}

impl NativePlatform for DryRunPlatform {
    fn enumerate_top_level_windows(&self) -> Result<Vec<WindowHandle>> {
        let mut desktop = self.desktop.lock();
        if desktop.fail_enumeration {
            return Err(fsm_error!(platform, "эмулированный сбой EnumWindows"));
        }
        desktop.enumeration_count += 1;
        Ok(desktop.windows.iter().map(|(h, _)| *h).collect())
    }

    fn is_window(&self, window: WindowHandle) -> bool {
        self.desktop.lock().windows.iter().any(|(h, _)| *h == window)
    }

    fn is_window_visible(&self, window: WindowHandle) -> bool {
        // Как и в Win32, свернутое окно остаётся "видимым"
        self.desktop
            .lock()
            .window(window)
            .map(|w| w.visible)
            .unwrap_or(false)
    }

    fn get_window_class(&self, window: WindowHandle) -> Result<String> {
        self.desktop.lock().window(window).map(|w| w.class_name.clone())
    }

    fn get_window_title(&self, window: WindowHandle) -> Result<String> {
        self.desktop.lock().window(window).map(|w| w.title.clone())
    }

    fn is_tool_window(&self, window: WindowHandle) -> Result<bool> {
        self.desktop.lock().window(window).map(|w| w.tool_window)
    }

    fn get_window_process_id(&self, window: WindowHandle) -> Result<u32> {
        self.desktop.lock().window(window).map(|w| w.process_id)
    }

    fn get_process_image_name(&self, process_id: u32) -> Result<String> {
        let mut desktop = self.desktop.lock();
        desktop.image_name_queries += 1;
        desktop
            .processes
            .get(&process_id)
            .cloned()
            .ok_or_else(|| fsm_error!(platform, "процесс {} недоступен", process_id))
    }

    fn get_window_placement(&self, window: WindowHandle) -> Result<ShowState> {
        self.desktop.lock().window(window).map(|w| w.show_state)
    }

    fn get_window_rect(&self, window: WindowHandle) -> Result<Rect> {
        self.desktop.lock().window(window).map(|w| w.bounds)
    }

    fn monitor_from_window(&self, window: WindowHandle) -> Result<MonitorHandle> {
        let desktop = self.desktop.lock();
        let bounds = desktop.window(window)?.bounds;

        // MONITOR_DEFAULTTONEAREST: при отсутствии пересечений берётся первый монитор
        desktop
            .monitors
            .iter()
            .max_by_key(|(_, info)| info.bounds.intersection_area(&bounds))
            .map(|(h, _)| *h)
            .ok_or_else(|| fsm_error!(platform, "мониторы не найдены"))
    }

    fn get_monitor_info(&self, monitor: MonitorHandle) -> Result<MonitorInfo> {
        self.monitor_info(monitor)
            .ok_or_else(|| fsm_error!(platform, "монитор {} не найден", monitor))
    }

    fn set_window_state(&self, window: WindowHandle, command: WindowCommand) -> Result<bool> {
        let mut desktop = self.desktop.lock();
        desktop.state_requests += 1;

        let refused = desktop.refusing_windows.contains(&window);
        let current = desktop.window(window)?.show_state;
        if refused {
            return Ok(false);
        }

        let next = match command {
            WindowCommand::Minimize => {
                if current != ShowState::Minimized {
                    desktop.restore_states.insert(window, current);
                }
                ShowState::Minimized
            }
            WindowCommand::Restore => desktop
                .restore_states
                .remove(&window)
                .unwrap_or(ShowState::Normal),
        };

        if let Some(w) = desktop.window_mut(window) {
            w.show_state = next;
        }
        Ok(true)
    }

    fn get_foreground_window(&self) -> Option<WindowHandle> {
        self.desktop.lock().foreground
    }
}

/// Демонстрационный сценарий: каждые 10 секунд "игра" то разворачивается на весь экран, то закрывается
pub fn spawn_demo_scenario(platform: Arc<DryRunPlatform>) -> JoinHandle<()> {
    const GAME_PID: u32 = 4242;

    platform.add_process(GAME_PID, r"C:\Games\game.exe");
    info!("Dry-run: добавьте процесс \"game\" в target_processes, чтобы увидеть сворачивание окон");

    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(10));
        let mut game: Option<WindowHandle> = None;

        loop {
            ticker.tick().await;

            match game.take() {
                Some(window) => {
                    info!("Dry-run: закрываем полноэкранное окно game ({})", window);
                    platform.close_window(window);
                }
                None => {
                    let Some(monitor) = platform.monitor_info(MonitorHandle::from_raw(0x10)) else {
                        continue;
                    };
                    let window = platform.open_window(
                        DryRunWindow::new(GAME_PID, "Game - dry_run").maximized(monitor.work_area),
                    );
                    platform.set_foreground(Some(window));
                    info!("Dry-run: открыто полноэкранное окно game ({})", window);
                    game = Some(window);
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_window_goes_on_top() {
        let platform = DryRunPlatform::new();
        let first = platform.open_window(DryRunWindow::new(1, "first"));
        let second = platform.open_window(DryRunWindow::new(1, "second"));
        assert_eq!(platform.enumerate_top_level_windows().unwrap(), vec![second, first]);
    }

    #[test]
    fn test_monitor_from_window_picks_largest_overlap() {
        let platform = DryRunPlatform::new();
        let left = platform.add_monitor(
            Rect::from_size(0, 0, 1920, 1080),
            Rect::from_size(0, 0, 1920, 1040),
        );
        let right = platform.add_monitor(
            Rect::from_size(1920, 0, 1920, 1080),
            Rect::from_size(1920, 0, 1920, 1040),
        );

        let mostly_right = platform.open_window(
            DryRunWindow::new(1, "w").with_bounds(Rect::from_size(1800, 0, 800, 600)),
        );
        let mostly_left = platform.open_window(
            DryRunWindow::new(1, "w").with_bounds(Rect::from_size(1500, 0, 800, 600)),
        );

        assert_eq!(platform.monitor_from_window(mostly_right).unwrap(), right);
        assert_eq!(platform.monitor_from_window(mostly_left).unwrap(), left);
    }

    #[test]
    fn test_minimize_then_restore_returns_previous_state() {
        let platform = DryRunPlatform::new();
        let window = platform.open_window(
            DryRunWindow::new(1, "w").maximized(Rect::from_size(0, 0, 100, 100)),
        );

        assert!(platform.set_window_state(window, WindowCommand::Minimize).unwrap());
        assert_eq!(platform.show_state(window), Some(ShowState::Minimized));
        assert!(platform.is_window_visible(window));

        assert!(platform.set_window_state(window, WindowCommand::Restore).unwrap());
        assert_eq!(platform.show_state(window), Some(ShowState::Maximized));
    }

    #[test]
    fn test_fault_injection() {
        let platform = DryRunPlatform::new();
        let window = platform.open_window(DryRunWindow::new(1, "w"));

        platform.refuse_state_changes(window);
        assert!(!platform.set_window_state(window, WindowCommand::Minimize).unwrap());

        platform.fail_window(window);
        assert!(platform.get_window_title(window).is_err());

        platform.fail_enumeration(true);
        assert!(platform.enumerate_top_level_windows().is_err());

        platform.close_window(window);
        assert!(matches!(
            platform.set_window_state(window, WindowCommand::Restore),
            Err(FsmError::Platform(_)) | Err(FsmError::WindowNotFound(_))
        ));
    }

    #[test]
    fn test_demo_desktop_has_monitor_and_windows() {
        let platform = DryRunPlatform::demo();
        assert!(platform.monitor_info(MonitorHandle::from_raw(0x10)).is_some());
        assert_eq!(platform.enumerate_top_level_windows().unwrap().len(), 3);
    }
}

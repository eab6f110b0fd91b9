use crate::error::Result;
use crate::events::{MonitorHandle, MonitorInfo, Rect, ShowState, WindowCommand, WindowHandle};
use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Классы окон оболочки, которые никогда не сворачиваются и не считаются полноэкранными
pub static SYSTEM_WINDOW_CLASSES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "Shell_TrayWnd",          // панель задач
        "Shell_SecondaryTrayWnd", // панель задач на втором мониторе
        "WorkerW",                // рабочий стол
        "Progman",                // Program Manager
        "DV2ControlHost",         // рабочий стол
        "ImmersiveLauncher",      // меню Пуск
        "SearchUI",               // поиск
    ]
    .into_iter()
    .collect()
});

/// Узкий интерфейс к оконной подсистеме ОС.
///
/// Все вызовы синхронные. Ошибка по одному окну не должна означать ошибку
/// всей операции: вызывающий код сам решает, пропустить окно или нет.
pub trait NativePlatform: Send + Sync {
    /// Окна верхнего уровня в Z-порядке, сверху вниз
    fn enumerate_top_level_windows(&self) -> Result<Vec<WindowHandle>>;

    fn is_window(&self, window: WindowHandle) -> bool;

    fn is_window_visible(&self, window: WindowHandle) -> bool;

    fn get_window_class(&self, window: WindowHandle) -> Result<String>;

    fn get_window_title(&self, window: WindowHandle) -> Result<String>;

    fn is_tool_window(&self, window: WindowHandle) -> Result<bool>;

    fn get_window_process_id(&self, window: WindowHandle) -> Result<u32>;

    /// Полный путь к исполняемому файлу процесса
    fn get_process_image_name(&self, process_id: u32) -> Result<String>;

    fn get_window_placement(&self, window: WindowHandle) -> Result<ShowState>;

    fn get_window_rect(&self, window: WindowHandle) -> Result<Rect>;

    /// Монитор, с которым окно пересекается больше всего
    fn monitor_from_window(&self, window: WindowHandle) -> Result<MonitorHandle>;

    fn get_monitor_info(&self, monitor: MonitorHandle) -> Result<MonitorInfo>;

    /// Запросить смену состояния. `Ok(true)` только если ОС подтвердила новое состояние.
    fn set_window_state(&self, window: WindowHandle, command: WindowCommand) -> Result<bool>;

    fn get_foreground_window(&self) -> Option<WindowHandle>;
}

/// Системное окно: оболочка, окно без заголовка или tool window
pub fn is_system_window(platform: &dyn NativePlatform, window: WindowHandle) -> Result<bool> {
    let class_name = platform.get_window_class(window)?;
    if SYSTEM_WINDOW_CLASSES.contains(class_name.as_str()) {
        return Ok(true);
    }

    if platform.get_window_title(window)?.trim().is_empty() {
        return Ok(true);
    }

    platform.is_tool_window(window)
}

/// Выбранная реализация платформы
pub struct PlatformBackend {
    pub platform: Arc<dyn NativePlatform>,
    /// Сценарий эмулированного рабочего стола; владелец останавливает его при выходе
    pub scenario: Option<JoinHandle<()>>,
}

/// Factory function to create the platform backend based on the dry_run flag
pub fn create_platform(dry_run: bool) -> Result<PlatformBackend> {
    if dry_run || !cfg!(windows) {
        if !dry_run {
            warn!("Нативная реализация доступна только для Windows, включён режим dry-run");
        }
        info!("Используется эмулированный рабочий стол (dry-run)");
        let platform = Arc::new(super::dry_run::DryRunPlatform::demo());
        let scenario = super::dry_run::spawn_demo_scenario(Arc::clone(&platform));
        return Ok(PlatformBackend {
            platform,
            scenario: Some(scenario),
        });
    }

    Ok(PlatformBackend {
        platform: create_native_platform()?,
        scenario: None,
    })
}

#[cfg(windows)]
fn create_native_platform() -> Result<Arc<dyn NativePlatform>> {
    info!("Используется Win32 API");
    Ok(Arc::new(super::win32::Win32Platform::new()))
}

#[cfg(not(windows))]
fn create_native_platform() -> Result<Arc<dyn NativePlatform>> {
    Err(crate::fsm_error!(platform, "нативная реализация доступна только для Windows"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{DryRunPlatform, DryRunWindow};

    #[test]
    fn test_is_system_window() {
        let platform = DryRunPlatform::new();
        platform.add_process(1, r"C:\Windows\explorer.exe");

        let taskbar = platform.open_window(DryRunWindow::new(1, "").with_class("Shell_TrayWnd"));
        let untitled = platform.open_window(DryRunWindow::new(1, "   "));
        let tool = platform.open_window(DryRunWindow::new(1, "Palette").tool_window());
        let normal = platform.open_window(DryRunWindow::new(1, "Documents"));

        assert!(is_system_window(&platform, taskbar).unwrap());
        assert!(is_system_window(&platform, untitled).unwrap());
        assert!(is_system_window(&platform, tool).unwrap());
        assert!(!is_system_window(&platform, normal).unwrap());
    }

    #[tokio::test]
    async fn test_create_platform_dry_run_serves_demo_desktop() {
        let backend = create_platform(true).unwrap();
        let windows = backend.platform.enumerate_top_level_windows().unwrap();
        assert!(windows.len() >= 3);
        assert!(backend.platform.get_monitor_info(MonitorHandle::from_raw(0x10)).is_ok());

        let scenario = backend.scenario.expect("dry-run запускает сценарий");
        assert!(!scenario.is_finished());
        scenario.abort();
        assert!(scenario.await.unwrap_err().is_cancelled());
    }

    #[test]
    fn test_is_system_window_propagates_missing_window() {
        let platform = DryRunPlatform::new();
        assert!(is_system_window(&platform, WindowHandle::from_raw(99)).is_err());
    }
}

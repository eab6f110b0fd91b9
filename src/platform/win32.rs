use crate::error::{FsmError, Result};
use crate::events::{MonitorHandle, MonitorInfo, Rect, ShowState, WindowCommand, WindowHandle};
use crate::fsm_error;
use std::ffi::c_void;
use tracing::debug;
use windows::core::PWSTR;
use windows::Win32::Foundation::{CloseHandle, BOOL, HWND, LPARAM, RECT, TRUE};
use windows::Win32::Graphics::Gdi::{
    GetMonitorInfoW, MonitorFromWindow, HMONITOR, MONITORINFO, MONITOR_DEFAULTTONEAREST,
};
use windows::Win32::System::Threading::{
    OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_WIN32, PROCESS_QUERY_LIMITED_INFORMATION,
};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetClassNameW, GetForegroundWindow, GetWindowLongW, GetWindowPlacement,
    GetWindowRect, GetWindowTextLengthW, GetWindowTextW, GetWindowThreadProcessId, IsIconic,
    IsWindow, IsWindowVisible, ShowWindow, GWL_EXSTYLE, SW_MINIMIZE, SW_RESTORE,
    SW_SHOWMAXIMIZED, SW_SHOWMINIMIZED, WINDOWPLACEMENT, WS_EX_TOOLWINDOW,
};

/// Максимальная длина пути к образу процесса
const MAX_PROCESS_PATH_LENGTH: usize = 1024;
/// Максимальная длина имени класса окна
const MAX_CLASS_NAME_LENGTH: usize = 256;

pub struct Win32Platform;

impl Win32Platform {
    pub fn new() -> Self {
        Self
    }
}

fn to_hwnd(window: WindowHandle) -> HWND {
    HWND(window.raw() as *mut c_void)
}

fn from_hwnd(hwnd: HWND) -> WindowHandle {
    WindowHandle::from_raw(hwnd.0 as isize)
}

fn from_rect(rect: RECT) -> Rect {
    Rect::new(rect.left, rect.top, rect.right, rect.bottom)
}

/// Callback для EnumWindows: собирает хэндлы в Vec, переданный через lparam
unsafe extern "system" fn collect_windows(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let handles = &mut *(lparam.0 as *mut Vec<WindowHandle>);
    handles.push(from_hwnd(hwnd));
    TRUE
}

impl super::r#trait::NativePlatform for Win32Platform {
    fn enumerate_top_level_windows(&self) -> Result<Vec<WindowHandle>> {
        let mut handles: Vec<WindowHandle> = Vec::new();

        unsafe {
            EnumWindows(
                Some(collect_windows),
                LPARAM(&mut handles as *mut Vec<WindowHandle> as isize),
            )
        }
        .map_err(|e| fsm_error!(platform, "EnumWindows: {}", e))?;

        debug!("EnumWindows вернул {} окон", handles.len());
        Ok(handles)
    }

    fn is_window(&self, window: WindowHandle) -> bool {
        unsafe { IsWindow(to_hwnd(window)) }.as_bool()
    }

    fn is_window_visible(&self, window: WindowHandle) -> bool {
        unsafe { IsWindowVisible(to_hwnd(window)) }.as_bool()
    }

    fn get_window_class(&self, window: WindowHandle) -> Result<String> {
        let mut buffer = [0u16; MAX_CLASS_NAME_LENGTH];
        let len = unsafe { GetClassNameW(to_hwnd(window), &mut buffer) };
        if len <= 0 {
            return FsmError::window_not_found(window);
        }
        Ok(String::from_utf16_lossy(&buffer[..len as usize]))
    }

    fn get_window_title(&self, window: WindowHandle) -> Result<String> {
        let hwnd = to_hwnd(window);
        let len = unsafe { GetWindowTextLengthW(hwnd) };
        if len <= 0 {
            return Ok(String::new());
        }

        let mut buffer = vec![0u16; len as usize + 1];
        let copied = unsafe { GetWindowTextW(hwnd, &mut buffer) };
        if copied <= 0 {
            return Ok(String::new());
        }
        Ok(String::from_utf16_lossy(&buffer[..copied as usize]))
    }

    fn is_tool_window(&self, window: WindowHandle) -> Result<bool> {
        let ex_style = unsafe { GetWindowLongW(to_hwnd(window), GWL_EXSTYLE) } as u32;
        Ok(ex_style & WS_EX_TOOLWINDOW.0 != 0)
    }

    fn get_window_process_id(&self, window: WindowHandle) -> Result<u32> {
        let mut process_id: u32 = 0;
        let thread_id = unsafe { GetWindowThreadProcessId(to_hwnd(window), Some(&mut process_id)) };
        if thread_id == 0 || process_id == 0 {
            return FsmError::window_not_found(window);
        }
        Ok(process_id)
    }

    fn get_process_image_name(&self, process_id: u32) -> Result<String> {
        let process = unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, process_id) }
            .map_err(|e| fsm_error!(platform, "OpenProcess({}): {}", process_id, e))?;

        let mut buffer = vec![0u16; MAX_PROCESS_PATH_LENGTH];
        let mut size = buffer.len() as u32;
        let result = unsafe {
            QueryFullProcessImageNameW(
                process,
                PROCESS_NAME_WIN32,
                PWSTR(buffer.as_mut_ptr()),
                &mut size,
            )
        };

        unsafe {
            let _ = CloseHandle(process);
        }

        result.map_err(|e| fsm_error!(platform, "QueryFullProcessImageNameW({}): {}", process_id, e))?;
        Ok(String::from_utf16_lossy(&buffer[..size as usize]))
    }

    fn get_window_placement(&self, window: WindowHandle) -> Result<ShowState> {
        let mut placement = WINDOWPLACEMENT {
            length: std::mem::size_of::<WINDOWPLACEMENT>() as u32,
            ..Default::default()
        };
        unsafe { GetWindowPlacement(to_hwnd(window), &mut placement) }
            .map_err(|e| fsm_error!(platform, "GetWindowPlacement({}): {}", window, e))?;

        let show_state = match placement.showCmd {
            cmd if cmd == SW_SHOWMAXIMIZED.0 as u32 => ShowState::Maximized,
            cmd if cmd == SW_SHOWMINIMIZED.0 as u32 => ShowState::Minimized,
            _ => ShowState::Normal,
        };
        Ok(show_state)
    }

    fn get_window_rect(&self, window: WindowHandle) -> Result<Rect> {
        let mut rect = RECT::default();
        unsafe { GetWindowRect(to_hwnd(window), &mut rect) }
            .map_err(|e| fsm_error!(platform, "GetWindowRect({}): {}", window, e))?;
        Ok(from_rect(rect))
    }

    fn monitor_from_window(&self, window: WindowHandle) -> Result<MonitorHandle> {
        let monitor = unsafe { MonitorFromWindow(to_hwnd(window), MONITOR_DEFAULTTONEAREST) };
        if monitor.is_invalid() {
            return Err(fsm_error!(platform, "MonitorFromWindow({}) вернул NULL", window));
        }
        Ok(MonitorHandle::from_raw(monitor.0 as isize))
    }

    fn get_monitor_info(&self, monitor: MonitorHandle) -> Result<MonitorInfo> {
        let mut info = MONITORINFO {
            cbSize: std::mem::size_of::<MONITORINFO>() as u32,
            ..Default::default()
        };
        let ok = unsafe { GetMonitorInfoW(HMONITOR(monitor.raw() as *mut c_void), &mut info) };
        if !ok.as_bool() {
            return Err(fsm_error!(platform, "GetMonitorInfoW({}) не удался", monitor));
        }

        Ok(MonitorInfo {
            bounds: from_rect(info.rcMonitor),
            work_area: from_rect(info.rcWork),
        })
    }

    fn set_window_state(&self, window: WindowHandle, command: WindowCommand) -> Result<bool> {
        let hwnd = to_hwnd(window);
        if !unsafe { IsWindow(hwnd) }.as_bool() {
            return FsmError::window_not_found(window);
        }

        // Возвращаемое значение ShowWindow - предыдущая видимость, а не успех,
        // поэтому результат проверяется по фактическому состоянию окна
        let confirmed = unsafe {
            match command {
                WindowCommand::Minimize => {
                    let _ = ShowWindow(hwnd, SW_MINIMIZE);
                    IsIconic(hwnd).as_bool()
                }
                WindowCommand::Restore => {
                    let _ = ShowWindow(hwnd, SW_RESTORE);
                    IsWindow(hwnd).as_bool() && !IsIconic(hwnd).as_bool()
                }
            }
        };
        Ok(confirmed)
    }

    fn get_foreground_window(&self) -> Option<WindowHandle> {
        let hwnd = unsafe { GetForegroundWindow() };
        if hwnd.is_invalid() {
            None
        } else {
            Some(from_hwnd(hwnd))
        }
    }
}

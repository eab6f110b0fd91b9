use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;
use std::time::Instant;

use super::window::{MonitorHandle, WindowHandle};

/// Данные события детектора: окно, монитор и владелец
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullScreenState {
    pub is_full_screen: bool,
    pub window: Option<WindowHandle>,
    pub monitor: Option<MonitorHandle>,
    pub process_name: String,
    pub window_title: String,
    pub timestamp: Instant,
}

impl FullScreenState {
    pub fn entered(
        window: WindowHandle,
        monitor: MonitorHandle,
        process_name: String,
        window_title: String,
    ) -> Self {
        Self {
            is_full_screen: true,
            window: Some(window),
            monitor: Some(monitor),
            process_name,
            window_title,
            timestamp: Instant::now(),
        }
    }

    pub fn exited() -> Self {
        Self {
            is_full_screen: false,
            window: None,
            monitor: None,
            process_name: String::new(),
            window_title: String::new(),
            timestamp: Instant::now(),
        }
    }
}

/// События, которые детектор передаёт координатору
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectorEvent {
    FullScreenStateChanged(FullScreenState),
    TargetProcessFocused(FullScreenState),
}

impl fmt::Display for DetectorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectorEvent::FullScreenStateChanged(state) if state.is_full_screen => write!(
                f,
                "FullScreenStateChanged(true): {} \"{}\"",
                state.process_name, state.window_title
            ),
            DetectorEvent::FullScreenStateChanged(_) => write!(f, "FullScreenStateChanged(false)"),
            DetectorEvent::TargetProcessFocused(state) => write!(
                f,
                "TargetProcessFocused: {} \"{}\"",
                state.process_name, state.window_title
            ),
        }
    }
}

/// Уведомления сервиса мониторинга для внешних потребителей
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum MonitorEvent {
    MonitoringStateChanged(bool),
    WindowsMinimized(usize),
    WindowsRestored(usize),
    ErrorOccurred(String),
}

impl fmt::Display for MonitorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorEvent::MonitoringStateChanged(true) => write!(f, "мониторинг запущен"),
            MonitorEvent::MonitoringStateChanged(false) => write!(f, "мониторинг остановлен"),
            MonitorEvent::WindowsMinimized(count) => write!(f, "свернуто окон: {}", count),
            MonitorEvent::WindowsRestored(count) => write!(f, "восстановлено окон: {}", count),
            MonitorEvent::ErrorOccurred(message) => write!(f, "ошибка: {}", message),
        }
    }
}

/// Статистика мониторинга
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitoringStats {
    pub is_monitoring: bool,
    pub last_check_time: Option<DateTime<Local>>,
    pub minimized_count: usize,
    pub target_process_count: usize,
    pub poll_interval_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detector_event_display() {
        let entered = DetectorEvent::FullScreenStateChanged(FullScreenState::entered(
            WindowHandle::from_raw(1),
            MonitorHandle::from_raw(2),
            "game".to_string(),
            "Game".to_string(),
        ));
        assert_eq!(entered.to_string(), "FullScreenStateChanged(true): game \"Game\"");

        let exited = DetectorEvent::FullScreenStateChanged(FullScreenState::exited());
        assert_eq!(exited.to_string(), "FullScreenStateChanged(false)");
    }

    #[test]
    fn test_exited_state_has_no_window() {
        let state = FullScreenState::exited();
        assert!(!state.is_full_screen);
        assert!(state.window.is_none());
        assert!(state.monitor.is_none());
    }
}

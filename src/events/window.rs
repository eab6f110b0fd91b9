use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Непрозрачный идентификатор окна ОС (HWND на Windows).
///
/// Не является стабильным ключом: ОС может переиспользовать значение после
/// уничтожения окна, поэтому хэндл действителен только в пределах снимка,
/// в котором был получен.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WindowHandle(isize);

impl WindowHandle {
    pub const fn from_raw(raw: isize) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> isize {
        self.0
    }

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:X}", self.0)
    }
}

/// Идентификатор монитора (HMONITOR на Windows)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MonitorHandle(isize);

impl MonitorHandle {
    pub const fn from_raw(raw: isize) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> isize {
        self.0
    }
}

impl fmt::Display for MonitorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "monitor#{:X}", self.0)
    }
}

/// Экранный прямоугольник в целых координатах (правый и нижний края не входят)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub const fn from_size(left: i32, top: i32, width: i32, height: i32) -> Self {
        Self::new(left, top, left + width, top + height)
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    /// Покрывает ли прямоугольник другой целиком. Совпадение краёв считается покрытием.
    pub fn covers(&self, other: &Rect) -> bool {
        self.left <= other.left
            && self.top <= other.top
            && self.right >= other.right
            && self.bottom >= other.bottom
    }

    /// Площадь пересечения, 0 если прямоугольники не пересекаются
    pub fn intersection_area(&self, other: &Rect) -> i64 {
        let width = self.right.min(other.right) - self.left.max(other.left);
        let height = self.bottom.min(other.bottom) - self.top.max(other.top);
        if width <= 0 || height <= 0 {
            0
        } else {
            i64::from(width) * i64::from(height)
        }
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {})-({}, {}) {}x{}",
            self.left,
            self.top,
            self.right,
            self.bottom,
            self.width(),
            self.height()
        )
    }
}

/// Состояние размещения окна (showCmd из WINDOWPLACEMENT)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShowState {
    Normal,
    Minimized,
    Maximized,
}

/// Запрос на смену состояния окна
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowCommand {
    Minimize,
    Restore,
}

/// Геометрия монитора
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorInfo {
    pub bounds: Rect,
    /// Часть монитора без панели задач и прочего зарезервированного ОС пространства
    pub work_area: Rect,
}

/// Снимок одного окна верхнего уровня.
///
/// Запись неизменяема: новый проход перечисления создаёт новые записи,
/// существующие никогда не дописываются.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowRecord {
    pub handle: WindowHandle,
    pub process_id: u32,
    pub process_name: String,
    pub title: String,
    pub show_state: ShowState,
    pub monitor: MonitorHandle,
    pub bounds: Rect,
    pub visible: bool,
    pub is_system_window: bool,
    pub captured_at: Instant,
}

impl WindowRecord {
    pub fn is_valid(&self) -> bool {
        !self.handle.is_null() && self.visible && !self.is_system_window
    }

    pub fn is_maximized(&self) -> bool {
        self.show_state == ShowState::Maximized
    }

    pub fn is_minimized(&self) -> bool {
        self.show_state == ShowState::Minimized
    }

    /// Окно развернуто и покрывает рабочую область монитора
    pub fn is_full_screen(&self, monitor: &MonitorInfo) -> bool {
        self.is_valid() && self.is_maximized() && self.bounds.covers(&monitor.work_area)
    }
}

impl fmt::Display for WindowRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} \"{}\" ({}, pid {})",
            self.handle, self.title, self.process_name, self.process_id
        )
    }
}

pub mod monitor;
pub mod window;

pub use monitor::{DetectorEvent, FullScreenState, MonitorEvent, MonitoringStats};
pub use window::{
    MonitorHandle, MonitorInfo, Rect, ShowState, WindowCommand, WindowHandle, WindowRecord,
};

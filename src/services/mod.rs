pub mod fullscreen_detector;
pub mod monitor_service;
pub mod notifier;
pub mod window_cache;
pub mod window_minimizer;

pub use fullscreen_detector::{DetectorEventHandler, FullScreenDetector};
pub use monitor_service::WindowMonitorService;
pub use notifier::{spawn_notification_pump, LogNotificationSink, NotificationSink};
pub use window_cache::{WindowSnapshot, WindowSnapshotCache};
pub use window_minimizer::WindowMinimizer;

//! Platform layer: responsibility and boundaries
//!
//! This module is the ONLY place that talks to the native window system.
//! Services receive an `Arc<dyn NativePlatform>` and never call OS functions
//! directly, which keeps the cache, detector and minimizer testable against
//! the dry-run desktop.

mod dry_run;
mod r#trait;
#[cfg(windows)]
mod win32;

pub use self::dry_run::{spawn_demo_scenario, DryRunPlatform, DryRunWindow};
pub use self::r#trait::{
    create_platform, is_system_window, NativePlatform, PlatformBackend, SYSTEM_WINDOW_CLASSES,
};

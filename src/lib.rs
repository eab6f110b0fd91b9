//! Сворачивание окон на мониторе, где развернуто полноэкранное приложение.
//!
//! Бинарник `fullscreen-monitor` только собирает конфигурацию и запускает
//! `WindowMonitorService`; команды сервиса доступны и как библиотека.

pub mod config;
pub mod error;
pub mod events;
pub mod platform;
pub mod services;
pub mod utils;

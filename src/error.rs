use thiserror::Error;

use crate::events::WindowHandle;

#[derive(Error, Debug)]
pub enum FsmError {
    #[error("Ошибка конфигурации: {0}")]
    Config(#[from] anyhow::Error),

    #[error("Недопустимые настройки: {0}")]
    Settings(String),

    #[error("Ошибка мониторинга: {0}")]
    Monitoring(String),

    #[error("Окно не найдено: {0}")]
    WindowNotFound(WindowHandle),

    #[error("Ошибка платформы: {0}")]
    Platform(String),

    #[error("Внутренняя ошибка: {0}")]
    Internal(String),
}

impl FsmError {
    /// Стабильный код ошибки для уведомлений
    pub fn code(&self) -> &'static str {
        match self {
            FsmError::Config(_) | FsmError::Settings(_) => "SETTINGS_ERROR",
            FsmError::Monitoring(_) => "MONITORING_ERROR",
            FsmError::WindowNotFound(_) => "WINDOW_OPERATION_ERROR",
            FsmError::Platform(_) => "PLATFORM_ERROR",
            FsmError::Internal(_) => "GENERAL_ERROR",
        }
    }

    pub fn window_not_found<T>(window: WindowHandle) -> Result<T> {
        Err(FsmError::WindowNotFound(window))
    }
}

pub type Result<T> = std::result::Result<T, FsmError>;

// Удобные макросы для создания ошибок
#[macro_export]
macro_rules! fsm_error {
    (settings, $($arg:tt)*) => {
        $crate::error::FsmError::Settings(format!($($arg)*))
    };
    (monitoring, $($arg:tt)*) => {
        $crate::error::FsmError::Monitoring(format!($($arg)*))
    };
    (platform, $($arg:tt)*) => {
        $crate::error::FsmError::Platform(format!($($arg)*))
    };
    (internal, $($arg:tt)*) => {
        $crate::error::FsmError::Internal(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(FsmError::Settings("x".into()).code(), "SETTINGS_ERROR");
        assert_eq!(FsmError::Monitoring("x".into()).code(), "MONITORING_ERROR");
        assert_eq!(
            FsmError::WindowNotFound(WindowHandle::from_raw(7)).code(),
            "WINDOW_OPERATION_ERROR"
        );
        assert_eq!(fsm_error!(platform, "EnumWindows: {}", 5).code(), "PLATFORM_ERROR");
        assert_eq!(fsm_error!(internal, "boom").code(), "GENERAL_ERROR");
    }

    #[test]
    fn test_window_not_found_helper() {
        let result: Result<()> = FsmError::window_not_found(WindowHandle::from_raw(42));
        assert!(matches!(result, Err(FsmError::WindowNotFound(h)) if h.raw() == 42));
    }
}

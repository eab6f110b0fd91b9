//! Нормализация и проверка имён процессов.
//!
//! Везде в программе имя процесса хранится в нижнем регистре и без
//! расширения: `C:\Games\Game.EXE` -> `game`.

/// Символы, недопустимые в имени процесса
const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*', '\\', '/'];

/// Максимальная длина имени процесса в настройках
pub const MAX_PROCESS_NAME_LENGTH: usize = 100;

/// Получить нормализованное имя процесса из полного пути к образу
pub fn from_image_path(path: &str) -> String {
    let file_name = path
        .rsplit(|c| c == '\\' || c == '/')
        .next()
        .unwrap_or(path);

    let stem = match file_name.rfind('.') {
        Some(index) if index > 0 => &file_name[..index],
        _ => file_name,
    };

    stem.trim().to_lowercase()
}

/// Нормализовать имя процесса, введённое пользователем
pub fn normalize(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    match lower.strip_suffix(".exe") {
        Some(stripped) if !stripped.is_empty() => stripped.to_string(),
        _ => lower,
    }
}

/// Проверить имя процесса, введённое пользователем
pub fn validate(name: &str) -> Result<(), String> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return Err("имя процесса не может быть пустым".to_string());
    }

    if trimmed.chars().count() > MAX_PROCESS_NAME_LENGTH {
        return Err(format!(
            "имя процесса '{}' длиннее {} символов",
            trimmed, MAX_PROCESS_NAME_LENGTH
        ));
    }

    if let Some(c) = trimmed.chars().find(|c| INVALID_CHARS.contains(c)) {
        return Err(format!(
            "имя процесса '{}' содержит недопустимый символ '{}'",
            trimmed, c
        ));
    }

    Ok(())
}

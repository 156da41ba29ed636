//! Модуль обработки ошибок библиотеки stash-subtitle-core
//!
//! Этот модуль содержит типы ошибок, которые могут возникнуть при загрузке
//! субтитров, поиске слов в словаре и воспроизведении произношения.

use thiserror::Error;

/// Ошибки библиотеки
#[derive(Debug, Error)]
pub enum SubtitleError {
    /// Ошибка разбора блока субтитров (обрабатывается внутри парсера)
    #[error("Subtitle parse error: {0}")]
    Parse(String),

    /// Сервер вернул HTML-страницу входа вместо субтитров
    #[error("Authentication required: received an HTML page instead of subtitle content")]
    AuthRequired,

    /// Сервер ответил статусом, отличным от 200
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Ошибка HTTP запроса
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Ошибка ввода-вывода
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Ошибка сериализации/десериализации JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Словарь не настроен или недоступен
    #[error("Dictionary unavailable: {0}")]
    LookupUnavailable(String),

    /// Ошибка поиска слова
    #[error("Dictionary lookup failed: {0}")]
    Lookup(String),

    /// Ошибка получения или воспроизведения произношения
    #[error("Pronunciation error: {0}")]
    Pronunciation(String),

    /// Индекс выбранного слова вне диапазона
    #[error("Invalid word selection: index {index:?} with {len} segments")]
    InvalidSelection { index: Option<usize>, len: usize },

    /// Ошибка конфигурации
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl SubtitleError {
    /// Является ли ошибка признаком отсутствующей авторизации
    pub fn is_auth_failure(&self) -> bool {
        match self {
            SubtitleError::AuthRequired => true,
            SubtitleError::Http { status, .. } => *status == 401 || *status == 403,
            _ => false,
        }
    }
}

/// Тип Result для библиотеки
pub type Result<T> = std::result::Result<T, SubtitleError>;

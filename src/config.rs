//! Модуль конфигурации библиотеки
//!
//! Этот модуль содержит настройки движка субтитров, HTTP-клиента и
//! пользовательские предпочтения, сохраняемые между сессиями.

use std::path::Path;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::error::Result;

/// Ширина окна автопаузы перед концом субтитра, в секундах
pub const AUTO_PAUSE_WINDOW_SECS: f64 = 0.2;

/// Ёмкость кэша словарных статей
pub const DICTIONARY_CACHE_CAPACITY: usize = 100;

/// Сколько символов контекста участвует в ключе кэша словаря
pub const DICTIONARY_CONTEXT_CHARS: usize = 50;

/// Заголовок, в котором Stash ожидает API ключ
pub const STASH_API_HEADER: &str = "ApiKey";

pub const MIN_FONT_SCALE: f32 = 0.5;
pub const MAX_FONT_SCALE: f32 = 3.0;

/// Настройки HTTP-клиента
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// API ключ сервера Stash
    pub api_key: Option<String>,
    /// Имя заголовка для API ключа
    pub api_key_header: String,
    /// Таймаут соединения в секундах
    pub connect_timeout_secs: u64,
    /// Таймаут чтения в секундах
    pub read_timeout_secs: u64,
    /// User-Agent для запросов
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_header: STASH_API_HEADER.to_string(),
            connect_timeout_secs: 5,
            read_timeout_secs: 10,
            user_agent: "StashApp/1.0".to_string(),
        }
    }
}

impl HttpConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    /// API ключ без пробелов, если он задан и не пустой
    pub fn trimmed_api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    /// Собрать reqwest клиент с таймаутами из конфигурации
    pub fn build_client(&self) -> Result<reqwest::Client> {
        let client = reqwest::Client::builder()
            .connect_timeout(self.connect_timeout())
            .timeout(self.connect_timeout() + self.read_timeout())
            .user_agent(self.user_agent.clone())
            .build()?;
        Ok(client)
    }
}

/// Конфигурация движка субтитров
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Ширина окна автопаузы перед концом субтитра
    pub auto_pause_window_secs: f64,
    /// Выделять знаки препинания как отдельные сегменты
    pub enable_punctuation: bool,
    /// Минимальная длина слова в символах
    pub min_word_length: usize,
    /// Ёмкость кэша словарных статей
    pub dictionary_cache_capacity: usize,
    /// Сколько символов контекста входит в ключ кэша словаря
    pub dictionary_context_chars: usize,
    /// Ёмкость кэша аудио произношений
    pub pronunciation_cache_capacity: usize,
    /// Файл для сохранения пользовательских предпочтений
    pub preferences_path: Option<String>,
    /// Настройки HTTP
    pub http: HttpConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            auto_pause_window_secs: AUTO_PAUSE_WINDOW_SECS,
            enable_punctuation: false,
            min_word_length: 1,
            dictionary_cache_capacity: DICTIONARY_CACHE_CAPACITY,
            dictionary_context_chars: DICTIONARY_CONTEXT_CHARS,
            pronunciation_cache_capacity: 100,
            preferences_path: None,
            http: HttpConfig::default(),
        }
    }
}

/// Пользовательские предпочтения отображения субтитров
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// Масштаб шрифта (0.5 - 3.0)
    pub font_scale: f32,
    /// Вертикальное смещение (-1.0 - 1.0)
    pub vertical_offset: f32,
    /// Автопауза в конце каждого субтитра
    pub auto_pause: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            font_scale: 1.0,
            vertical_offset: 0.0,
            auto_pause: false,
        }
    }
}

impl Preferences {
    /// Загрузить предпочтения из файла.
    ///
    /// Отсутствующий или повреждённый файл даёт значения по умолчанию.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                log::debug!("No preferences at {}: {}", path.display(), e);
                return Self::default();
            }
        };

        match serde_json::from_str::<Preferences>(&content) {
            Ok(prefs) => prefs.clamped(),
            Err(e) => {
                log::warn!("Failed to parse preferences {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Сохранить предпочтения в файл
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn clamped(mut self) -> Self {
        self.font_scale = self.font_scale.clamp(MIN_FONT_SCALE, MAX_FONT_SCALE);
        self.vertical_offset = self.vertical_offset.clamp(-1.0, 1.0);
        self
    }
}

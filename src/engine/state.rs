use serde::Serialize;
use crate::error::Result;
use crate::services::DictionaryEntry;
use crate::subtitle::{Language, SubtitleCue, WordSegment};

/// Состояние загрузки дорожки субтитров
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SubtitleLoadState {
    /// URL субтитров не задан
    NoSource,
    /// Идёт загрузка
    Loading,
    /// Субтитры загружены
    Ready { cue_count: usize },
    /// Файл загружен, но субтитров в нём нет
    Empty,
    /// Сервер требует авторизацию
    AuthRequired,
    /// Ошибка загрузки
    Failed(String),
}

impl SubtitleLoadState {
    /// Сообщение для пользователя; `None`, когда показывать нечего
    pub fn status_message(&self) -> Option<String> {
        match self {
            Self::NoSource => Some("No subtitle file found".to_string()),
            Self::Loading => Some("Loading subtitles...".to_string()),
            Self::Ready { .. } => None,
            Self::Empty => Some("Subtitle file contains no cues".to_string()),
            Self::AuthRequired => {
                Some("Authentication required: the server returned a login page instead of subtitles".to_string())
            }
            Self::Failed(reason) => Some(format!("Failed to load subtitles: {}", reason)),
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }
}

/// Результат фоновой задачи, применяемый владельцем движка
#[derive(Debug)]
pub enum EngineEvent {
    /// Загрузка субтитров завершилась
    SubtitlesLoaded {
        generation: u64,
        url: String,
        result: Result<Vec<SubtitleCue>>,
    },
    /// Получена словарная статья для выбранного слова
    DictionaryResolved {
        generation: u64,
        word: String,
        entry: DictionaryEntry,
    },
}

/// Снимок состояния движка
#[derive(Debug, Clone, Serialize)]
pub struct EngineState {
    pub subtitles: Vec<SubtitleCue>,
    pub current_cue: Option<SubtitleCue>,
    pub word_segments: Vec<WordSegment>,
    pub selected_word_index: Option<usize>,
    pub is_in_word_navigation_mode: bool,
    pub selected_word: Option<String>,
    pub dictionary_entry: Option<DictionaryEntry>,
    pub is_loading_dictionary: bool,
    pub auto_pause_enabled: bool,
    pub is_auto_paused: bool,
    pub auto_pause_triggered: bool,
    pub user_resumed_playback: bool,
    pub detected_language: Language,
    pub load_state: SubtitleLoadState,
    pub is_visible: bool,
}

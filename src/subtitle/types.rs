use serde::{Deserialize, Serialize};

/// Структура для представления одного субтитра
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleCue {
    /// Время начала в секундах (включительно)
    pub start_time: f64,
    /// Время окончания в секундах (включительно)
    pub end_time: f64,
    /// Текст субтитра
    pub text: String,
}

impl SubtitleCue {
    /// Создает новый субтитр
    pub fn new(start_time: f64, end_time: f64, text: impl Into<String>) -> Self {
        Self {
            start_time,
            end_time,
            text: text.into(),
        }
    }

    /// Содержит ли субтитр указанный момент времени
    pub fn contains(&self, time: f64) -> bool {
        time >= self.start_time && time <= self.end_time
    }

    /// Длительность субтитра в секундах
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// Слово внутри текста субтитра.
///
/// Смещения считаются в символах (Unicode scalar values) текста субтитра,
/// `end_index` не включается.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordSegment {
    pub word: String,
    pub start_index: usize,
    pub end_index: usize,
}

impl WordSegment {
    pub fn new(word: impl Into<String>, start_index: usize, end_index: usize) -> Self {
        Self {
            word: word.into(),
            start_index,
            end_index,
        }
    }
}

/// Формат файла субтитров
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubtitleFormat {
    /// WebVTT
    Vtt,
    /// SubRip
    Srt,
}

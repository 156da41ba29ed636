//! Модуль для разбиения текста субтитров на слова
//!
//! Стратегия разбиения зависит от письменности:
//! - латиница и прочие алфавиты: по границам слов;
//! - китайский и японский: посимвольно (упрощение, не лингвистический токенайзер);
//! - корейский: по пробелам.
//!
//! Определение языка является эвристикой по диапазонам Unicode. На коротком или
//! смешанном тексте она ошибается, и это ожидаемо.

use std::fmt;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use super::types::WordSegment;

lazy_static! {
    static ref WORD: Regex = Regex::new(r"\b\w+\b").unwrap();
    static ref LATIN_PUNCTUATION: Regex = Regex::new(r#"[.,;:!?'"()\[\]{}]"#).unwrap();
}

const CHINESE_PUNCTUATION: &[char] = &[
    '，', '。', '！', '？', '；', '：', '“', '”', '‘', '’', '（', '）', '【', '】', '《', '》',
];

const JAPANESE_PUNCTUATION: &[char] = &[
    '、', '。', '！', '？', '；', '：', '「', '」', '『', '』', '（', '）',
];

const FRENCH_ACCENTS: &str = "àáâãäåæçèéêëìíîïðñòóôõöøùúûüýþÿ";
const GERMAN_LETTERS: &str = "äöüß";
const SPANISH_MARKS: &str = "ñ¿¡";

/// Язык субтитров, определённый эвристикой
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    English,
    Chinese,
    Japanese,
    Korean,
    Russian,
    French,
    German,
    Spanish,
}

impl Default for Language {
    fn default() -> Self {
        Self::English
    }
}

impl Language {
    /// Языковой тег для словаря и сервиса произношения
    pub fn as_tag(&self) -> &'static str {
        match self {
            Self::English => "en",
            Self::Chinese => "zh",
            Self::Japanese => "ja",
            Self::Korean => "ko",
            Self::Russian => "ru",
            Self::French => "fr",
            Self::German => "de",
            Self::Spanish => "es",
        }
    }

    /// Разобрать языковой тег (`zh-CN`, `ja`, ...)
    pub fn from_tag(tag: &str) -> Option<Self> {
        let primary = tag.split(['-', '_']).next().unwrap_or("").to_lowercase();
        match primary.as_str() {
            "en" => Some(Self::English),
            "zh" => Some(Self::Chinese),
            "ja" => Some(Self::Japanese),
            "ko" => Some(Self::Korean),
            "ru" => Some(Self::Russian),
            "fr" => Some(Self::French),
            "de" => Some(Self::German),
            "es" => Some(Self::Spanish),
            _ => None,
        }
    }

    /// Определить язык по первому совпавшему диапазону символов
    pub fn detect(text: &str) -> Self {
        if text.chars().any(is_cjk_ideograph) {
            Self::Chinese
        } else if text.chars().any(is_kana) {
            Self::Japanese
        } else if text.chars().any(is_hangul) {
            Self::Korean
        } else if text.chars().any(is_cyrillic) {
            Self::Russian
        } else if contains_any_ignore_case(text, FRENCH_ACCENTS) {
            Self::French
        } else if contains_any_ignore_case(text, GERMAN_LETTERS) {
            Self::German
        } else if contains_any_ignore_case(text, SPANISH_MARKS) {
            Self::Spanish
        } else {
            Self::English
        }
    }

    /// Письменность, определяющая способ разбиения
    pub fn script(&self) -> Script {
        match self {
            Self::Chinese => Script::Han,
            Self::Japanese => Script::Japanese,
            Self::Korean => Script::Hangul,
            _ => Script::Latin,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

/// Семейство письменности для выбора стратегии разбиения
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Script {
    /// Латиница и все нераспознанные языки
    Latin,
    /// Китайские иероглифы
    Han,
    /// Иероглифы и кана
    Japanese,
    /// Хангыль
    Hangul,
}

impl Script {
    /// Письменность по языковому тегу; неизвестные теги дают `Latin`
    pub fn from_tag(tag: &str) -> Self {
        Language::from_tag(tag)
            .map(|language| language.script())
            .unwrap_or(Script::Latin)
    }
}

/// Разбиение текста субтитра на слова
#[derive(Debug, Clone)]
pub struct WordSegmenter {
    script: Script,
    enable_punctuation: bool,
    min_word_length: usize,
}

impl WordSegmenter {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            enable_punctuation: false,
            min_word_length: 1,
        }
    }

    pub fn for_language(language: Language) -> Self {
        Self::new(language.script())
    }

    /// Выделять знаки препинания в отдельные сегменты
    pub fn with_punctuation(mut self, enabled: bool) -> Self {
        self.enable_punctuation = enabled;
        self
    }

    pub fn with_min_word_length(mut self, min_word_length: usize) -> Self {
        self.min_word_length = min_word_length.max(1);
        self
    }

    pub fn script(&self) -> Script {
        self.script
    }

    /// Разбить текст на упорядоченные непересекающиеся сегменты
    pub fn segment(&self, text: &str) -> Vec<WordSegment> {
        match self.script {
            Script::Latin => self.segment_latin(text),
            Script::Han => self.segment_per_char(text, is_cjk_ideograph, CHINESE_PUNCTUATION),
            Script::Japanese => self.segment_per_char(
                text,
                |c| is_kana(c) || is_cjk_ideograph(c),
                JAPANESE_PUNCTUATION,
            ),
            Script::Hangul => self.segment_korean(text),
        }
    }

    fn segment_latin(&self, text: &str) -> Vec<WordSegment> {
        let offsets = CharOffsets::new(text);
        let mut segments: Vec<WordSegment> = WORD
            .find_iter(text)
            .filter(|m| m.as_str().chars().count() >= self.min_word_length)
            .map(|m| WordSegment::new(m.as_str(), offsets.char_index(m.start()), offsets.char_index(m.end())))
            .collect();

        if self.enable_punctuation {
            segments.extend(LATIN_PUNCTUATION.find_iter(text).map(|m| {
                WordSegment::new(m.as_str(), offsets.char_index(m.start()), offsets.char_index(m.end()))
            }));
            segments.sort_by_key(|segment| segment.start_index);
        }

        segments
    }

    fn segment_per_char(
        &self,
        text: &str,
        is_word_char: impl Fn(char) -> bool,
        punctuation: &[char],
    ) -> Vec<WordSegment> {
        text.chars()
            .enumerate()
            .filter(|(_, c)| !c.is_whitespace())
            .filter(|(_, c)| {
                if punctuation.contains(c) {
                    self.enable_punctuation
                } else {
                    is_word_char(*c)
                }
            })
            .map(|(index, c)| WordSegment::new(c.to_string(), index, index + 1))
            .collect()
    }

    fn segment_korean(&self, text: &str) -> Vec<WordSegment> {
        let offsets = CharOffsets::new(text);
        let mut segments = Vec::new();
        let mut cursor = 0usize;

        for token in text.split_whitespace() {
            // Поиск от последней позиции, чтобы повторы не находились в одном месте
            let Some(found) = text[cursor..].find(token) else {
                continue;
            };
            let start = cursor + found;
            let end = start + token.len();
            cursor = end;

            if token.chars().count() < self.min_word_length || !token.chars().any(is_hangul) {
                continue;
            }
            segments.push(WordSegment::new(token, offsets.char_index(start), offsets.char_index(end)));
        }

        segments
    }
}

impl Default for WordSegmenter {
    fn default() -> Self {
        Self::new(Script::Latin)
    }
}

/// Перевод байтовых смещений `str` в символьные
struct CharOffsets {
    byte_starts: Vec<usize>,
}

impl CharOffsets {
    fn new(text: &str) -> Self {
        Self {
            byte_starts: text.char_indices().map(|(i, _)| i).collect(),
        }
    }

    fn char_index(&self, byte_index: usize) -> usize {
        self.byte_starts.partition_point(|&start| start < byte_index)
    }
}

fn is_cjk_ideograph(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
}

fn is_kana(c: char) -> bool {
    ('\u{3040}'..='\u{309f}').contains(&c) || ('\u{30a0}'..='\u{30ff}').contains(&c)
}

fn is_hangul(c: char) -> bool {
    ('\u{ac00}'..='\u{d7af}').contains(&c)
}

fn is_cyrillic(c: char) -> bool {
    matches!(c, 'а'..='я' | 'А'..='Я' | 'ё' | 'Ё')
}

fn contains_any_ignore_case(text: &str, set: &str) -> bool {
    text.chars()
        .flat_map(char::to_lowercase)
        .any(|c| set.contains(c))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(segments: &[WordSegment]) -> Vec<(&str, usize, usize)> {
        segments
            .iter()
            .map(|s| (s.word.as_str(), s.start_index, s.end_index))
            .collect()
    }

    #[test]
    fn test_latin_excludes_punctuation() {
        let segments = WordSegmenter::default().segment("Hello, world!");
        assert_eq!(words(&segments), vec![("Hello", 0, 5), ("world", 7, 12)]);
    }

    #[test]
    fn test_latin_with_punctuation() {
        let segments = WordSegmenter::default().with_punctuation(true).segment("Hi, you!");
        assert_eq!(
            words(&segments),
            vec![("Hi", 0, 2), (",", 2, 3), ("you", 4, 7), ("!", 7, 8)]
        );
    }

    #[test]
    fn test_latin_offsets_are_char_based() {
        let segments = WordSegmenter::for_language(Language::French).segment("Ça va, café?");
        assert_eq!(words(&segments), vec![("Ça", 0, 2), ("va", 3, 5), ("café", 7, 11)]);
    }

    #[test]
    fn test_min_word_length() {
        let segments = WordSegmenter::default().with_min_word_length(3).segment("I am here");
        assert_eq!(words(&segments), vec![("here", 5, 9)]);
    }

    #[test]
    fn test_chinese_per_character() {
        let segments = WordSegmenter::for_language(Language::Chinese).segment("你好世界");
        assert_eq!(
            words(&segments),
            vec![("你", 0, 1), ("好", 1, 2), ("世", 2, 3), ("界", 3, 4)]
        );
    }

    #[test]
    fn test_chinese_punctuation_and_latin_are_skipped() {
        let segmenter = WordSegmenter::for_language(Language::Chinese);
        assert_eq!(words(&segmenter.segment("你好，OK 世界。")), vec![
            ("你", 0, 1),
            ("好", 1, 2),
            ("世", 6, 7),
            ("界", 7, 8),
        ]);

        let with_punct = segmenter.with_punctuation(true).segment("好。");
        assert_eq!(words(&with_punct), vec![("好", 0, 1), ("。", 1, 2)]);
    }

    #[test]
    fn test_japanese_kana_and_kanji() {
        let segments = WordSegmenter::for_language(Language::Japanese).segment("猫 が、カ");
        assert_eq!(words(&segments), vec![("猫", 0, 1), ("が", 2, 3), ("カ", 4, 5)]);
    }

    #[test]
    fn test_korean_space_based_with_repeats() {
        let segments = WordSegmenter::for_language(Language::Korean).segment("안녕 hello 안녕  세계");
        assert_eq!(
            words(&segments),
            vec![("안녕", 0, 2), ("안녕", 9, 11), ("세계", 13, 15)]
        );
    }

    #[test]
    fn test_detect_language() {
        assert_eq!(Language::detect("你好"), Language::Chinese);
        assert_eq!(Language::detect("ひらがな"), Language::Japanese);
        assert_eq!(Language::detect("안녕하세요"), Language::Korean);
        assert_eq!(Language::detect("Привет"), Language::Russian);
        assert_eq!(Language::detect("Ça va"), Language::French);
        assert_eq!(Language::detect("Straße"), Language::German);
        assert_eq!(Language::detect("¡Hola!"), Language::Spanish);
        assert_eq!(Language::detect("Hello world"), Language::English);
        assert_eq!(Language::detect(""), Language::English);
    }

    #[test]
    fn test_tags() {
        assert_eq!(Language::from_tag("zh-CN"), Some(Language::Chinese));
        assert_eq!(Language::from_tag("zh_TW"), Some(Language::Chinese));
        assert_eq!(Language::from_tag("xx"), None);
        assert_eq!(Script::from_tag("ja"), Script::Japanese);
        assert_eq!(Script::from_tag("pt-BR"), Script::Latin);
        assert_eq!(Language::Korean.to_string(), "ko");
    }
}

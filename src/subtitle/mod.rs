//! Модуль для работы с субтитрами
//!
//! Разбор VTT/SRT, поиск субтитра по времени и разбиение текста на слова.

pub mod types;
pub mod parser;
pub mod cue_index;
pub mod segmenter;
pub mod source;

pub use types::{SubtitleCue, SubtitleFormat, WordSegment};
pub use segmenter::{Language, Script, WordSegmenter};

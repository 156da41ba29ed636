//! Ядро субтитров для клиента Stash
//!
//! Библиотека разбирает субтитры WebVTT и SubRip, находит субтитр для текущего
//! момента воспроизведения, разбивает его текст на слова и ведёт состояние
//! навигации по словам и автопаузы. Словарь, произношение и избранное
//! подключаются к движку как внешние сервисы.

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod services;
pub mod subtitle;
pub mod utils;

pub use config::{EngineConfig, HttpConfig, Preferences};
pub use engine::{EngineEvent, EngineState, SubtitleEngine, SubtitleLoadState};
pub use error::{Result, SubtitleError};
pub use subtitle::parser::{parse_subtitle_file, parse_subtitles};
pub use subtitle::{Language, SubtitleCue, SubtitleFormat, WordSegment, WordSegmenter};
pub use utils::init_logger;

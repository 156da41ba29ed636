//! Внешние сервисы движка субтитров
//!
//! Словарь, произношение и избранное. Движок получает их явно при создании.

pub mod dictionary;
pub mod favorites;
pub mod pronunciation;

pub use dictionary::{DictionaryBackend, DictionaryDefinition, DictionaryEntry, DictionaryService};
pub use favorites::{FavoriteWord, FavoritesStore, JsonFavoritesStore};
pub use pronunciation::{AudioClip, BackendPronunciation, PronunciationService};

//! Модуль избранных слов
//!
//! Избранное хранится в JSON файле (или только в памяти, если путь не задан).
//! Идентичность записи: пара (слово, язык) с учётом регистра.

use std::path::{Path, PathBuf};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use crate::error::Result;

/// Избранное слово
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FavoriteWord {
    pub word: String,
    pub language: String,
}

impl FavoriteWord {
    pub fn new(word: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            word: word.into(),
            language: language.into(),
        }
    }

    fn matches(&self, word: &str, language: &str) -> bool {
        self.word == word && self.language == language
    }
}

/// Хранилище избранных слов
pub trait FavoritesStore: Send + Sync {
    fn is_favorite(&self, word: &str, language: &str) -> bool;

    /// Добавить слово. `false`, если оно уже было в избранном.
    fn add(&self, word: &str, language: &str) -> Result<bool>;

    /// Удалить слово. `false`, если его не было.
    fn remove(&self, word: &str, language: &str) -> Result<bool>;

    /// Текущий список избранного
    fn list(&self) -> Vec<FavoriteWord>;

    /// Подписка на изменения списка
    fn observe_all(&self) -> watch::Receiver<Vec<FavoriteWord>>;
}

/// Хранилище избранного в JSON файле
pub struct JsonFavoritesStore {
    path: Option<PathBuf>,
    state: watch::Sender<Vec<FavoriteWord>>,
    // Один писатель за раз: чтение-изменение-запись
    write_lock: Mutex<()>,
}

impl JsonFavoritesStore {
    /// Хранилище только в памяти
    pub fn in_memory() -> Self {
        Self::with_initial(None, Vec::new())
    }

    /// Открыть хранилище в файле. Повреждённый файл даёт пустой список.
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let initial = load_favorites(&path);
        log::info!("Loaded {} favorite words from {}", initial.len(), path.display());
        Self::with_initial(Some(path), initial)
    }

    fn with_initial(path: Option<PathBuf>, initial: Vec<FavoriteWord>) -> Self {
        let (state, _) = watch::channel(initial);
        Self {
            path,
            state,
            write_lock: Mutex::new(()),
        }
    }

    fn commit(&self, updated: Vec<FavoriteWord>) -> Result<()> {
        if let Some(path) = &self.path {
            save_favorites(path, &updated)?;
        }
        self.state.send_replace(updated);
        Ok(())
    }
}

impl FavoritesStore for JsonFavoritesStore {
    fn is_favorite(&self, word: &str, language: &str) -> bool {
        self.state.borrow().iter().any(|f| f.matches(word, language))
    }

    fn add(&self, word: &str, language: &str) -> Result<bool> {
        let _guard = self.write_lock.lock();
        let mut current = self.state.borrow().clone();
        if current.iter().any(|f| f.matches(word, language)) {
            return Ok(false);
        }

        current.push(FavoriteWord::new(word, language));
        self.commit(current)?;
        log::debug!("Added favorite '{}' ({})", word, language);
        Ok(true)
    }

    fn remove(&self, word: &str, language: &str) -> Result<bool> {
        let _guard = self.write_lock.lock();
        let mut current = self.state.borrow().clone();
        let before = current.len();
        current.retain(|f| !f.matches(word, language));
        if current.len() == before {
            return Ok(false);
        }

        self.commit(current)?;
        log::debug!("Removed favorite '{}' ({})", word, language);
        Ok(true)
    }

    fn list(&self) -> Vec<FavoriteWord> {
        self.state.borrow().clone()
    }

    fn observe_all(&self) -> watch::Receiver<Vec<FavoriteWord>> {
        self.state.subscribe()
    }
}

fn load_favorites(path: &Path) -> Vec<FavoriteWord> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            log::error!("Failed to read favorites {}: {}", path.display(), e);
            return Vec::new();
        }
    };

    serde_json::from_str(&content).unwrap_or_else(|e| {
        log::error!("Failed to parse favorites {}: {}", path.display(), e);
        Vec::new()
    })
}

fn save_favorites(path: &Path, favorites: &[FavoriteWord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, serde_json::to_string(favorites)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_remove_in_memory() {
        let store = JsonFavoritesStore::in_memory();
        assert!(store.add("Hello", "en").unwrap());
        assert!(!store.add("Hello", "en").unwrap());
        assert!(store.add("Hello", "fr").unwrap());

        assert!(store.is_favorite("Hello", "en"));
        // Регистр имеет значение
        assert!(!store.is_favorite("hello", "en"));

        assert!(store.remove("Hello", "en").unwrap());
        assert!(!store.remove("Hello", "en").unwrap());
        assert_eq!(store.list(), vec![FavoriteWord::new("Hello", "fr")]);
    }

    #[test]
    fn test_persists_to_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("favorites.json");

        let store = JsonFavoritesStore::open(&path);
        assert!(store.list().is_empty());
        store.add("猫", "ja").unwrap();
        store.add("word", "en").unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"language\":\"ja\""));

        let reopened = JsonFavoritesStore::open(&path);
        assert_eq!(
            reopened.list(),
            vec![FavoriteWord::new("猫", "ja"), FavoriteWord::new("word", "en")]
        );
    }

    #[test]
    fn test_corrupted_file_gives_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("favorites.json");
        std::fs::write(&path, "{broken").unwrap();
        assert!(JsonFavoritesStore::open(&path).list().is_empty());
    }

    #[tokio::test]
    async fn test_observe_all_sees_changes() {
        let store = JsonFavoritesStore::in_memory();
        let mut rx = store.observe_all();
        assert!(rx.borrow().is_empty());

        store.add("live", "en").unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().as_slice(), &[FavoriteWord::new("live", "en")]);
    }
}

//! Движок синхронизации субтитров
//!
//! Владеет состоянием, которое меняется по ходу воспроизведения: текущий
//! субтитр, слова текущего субтитра, выбранное слово, режим навигации по
//! словам и автопауза. Все изменения состояния выполняются через `&mut self`
//! у владельца движка. Фоновые задачи (загрузка субтитров, поиск в словаре)
//! только вычисляют результат и присылают его событием [`EngineEvent`],
//! которое владелец применяет через [`SubtitleEngine::process_pending_events`]
//! или [`SubtitleEngine::next_event`].

mod auto_pause;
mod state;

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};

use crate::config::{EngineConfig, Preferences};
use crate::error::{Result, SubtitleError};
use crate::services::dictionary::GraphQlDictionaryBackend;
use crate::services::{
    DictionaryBackend, DictionaryEntry, DictionaryService, FavoriteWord, FavoritesStore,
    JsonFavoritesStore, PronunciationService,
};
use crate::subtitle::cue_index::{active_cue, cue_index_near};
use crate::subtitle::parser::parse_subtitles;
use crate::subtitle::source::{HttpSubtitleSource, SubtitleSource};
use crate::subtitle::{Language, SubtitleCue, WordSegment, WordSegmenter};

pub use auto_pause::AutoPause;
pub use state::{EngineEvent, EngineState, SubtitleLoadState};

/// Движок субтитров
pub struct SubtitleEngine {
    config: EngineConfig,
    preferences: Preferences,

    // Субтитры
    subtitles: Vec<SubtitleCue>,
    current_url: Option<String>,
    subtitle_cache: HashMap<String, Vec<SubtitleCue>>,
    load_state: SubtitleLoadState,
    load_generation: u64,

    // Текущий субтитр и слова
    current_cue: Option<SubtitleCue>,
    word_segments: Vec<WordSegment>,
    detected_language: Language,
    selected_word_index: Option<usize>,
    navigation_mode: bool,

    // Выбранное слово и словарь
    selected_word: Option<String>,
    dictionary_entry: Option<DictionaryEntry>,
    loading_dictionary: bool,
    selection_generation: u64,

    auto_pause_enabled: bool,
    auto_pause: AutoPause,
    visible: bool,

    // Сервисы
    source: Option<Arc<dyn SubtitleSource>>,
    dictionary: Arc<DictionaryService>,
    pronunciation: Option<Arc<dyn PronunciationService>>,
    favorites: Arc<dyn FavoritesStore>,

    events_tx: mpsc::UnboundedSender<EngineEvent>,
    events_rx: mpsc::UnboundedReceiver<EngineEvent>,
}

impl SubtitleEngine {
    /// Создать движок без внешних сервисов.
    ///
    /// Если в конфигурации указан `preferences_path`, предпочтения загружаются
    /// из него. Источник субтитров, словарь и произношение подключаются
    /// через `with_*`.
    pub fn new(config: EngineConfig) -> Self {
        let preferences = match &config.preferences_path {
            Some(path) => Preferences::load(path),
            None => Preferences::default(),
        };
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Self {
            dictionary: Arc::new(DictionaryService::new(None, &config)),
            auto_pause: AutoPause::new(config.auto_pause_window_secs),
            auto_pause_enabled: preferences.auto_pause,
            preferences,
            config,
            subtitles: Vec::new(),
            current_url: None,
            subtitle_cache: HashMap::new(),
            load_state: SubtitleLoadState::NoSource,
            load_generation: 0,
            current_cue: None,
            word_segments: Vec::new(),
            detected_language: Language::default(),
            selected_word_index: None,
            navigation_mode: false,
            selected_word: None,
            dictionary_entry: None,
            loading_dictionary: false,
            selection_generation: 0,
            visible: true,
            source: None,
            pronunciation: None,
            favorites: Arc::new(JsonFavoritesStore::in_memory()),
            events_tx,
            events_rx,
        }
    }

    /// Создать движок, подключённый к серверу Stash: субтитры по HTTP,
    /// словарь через GraphQL и избранное в JSON файле (или в памяти).
    pub fn for_server<P: AsRef<Path>>(
        server_url: &str,
        config: EngineConfig,
        favorites_path: Option<P>,
    ) -> Result<Self> {
        if server_url.trim().is_empty() {
            return Err(SubtitleError::Configuration("server URL is empty".to_string()));
        }

        let source = HttpSubtitleSource::new(&config.http)?;
        let backend = GraphQlDictionaryBackend::new(server_url, &config.http)?;
        let favorites: Arc<dyn FavoritesStore> = match favorites_path {
            Some(path) => Arc::new(JsonFavoritesStore::open(path)),
            None => Arc::new(JsonFavoritesStore::in_memory()),
        };

        log::info!("Subtitle engine configured for server {}", server_url);

        Ok(Self::new(config)
            .with_subtitle_source(Arc::new(source))
            .with_dictionary_backend(Arc::new(backend))
            .with_favorites(favorites))
    }

    pub fn with_subtitle_source(mut self, source: Arc<dyn SubtitleSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Подключить бэкенд словаря. Кэш словаря при этом начинается заново.
    pub fn with_dictionary_backend(mut self, backend: Arc<dyn DictionaryBackend>) -> Self {
        self.dictionary = Arc::new(DictionaryService::new(Some(backend), &self.config));
        self
    }

    pub fn with_pronunciation(mut self, pronunciation: Arc<dyn PronunciationService>) -> Self {
        self.pronunciation = Some(pronunciation);
        self
    }

    pub fn with_favorites(mut self, favorites: Arc<dyn FavoritesStore>) -> Self {
        self.favorites = favorites;
        self
    }

    // ---------------------------------------------------------------------
    // Загрузка субтитров
    // ---------------------------------------------------------------------

    /// Загрузить субтитры по URL.
    ///
    /// `None` или пустой URL переводит движок в состояние `NoSource`.
    /// Уже загруженный в этой сессии URL берётся из кэша сразу, иначе
    /// загрузка идёт в фоне и завершается событием `SubtitlesLoaded`.
    /// Повторный вызов для URL, который ещё загружается, ничего не делает.
    pub fn load_subtitles(&mut self, url: Option<&str>) {
        let url = url.map(str::trim).filter(|u| !u.is_empty());
        if url.is_some() && url == self.current_url.as_deref() && self.load_state.is_loading() {
            log::debug!("Subtitles from {:?} are already loading", url);
            return;
        }

        // Результаты всех начатых ранее загрузок становятся устаревшими
        self.load_generation += 1;

        let url = match url {
            Some(url) => url.to_string(),
            None => {
                log::info!("No subtitle URL provided");
                self.current_url = None;
                self.install_cues(Vec::new());
                self.load_state = SubtitleLoadState::NoSource;
                return;
            }
        };

        self.current_url = Some(url.clone());

        if let Some(cues) = self.subtitle_cache.get(&url).cloned() {
            log::info!("Using cached subtitles for {} ({} cues)", url, cues.len());
            self.install_cues(cues);
            return;
        }

        let Some(source) = self.source.clone() else {
            log::error!("Cannot load subtitles from {}: no subtitle source configured", url);
            self.install_cues(Vec::new());
            self.load_state = SubtitleLoadState::Failed("no subtitle source configured".to_string());
            return;
        };

        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("Cannot load subtitles from {}: {}", url, e);
                self.install_cues(Vec::new());
                self.load_state = SubtitleLoadState::Failed("no async runtime available".to_string());
                return;
            }
        };

        log::info!("Loading subtitles from {}", url);
        self.install_cues(Vec::new());
        self.load_state = SubtitleLoadState::Loading;

        let generation = self.load_generation;
        let token = self.config.http.trimmed_api_key().map(str::to_string);
        let tx = self.events_tx.clone();
        handle.spawn(async move {
            let result = source
                .fetch(&url, token.as_deref())
                .await
                .map(|content| parse_subtitles(&content, Some(&url)));
            // Получатель живёт столько же, сколько движок
            let _ = tx.send(EngineEvent::SubtitlesLoaded { generation, url, result });
        });
    }

    /// Установить субтитры из уже полученного текста. Возвращает число субтитров.
    pub fn load_subtitles_from_content(&mut self, content: &str, url_hint: Option<&str>) -> usize {
        let cues = parse_subtitles(content, url_hint);
        let count = cues.len();

        self.load_generation += 1;
        self.current_url = url_hint.map(str::to_string);
        if let Some(url) = url_hint {
            self.subtitle_cache.insert(url.to_string(), cues.clone());
        }
        self.install_cues(cues);

        log::info!("Loaded {} subtitle cues from content", count);
        count
    }

    fn finish_load(&mut self, generation: u64, url: String, result: Result<Vec<SubtitleCue>>) {
        if generation != self.load_generation {
            log::debug!("Discarding stale subtitle load for {}", url);
            return;
        }

        match result {
            Ok(cues) => {
                log::info!("Loaded {} subtitle cues from {}", cues.len(), url);
                self.subtitle_cache.insert(url, cues.clone());
                self.install_cues(cues);
            }
            Err(e) if e.is_auth_failure() => {
                log::error!("Subtitle load from {} requires authentication: {}", url, e);
                self.load_state = SubtitleLoadState::AuthRequired;
            }
            Err(e) => {
                log::error!("Failed to load subtitles from {}: {}", url, e);
                self.load_state = SubtitleLoadState::Failed(e.to_string());
            }
        }
    }

    fn install_cues(&mut self, cues: Vec<SubtitleCue>) {
        self.load_state = if cues.is_empty() {
            SubtitleLoadState::Empty
        } else {
            SubtitleLoadState::Ready { cue_count: cues.len() }
        };
        self.subtitles = cues;
        self.current_cue = None;
        self.word_segments.clear();
        self.selected_word_index = None;
        self.navigation_mode = false;
        self.auto_pause.reset();

        // Выбор слова относится к прежней дорожке
        self.selection_generation += 1;
        self.selected_word = None;
        self.dictionary_entry = None;
        self.loading_dictionary = false;
    }

    // ---------------------------------------------------------------------
    // Воспроизведение и автопауза
    // ---------------------------------------------------------------------

    /// Обновить время воспроизведения. Вызывается на каждом тике плеера.
    pub fn update_playback_time(&mut self, time: f64) {
        let cue = active_cue(&self.subtitles, time);
        if cue == self.current_cue.as_ref() {
            return;
        }

        let cue = cue.cloned();
        self.auto_pause.reset();
        self.selected_word_index = None;

        match &cue {
            Some(cue) => {
                log::debug!("Active cue changed at {:.3}s: {:?}", time, cue.text);
                let language = Language::detect(&cue.text);
                if language != self.detected_language {
                    log::debug!("Detected language changed: {} -> {}", self.detected_language, language);
                    self.detected_language = language;
                }
                self.word_segments = self.segmenter().segment(&cue.text);
            }
            None => {
                log::debug!("No active cue at {:.3}s", time);
                self.word_segments.clear();
            }
        }

        self.current_cue = cue;
    }

    fn segmenter(&self) -> WordSegmenter {
        WordSegmenter::for_language(self.detected_language)
            .with_punctuation(self.config.enable_punctuation)
            .with_min_word_length(self.config.min_word_length)
    }

    /// Проверить, нужно ли поставить плеер на паузу.
    ///
    /// Работает при включённой автопаузе или в режиме навигации по словам.
    /// Возвращает `true` не больше одного раза на субтитр; вызывающий код
    /// должен поставить плеер на паузу.
    pub fn check_auto_pause(&mut self, time: f64) -> bool {
        let enabled = self.auto_pause_enabled || self.navigation_mode;
        self.auto_pause.check(enabled, self.current_cue.as_ref(), time)
    }

    /// Пользователь сам продолжил воспроизведение
    pub fn notify_user_resumed(&mut self) {
        self.auto_pause.notify_user_resumed();
    }

    /// Снова разрешить автопаузу для текущего субтитра (повтор субтитра)
    pub fn reset_auto_pause_for_replay(&mut self) {
        self.auto_pause.reset();
    }

    /// Переключить автопаузу. Возвращает новое значение.
    pub fn toggle_auto_pause(&mut self) -> bool {
        let enabled = !self.auto_pause_enabled;
        self.set_auto_pause_enabled(enabled);
        enabled
    }

    pub fn set_auto_pause_enabled(&mut self, enabled: bool) {
        self.auto_pause_enabled = enabled;
        if !enabled {
            self.auto_pause.clear_paused();
        }
        self.preferences.auto_pause = enabled;
        self.persist_preferences();
    }

    // ---------------------------------------------------------------------
    // Навигация по словам
    // ---------------------------------------------------------------------

    /// Войти в режим навигации. `false`, если в субтитре нет слов.
    pub fn enter_word_navigation_mode(&mut self) -> bool {
        if self.word_segments.is_empty() {
            return false;
        }
        self.navigation_mode = true;
        self.selected_word_index = Some(0);
        true
    }

    /// Выйти из режима навигации. Выбранное слово и словарь не сбрасываются.
    pub fn exit_word_navigation_mode(&mut self) {
        self.navigation_mode = false;
        self.selected_word_index = None;
    }

    /// Следующее слово, после последнего идёт первое
    pub fn navigate_next_word(&mut self) {
        let len = self.word_segments.len();
        if len == 0 {
            return;
        }
        let next = match self.selected_word_index {
            Some(index) if index < len => (index + 1) % len,
            _ => 0,
        };
        self.navigation_mode = true;
        self.selected_word_index = Some(next);
        log::debug!("Navigated to word {} of {}", next, len);
    }

    /// Предыдущее слово, перед первым идёт последнее
    pub fn navigate_previous_word(&mut self) {
        let len = self.word_segments.len();
        if len == 0 {
            return;
        }
        let previous = match self.selected_word_index {
            Some(index) if index > 0 && index < len => index - 1,
            _ => len - 1,
        };
        self.navigation_mode = true;
        self.selected_word_index = Some(previous);
        log::debug!("Navigated to word {} of {}", previous, len);
    }

    /// Слово под текущим индексом навигации
    pub fn selected_segment(&self) -> Result<&WordSegment> {
        self.selected_word_index
            .and_then(|index| self.word_segments.get(index))
            .ok_or(SubtitleError::InvalidSelection {
                index: self.selected_word_index,
                len: self.word_segments.len(),
            })
    }

    /// Выбрать слово под индексом навигации. `false`, если индекс невалиден.
    pub fn select_current_word(&mut self) -> bool {
        let word = match self.selected_segment() {
            Ok(segment) => segment.word.clone(),
            Err(e) => {
                log::warn!("Cannot select current word: {}", e);
                return false;
            }
        };
        self.select_word(Some(&word));
        true
    }

    /// Выбрать слово (или снять выбор при `None`).
    ///
    /// Выбор виден сразу; словарная статья и аудио загружаются в фоне,
    /// пока `is_loading_dictionary()` возвращает `true`. Результат для
    /// слова, выбор которого уже сменился, отбрасывается.
    pub fn select_word(&mut self, word: Option<&str>) {
        self.selection_generation += 1;
        self.dictionary_entry = None;

        let Some(word) = word else {
            self.selected_word = None;
            self.loading_dictionary = false;
            return;
        };

        let word = word.to_string();
        let language = self.detected_language.as_tag().to_string();
        self.selected_word = Some(word.clone());

        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                log::warn!("Cannot lookup '{}' without an async runtime: {}", word, e);
                self.dictionary_entry = Some(DictionaryEntry::placeholder(&word, &language, "service unavailable"));
                self.loading_dictionary = false;
                return;
            }
        };

        self.loading_dictionary = true;
        log::debug!("Selected word '{}' ({})", word, language);

        let generation = self.selection_generation;
        let context = self.current_cue.as_ref().map(|cue| cue.text.clone()).unwrap_or_default();
        let dictionary = Arc::clone(&self.dictionary);
        let pronunciation = self.pronunciation.clone();
        let tx = self.events_tx.clone();

        handle.spawn(async move {
            let preload = async {
                if let Some(pronunciation) = &pronunciation {
                    if let Err(e) = pronunciation.preload(&word, &language).await {
                        log::warn!("Failed to preload pronunciation for '{}': {}", word, e);
                    }
                }
            };
            let lookup = async {
                let entry = dictionary.lookup(&word, &language, &context).await;
                let _ = tx.send(EngineEvent::DictionaryResolved {
                    generation,
                    word: word.clone(),
                    entry,
                });
            };
            futures::future::join(preload, lookup).await;
        });
    }

    fn finish_lookup(&mut self, generation: u64, word: String, entry: DictionaryEntry) {
        if generation != self.selection_generation {
            log::debug!("Discarding stale dictionary result for '{}'", word);
            return;
        }
        self.dictionary_entry = Some(entry);
        self.loading_dictionary = false;
    }

    // ---------------------------------------------------------------------
    // Перемотка
    // ---------------------------------------------------------------------

    /// Начало предыдущего субтитра; `None` на первом субтитре
    pub fn seek_to_previous_cue(&self, time: f64) -> Option<f64> {
        let index = cue_index_near(&self.subtitles, time)?;
        let previous = index.checked_sub(1)?;
        self.subtitles.get(previous).map(|cue| cue.start_time)
    }

    /// Начало следующего субтитра; `None` на последнем субтитре
    pub fn seek_to_next_cue(&self, time: f64) -> Option<f64> {
        let index = cue_index_near(&self.subtitles, time)?;
        self.subtitles.get(index + 1).map(|cue| cue.start_time)
    }

    /// Начало текущего (или ближайшего) субтитра
    pub fn seek_to_current_cue_start(&self, time: f64) -> Option<f64> {
        let index = cue_index_near(&self.subtitles, time)?;
        self.subtitles.get(index).map(|cue| cue.start_time)
    }

    // ---------------------------------------------------------------------
    // Произношение и избранное
    // ---------------------------------------------------------------------

    /// Воспроизвести произношение слова в фоне. Ошибки только логируются.
    pub fn play_pronunciation(&self, word: &str) {
        let Some(pronunciation) = self.pronunciation.clone() else {
            log::warn!("Pronunciation service is not configured, cannot play '{}'", word);
            return;
        };

        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("Cannot play pronunciation for '{}': {}", word, e);
                return;
            }
        };

        let word = word.to_string();
        let language = self.detected_language.as_tag().to_string();
        handle.spawn(async move {
            if let Err(e) = pronunciation.play(&word, &language).await {
                log::error!("Pronunciation playback failed for '{}': {}", word, e);
            }
        });
    }

    /// Остановить произношение
    pub fn stop_pronunciation(&self) {
        if let Some(pronunciation) = &self.pronunciation {
            pronunciation.stop();
        }
    }

    /// Добавить слово в избранное или убрать из него.
    /// Возвращает, находится ли слово в избранном после переключения.
    pub fn toggle_favorite(&self, word: &str) -> Result<bool> {
        let language = self.detected_language.as_tag();
        if self.favorites.is_favorite(word, language) {
            self.favorites.remove(word, language)?;
            Ok(false)
        } else {
            self.favorites.add(word, language)?;
            Ok(true)
        }
    }

    pub fn is_favorite(&self, word: &str) -> bool {
        self.favorites.is_favorite(word, self.detected_language.as_tag())
    }

    pub fn favorites(&self) -> Vec<FavoriteWord> {
        self.favorites.list()
    }

    pub fn observe_favorites(&self) -> watch::Receiver<Vec<FavoriteWord>> {
        self.favorites.observe_all()
    }

    // ---------------------------------------------------------------------
    // Отображение
    // ---------------------------------------------------------------------

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn toggle_visibility(&mut self) -> bool {
        self.visible = !self.visible;
        self.visible
    }

    pub fn font_scale(&self) -> f32 {
        self.preferences.font_scale
    }

    pub fn set_font_scale(&mut self, scale: f32) {
        self.preferences.font_scale = scale;
        self.preferences = self.preferences.clone().clamped();
        self.persist_preferences();
    }

    pub fn adjust_font_scale(&mut self, delta: f32) -> f32 {
        self.set_font_scale(self.preferences.font_scale + delta);
        self.preferences.font_scale
    }

    pub fn vertical_offset(&self) -> f32 {
        self.preferences.vertical_offset
    }

    pub fn set_vertical_offset(&mut self, offset: f32) {
        self.preferences.vertical_offset = offset;
        self.preferences = self.preferences.clone().clamped();
        self.persist_preferences();
    }

    pub fn adjust_vertical_offset(&mut self, delta: f32) -> f32 {
        self.set_vertical_offset(self.preferences.vertical_offset + delta);
        self.preferences.vertical_offset
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    fn persist_preferences(&self) {
        let Some(path) = &self.config.preferences_path else {
            return;
        };
        if let Err(e) = self.preferences.save(path) {
            log::error!("Failed to save preferences to {}: {}", path, e);
        }
    }

    // ---------------------------------------------------------------------
    // События и состояние
    // ---------------------------------------------------------------------

    /// Применить все уже пришедшие события, не дожидаясь новых.
    /// Возвращает число применённых событий.
    pub fn process_pending_events(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.apply_event(event);
            applied += 1;
        }
        applied
    }

    /// Дождаться следующего события и применить его
    pub async fn next_event(&mut self) -> bool {
        match self.events_rx.recv().await {
            Some(event) => {
                self.apply_event(event);
                true
            }
            None => false,
        }
    }

    pub fn apply_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::SubtitlesLoaded { generation, url, result } => {
                self.finish_load(generation, url, result)
            }
            EngineEvent::DictionaryResolved { generation, word, entry } => {
                self.finish_lookup(generation, word, entry)
            }
        }
    }

    /// Снимок текущего состояния
    pub fn snapshot(&self) -> EngineState {
        EngineState {
            subtitles: self.subtitles.clone(),
            current_cue: self.current_cue.clone(),
            word_segments: self.word_segments.clone(),
            selected_word_index: self.selected_word_index,
            is_in_word_navigation_mode: self.navigation_mode,
            selected_word: self.selected_word.clone(),
            dictionary_entry: self.dictionary_entry.clone(),
            is_loading_dictionary: self.loading_dictionary,
            auto_pause_enabled: self.auto_pause_enabled,
            is_auto_paused: self.auto_pause.is_paused(),
            auto_pause_triggered: self.auto_pause.is_triggered(),
            user_resumed_playback: self.auto_pause.user_resumed(),
            detected_language: self.detected_language,
            load_state: self.load_state.clone(),
            is_visible: self.visible,
        }
    }

    pub fn subtitles(&self) -> &[SubtitleCue] {
        &self.subtitles
    }

    pub fn current_cue(&self) -> Option<&SubtitleCue> {
        self.current_cue.as_ref()
    }

    pub fn word_segments(&self) -> &[WordSegment] {
        &self.word_segments
    }

    pub fn selected_word_index(&self) -> Option<usize> {
        self.selected_word_index
    }

    pub fn is_in_word_navigation_mode(&self) -> bool {
        self.navigation_mode
    }

    pub fn selected_word(&self) -> Option<&str> {
        self.selected_word.as_deref()
    }

    pub fn dictionary_entry(&self) -> Option<&DictionaryEntry> {
        self.dictionary_entry.as_ref()
    }

    pub fn is_loading_dictionary(&self) -> bool {
        self.loading_dictionary
    }

    pub fn is_auto_pause_enabled(&self) -> bool {
        self.auto_pause_enabled
    }

    pub fn is_auto_paused(&self) -> bool {
        self.auto_pause.is_paused()
    }

    pub fn detected_language(&self) -> Language {
        self.detected_language
    }

    pub fn load_state(&self) -> &SubtitleLoadState {
        &self.load_state
    }

    pub fn current_url(&self) -> Option<&str> {
        self.current_url.as_deref()
    }

    pub fn dictionary(&self) -> &DictionaryService {
        &self.dictionary
    }
}

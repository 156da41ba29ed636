//! Модуль произношения слов
//!
//! Аудио произношения скачивается с сервера (`/tts/pronounce`), кэшируется
//! на диске и отдаётся внешнему проигрывателю. Одновременно звучит не больше
//! одного произношения: новое воспроизведение останавливает предыдущее.

use std::path::{Path, PathBuf};
use std::io::Write;
use std::sync::Arc;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use reqwest::{header, redirect, Client, StatusCode};
use crate::cache::{BoundedCache, FifoCache};
use crate::config::HttpConfig;
use crate::error::{Result, SubtitleError};

/// Максимальный возраст скачанного аудио
pub const MAX_CLIP_AGE_MINUTES: i64 = 60;

/// Скачанное аудио произношения
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub word: String,
    pub language: String,
    pub path: PathBuf,
}

/// Сервис произношения
#[async_trait]
pub trait PronunciationService: Send + Sync {
    /// Заранее скачать аудио для слова
    async fn preload(&self, word: &str, language: &str) -> Result<AudioClip>;

    /// Воспроизвести слово
    async fn play(&self, word: &str, language: &str) -> Result<()>;

    /// Остановить текущее воспроизведение
    fn stop(&self);
}

/// Получение аудио произношения
#[async_trait]
pub trait AudioFetcher: Send + Sync {
    async fn fetch(&self, word: &str, language: &str) -> Result<Vec<u8>>;
}

/// Внешний проигрыватель аудио
pub trait AudioSink: Send + Sync {
    /// Начать воспроизведение файла
    fn start(&self, clip: &AudioClip) -> Result<Box<dyn ActivePlayback>>;
}

/// Идущее воспроизведение; `stop` освобождает ресурс проигрывателя
pub trait ActivePlayback: Send {
    fn stop(&mut self);
}

/// Способ получить аудио для воспроизведения
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStrategy {
    /// Использовать ранее скачанный файл
    CachedClip,
    /// Скачать файл заново
    FreshDownload,
}

/// Стратегии по умолчанию: сначала кэш, затем свежая загрузка
pub const DEFAULT_STRATEGIES: &[PlaybackStrategy] =
    &[PlaybackStrategy::CachedClip, PlaybackStrategy::FreshDownload];

#[derive(Debug, Clone)]
struct CachedClip {
    clip: AudioClip,
    downloaded_at: DateTime<Utc>,
}

/// Произношение через бэкенд с кэшем файлов
pub struct BackendPronunciation {
    fetcher: Arc<dyn AudioFetcher>,
    sink: Arc<dyn AudioSink>,
    cache_dir: PathBuf,
    clips: Mutex<FifoCache<String, CachedClip>>,
    active: Mutex<Option<Box<dyn ActivePlayback>>>,
    // Остановка, получение файла и запуск выполняются одним вызовом `play` за раз
    play_lock: tokio::sync::Mutex<()>,
    strategies: Vec<PlaybackStrategy>,
}

impl BackendPronunciation {
    pub fn new(
        fetcher: Arc<dyn AudioFetcher>,
        sink: Arc<dyn AudioSink>,
        cache_dir: impl Into<PathBuf>,
        cache_capacity: usize,
    ) -> Result<Self> {
        let cache_dir = cache_dir.into();
        if !cache_dir.exists() {
            std::fs::create_dir_all(&cache_dir)?;
        }

        Ok(Self {
            fetcher,
            sink,
            cache_dir,
            clips: Mutex::new(FifoCache::new(cache_capacity)),
            active: Mutex::new(None),
            play_lock: tokio::sync::Mutex::new(()),
            strategies: DEFAULT_STRATEGIES.to_vec(),
        })
    }

    /// Задать порядок стратегий воспроизведения
    pub fn with_strategies(mut self, strategies: Vec<PlaybackStrategy>) -> Self {
        self.strategies = strategies;
        self
    }

    /// Количество файлов в кэше
    pub fn cached_len(&self) -> usize {
        self.clips.lock().len()
    }

    /// Удалить из кэша файлы старше `max_age` и записи без файлов
    pub fn cleanup_stale(&self, max_age: Duration) -> usize {
        let now = Utc::now();
        let removed = self.clips.lock().retain(|_, cached| {
            cached.clip.path.exists() && now - cached.downloaded_at <= max_age
        });

        for (_, cached) in &removed {
            remove_file_quietly(&cached.clip.path);
        }
        if !removed.is_empty() {
            log::debug!("Cleaned up {} stale pronunciation clips", removed.len());
        }
        removed.len()
    }

    /// Остановить воспроизведение и удалить все скачанные файлы
    pub fn shutdown(&self) {
        self.stop();
        let mut clips = self.clips.lock();
        for cached in clips.values() {
            remove_file_quietly(&cached.clip.path);
        }
        let count = clips.len();
        clips.clear();
        log::debug!("Pronunciation service shut down, removed {} cached clips", count);
    }

    fn clip_key(word: &str, language: &str) -> String {
        format!("{}_{}", word, language)
    }

    fn clip_path(&self, key: &str) -> PathBuf {
        let digest = md5::compute(key.as_bytes());
        self.cache_dir.join(format!("pronunciation_{:x}.mp3", digest))
    }

    fn cached_clip(&self, key: &str) -> Option<AudioClip> {
        let mut clips = self.clips.lock();
        let cached = clips.get(&key.to_string())?.clip.clone();
        if cached.path.exists() {
            Some(cached)
        } else {
            clips.remove(&key.to_string());
            None
        }
    }

    fn evict(&self, key: &str) {
        if let Some(cached) = self.clips.lock().remove(&key.to_string()) {
            remove_file_quietly(&cached.clip.path);
        }
    }

    async fn download(&self, word: &str, language: &str) -> Result<AudioClip> {
        let bytes = self.fetcher.fetch(word, language).await?;
        if bytes.is_empty() {
            return Err(SubtitleError::Pronunciation(format!("empty audio for '{}'", word)));
        }

        let key = Self::clip_key(word, language);
        let path = self.clip_path(&key);

        // Пишем во временный файл и переименовываем, чтобы не оставить половину файла
        let mut tmp = tempfile::NamedTempFile::new_in(&self.cache_dir)?;
        tmp.write_all(&bytes)?;
        tmp.persist(&path).map_err(|e| SubtitleError::Io(e.error))?;

        let clip = AudioClip {
            word: word.to_string(),
            language: language.to_string(),
            path,
        };
        let evicted = self.clips.lock().insert(
            key,
            CachedClip { clip: clip.clone(), downloaded_at: Utc::now() },
        );
        if let Some((_, old)) = evicted {
            remove_file_quietly(&old.clip.path);
        }

        log::debug!("Pre-loaded audio for word '{}' into {}", word, clip.path.display());
        Ok(clip)
    }

    fn set_active(&self, playback: Box<dyn ActivePlayback>) {
        let previous = self.active.lock().replace(playback);
        if let Some(mut previous) = previous {
            previous.stop();
        }
    }
}

#[async_trait]
impl PronunciationService for BackendPronunciation {
    async fn preload(&self, word: &str, language: &str) -> Result<AudioClip> {
        let key = Self::clip_key(word, language);
        if let Some(clip) = self.cached_clip(&key) {
            log::debug!("Audio already cached for word '{}'", word);
            return Ok(clip);
        }
        self.download(word, language).await
    }

    async fn play(&self, word: &str, language: &str) -> Result<()> {
        let _play_guard = self.play_lock.lock().await;
        self.stop();

        let key = Self::clip_key(word, language);
        let mut last_error = None;

        for strategy in &self.strategies {
            let clip = match strategy {
                PlaybackStrategy::CachedClip => match self.cached_clip(&key) {
                    Some(clip) => clip,
                    None => continue,
                },
                PlaybackStrategy::FreshDownload => match self.download(word, language).await {
                    Ok(clip) => clip,
                    Err(e) => {
                        log::warn!("Download of pronunciation for '{}' failed: {}", word, e);
                        last_error = Some(e);
                        continue;
                    }
                },
            };

            match self.sink.start(&clip) {
                Ok(playback) => {
                    self.set_active(playback);
                    log::debug!("Playing pronunciation for '{}' via {:?}", word, strategy);
                    return Ok(());
                }
                Err(e) => {
                    log::warn!("Playback of '{}' via {:?} failed: {}", word, strategy, e);
                    self.evict(&key);
                    last_error = Some(e);
                }
            }
        }

        let error = last_error.unwrap_or_else(|| {
            SubtitleError::Pronunciation(format!("no playback strategy succeeded for '{}'", word))
        });
        log::error!("Failed to play pronunciation for word '{}': {}", word, error);
        Err(error)
    }

    fn stop(&self) {
        if let Some(mut playback) = self.active.lock().take() {
            playback.stop();
        }
    }
}

/// Загрузка аудио произношения с сервера Stash
pub struct HttpAudioFetcher {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    api_key_header: String,
}

impl HttpAudioFetcher {
    pub fn new(server_url: &str, config: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.connect_timeout() + config.read_timeout())
            .user_agent(config.user_agent.clone())
            .redirect(redirect::Policy::limited(5))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/tts/pronounce", server_url.trim_end_matches('/')),
            api_key: config.trimmed_api_key().map(str::to_string),
            api_key_header: config.api_key_header.clone(),
        })
    }
}

/// Код языка, который ожидает сервер
pub fn server_language_code(language: &str) -> String {
    match language.to_lowercase().as_str() {
        "zh" | "zh-cn" => "zh-CN".to_string(),
        other => other.to_string(),
    }
}

#[async_trait]
impl AudioFetcher for HttpAudioFetcher {
    async fn fetch(&self, word: &str, language: &str) -> Result<Vec<u8>> {
        let lang = server_language_code(language);
        let mut request = self
            .client
            .get(&self.endpoint)
            .query(&[("text", word), ("lang", lang.as_str())]);
        if let Some(key) = &self.api_key {
            request = request.header(self.api_key_header.as_str(), key);
        }

        let response = request.send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(SubtitleError::Http {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("Unknown status").to_string(),
            });
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !is_audio_content_type(&content_type) {
            return Err(SubtitleError::Pronunciation(format!(
                "server did not return audio (Content-Type: {})",
                content_type
            )));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

fn is_audio_content_type(content_type: &str) -> bool {
    let lower = content_type.to_lowercase();
    lower.starts_with("audio/") || lower.starts_with("application/octet-stream")
}

fn remove_file_quietly(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            log::warn!("Failed to delete pronunciation file {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeFetcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AudioFetcher for FakeFetcher {
        async fn fetch(&self, word: &str, _language: &str) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            if word == "missing" {
                return Err(SubtitleError::Http { status: 404, message: "Not Found".into() });
            }
            Ok(format!("audio:{}", word).into_bytes())
        }
    }

    #[derive(Default)]
    struct FakeSink {
        started: Arc<AtomicUsize>,
        stopped: Arc<AtomicUsize>,
        live: Arc<AtomicUsize>,
        max_live: AtomicUsize,
        failures_left: AtomicUsize,
    }

    struct FakePlayback {
        stopped: Arc<AtomicUsize>,
        live: Arc<AtomicUsize>,
    }

    impl ActivePlayback for FakePlayback {
        fn stop(&mut self) {
            self.stopped.fetch_add(1, Ordering::SeqCst);
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl AudioSink for FakeSink {
        fn start(&self, clip: &AudioClip) -> Result<Box<dyn ActivePlayback>> {
            assert!(clip.path.exists());
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(SubtitleError::Pronunciation("decoder error".into()));
            }
            self.started.fetch_add(1, Ordering::SeqCst);
            let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_live.fetch_max(live, Ordering::SeqCst);
            Ok(Box::new(FakePlayback {
                stopped: self.stopped.clone(),
                live: self.live.clone(),
            }))
        }
    }

    fn service(dir: &Path, sink: Arc<FakeSink>) -> (BackendPronunciation, Arc<FakeFetcher>) {
        let fetcher = Arc::new(FakeFetcher { calls: AtomicUsize::new(0) });
        let service = BackendPronunciation::new(fetcher.clone(), sink, dir.join("audio"), 2).unwrap();
        (service, fetcher)
    }

    #[tokio::test]
    async fn test_preload_then_play_uses_cache() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(FakeSink::default());
        let (service, fetcher) = service(dir.path(), sink.clone());

        let clip = service.preload("hello", "en").await.unwrap();
        assert_eq!(std::fs::read(&clip.path).unwrap(), b"audio:hello");
        assert_eq!(service.preload("hello", "en").await.unwrap(), clip);

        service.play("hello", "en").await.unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(sink.started.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_only_one_active_playback() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(FakeSink::default());
        let (service, _) = service(dir.path(), sink.clone());

        service.play("one", "en").await.unwrap();
        service.play("two", "en").await.unwrap();
        assert_eq!(sink.started.load(Ordering::SeqCst), 2);
        assert_eq!(sink.stopped.load(Ordering::SeqCst), 1);

        service.stop();
        service.stop();
        assert_eq!(sink.stopped.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_overlapping_plays_keep_single_playback() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(FakeSink::default());
        let (service, _) = service(dir.path(), sink.clone());

        let (first, second) = tokio::join!(service.play("one", "en"), service.play("two", "en"));
        first.unwrap();
        second.unwrap();

        assert_eq!(sink.started.load(Ordering::SeqCst), 2);
        assert_eq!(sink.max_live.load(Ordering::SeqCst), 1);
        assert_eq!(sink.live.load(Ordering::SeqCst), 1);

        service.stop();
        assert_eq!(sink.live.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_broken_cached_clip_falls_back_to_download() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(FakeSink::default());
        let (service, fetcher) = service(dir.path(), sink.clone());

        service.preload("word", "en").await.unwrap();
        sink.failures_left.store(1, Ordering::SeqCst);

        service.play("word", "en").await.unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
        assert_eq!(sink.started.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_play_reports_last_error() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _) = service(dir.path(), Arc::new(FakeSink::default()));

        let err = service.play("missing", "en").await.unwrap_err();
        assert!(matches!(err, SubtitleError::Http { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_eviction_cleanup_and_shutdown_remove_files() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _) = service(dir.path(), Arc::new(FakeSink::default()));

        let first = service.preload("a", "en").await.unwrap();
        service.preload("b", "en").await.unwrap();
        service.preload("c", "en").await.unwrap();
        assert!(!first.path.exists());
        assert_eq!(service.cached_len(), 2);

        assert_eq!(service.cleanup_stale(Duration::minutes(MAX_CLIP_AGE_MINUTES)), 0);
        assert_eq!(service.cleanup_stale(Duration::seconds(-1)), 2);
        assert_eq!(service.cached_len(), 0);

        let clip = service.preload("d", "en").await.unwrap();
        service.shutdown();
        assert!(!clip.path.exists());
        assert_eq!(service.cached_len(), 0);
    }

    #[test]
    fn test_language_code_and_content_type() {
        assert_eq!(server_language_code("zh"), "zh-CN");
        assert_eq!(server_language_code("ZH-CN"), "zh-CN");
        assert_eq!(server_language_code("EN"), "en");
        assert!(is_audio_content_type("audio/mpeg"));
        assert!(is_audio_content_type("Application/Octet-Stream"));
        assert!(!is_audio_content_type("text/html; charset=utf-8"));
    }
}

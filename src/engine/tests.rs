use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use async_trait::async_trait;

use super::*;
use crate::services::DictionaryDefinition;

const SAMPLE_VTT: &str = "WEBVTT\n\n00:00:01.000 --> 00:00:03.000\nHello world";

const TWO_CUES_VTT: &str = "WEBVTT

00:00:01.000 --> 00:00:03.000
Hello world

00:00:05.000 --> 00:00:07.000
One two three
";

struct FakeSource {
    responses: HashMap<String, String>,
    auth_required: bool,
    calls: AtomicUsize,
}

impl FakeSource {
    fn new(responses: &[(&str, &str)]) -> Self {
        Self {
            responses: responses
                .iter()
                .map(|(url, content)| (url.to_string(), content.to_string()))
                .collect(),
            auth_required: false,
            calls: AtomicUsize::new(0),
        }
    }

    fn requiring_auth() -> Self {
        Self {
            auth_required: true,
            ..Self::new(&[])
        }
    }
}

#[async_trait]
impl SubtitleSource for FakeSource {
    async fn fetch(&self, url: &str, _auth_token: Option<&str>) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.auth_required {
            return Err(SubtitleError::AuthRequired);
        }
        self.responses.get(url).cloned().ok_or(SubtitleError::Http {
            status: 404,
            message: "Not Found".to_string(),
        })
    }
}

struct EchoBackend;

#[async_trait]
impl DictionaryBackend for EchoBackend {
    async fn lookup(&self, word: &str, _language: &str, _context: &str) -> Result<DictionaryEntry> {
        Ok(DictionaryEntry {
            word: word.to_string(),
            pronunciation: None,
            definitions: vec![DictionaryDefinition {
                part_of_speech: "noun".to_string(),
                meaning: format!("meaning of {}", word),
                examples: Vec::new(),
            }],
            etymology: None,
        })
    }
}

fn engine_with(content: &str) -> SubtitleEngine {
    let mut engine = SubtitleEngine::new(EngineConfig::default());
    engine.load_subtitles_from_content(content, None);
    engine
}

#[test]
fn test_vtt_scenario() {
    let mut engine = engine_with(SAMPLE_VTT);
    assert_eq!(engine.load_state(), &SubtitleLoadState::Ready { cue_count: 1 });

    engine.update_playback_time(2.0);
    assert_eq!(engine.current_cue().map(|c| c.text.as_str()), Some("Hello world"));
    assert_eq!(
        engine.word_segments(),
        &[WordSegment::new("Hello", 0, 5), WordSegment::new("world", 6, 11)]
    );
    assert_eq!(engine.selected_word_index(), None);
}

#[test]
fn test_auto_pause_scenario() {
    let mut engine = engine_with(SAMPLE_VTT);
    engine.set_auto_pause_enabled(true);

    let mut results = Vec::new();
    for t in [2.7, 2.85, 2.95, 3.0] {
        engine.update_playback_time(t);
        results.push(engine.check_auto_pause(t));
    }
    assert_eq!(results, vec![false, true, false, false]);
}

#[test]
fn test_auto_pause_fires_once_per_sweep() {
    let mut engine = engine_with(TWO_CUES_VTT);
    engine.set_auto_pause_enabled(true);

    let mut fired = Vec::new();
    let mut t = 0.0;
    while t <= 8.0 {
        engine.update_playback_time(t);
        if engine.check_auto_pause(t) {
            fired.push(t);
        }
        t += 0.05;
    }

    // Один раз на каждый из двух субтитров
    assert_eq!(fired.len(), 2);
    assert!(fired[0] > 2.79 && fired[0] < 3.0);
    assert!(fired[1] > 6.79 && fired[1] < 7.0);
}

#[test]
fn test_resume_suppresses_auto_pause() {
    let mut engine = engine_with(SAMPLE_VTT);
    engine.set_auto_pause_enabled(true);

    engine.update_playback_time(2.85);
    assert!(engine.check_auto_pause(2.85));
    assert!(engine.is_auto_paused());

    engine.notify_user_resumed();
    assert!(!engine.is_auto_paused());
    assert!(engine.snapshot().user_resumed_playback);

    engine.reset_auto_pause_for_replay();
    engine.notify_user_resumed();
    engine.update_playback_time(2.9);
    assert!(!engine.check_auto_pause(2.9));
}

#[test]
fn test_replay_rearms_auto_pause() {
    let mut engine = engine_with(SAMPLE_VTT);
    engine.set_auto_pause_enabled(true);

    engine.update_playback_time(2.9);
    assert!(engine.check_auto_pause(2.9));

    engine.reset_auto_pause_for_replay();
    engine.update_playback_time(1.0);
    assert!(!engine.check_auto_pause(1.0));
    engine.update_playback_time(2.9);
    assert!(engine.check_auto_pause(2.9));
}

#[test]
fn test_cue_change_resets_auto_pause() {
    let mut engine = engine_with(TWO_CUES_VTT);
    engine.set_auto_pause_enabled(true);

    engine.update_playback_time(2.9);
    assert!(engine.check_auto_pause(2.9));
    engine.notify_user_resumed();

    engine.update_playback_time(4.0);
    let state = engine.snapshot();
    assert!(state.current_cue.is_none());
    assert!(state.word_segments.is_empty());
    assert!(!state.auto_pause_triggered);
    assert!(!state.user_resumed_playback);

    engine.update_playback_time(6.9);
    assert!(engine.check_auto_pause(6.9));
}

#[test]
fn test_navigation_mode_enables_pause() {
    let mut engine = engine_with(SAMPLE_VTT);
    assert!(!engine.is_auto_pause_enabled());

    engine.update_playback_time(2.9);
    assert!(!engine.check_auto_pause(2.9));

    engine.reset_auto_pause_for_replay();
    assert!(engine.enter_word_navigation_mode());
    assert!(engine.check_auto_pause(2.9));
}

#[test]
fn test_disabling_auto_pause_clears_paused() {
    let mut engine = engine_with(SAMPLE_VTT);
    engine.set_auto_pause_enabled(true);
    engine.update_playback_time(2.9);
    assert!(engine.check_auto_pause(2.9));

    assert!(!engine.toggle_auto_pause());
    assert!(!engine.is_auto_paused());
}

#[test]
fn test_navigation_wraparound() {
    let mut engine = engine_with(TWO_CUES_VTT);
    engine.update_playback_time(6.0);
    assert_eq!(engine.word_segments().len(), 3);

    assert!(engine.enter_word_navigation_mode());
    assert_eq!(engine.selected_word_index(), Some(0));

    engine.navigate_previous_word();
    assert_eq!(engine.selected_word_index(), Some(2));

    engine.navigate_next_word();
    assert_eq!(engine.selected_word_index(), Some(0));

    engine.navigate_next_word();
    engine.navigate_next_word();
    assert_eq!(engine.selected_word_index(), Some(2));
    engine.navigate_next_word();
    assert_eq!(engine.selected_word_index(), Some(0));
}

#[test]
fn test_navigation_from_no_selection() {
    let mut engine = engine_with(TWO_CUES_VTT);
    engine.update_playback_time(6.0);

    engine.navigate_next_word();
    assert!(engine.is_in_word_navigation_mode());
    assert_eq!(engine.selected_word_index(), Some(0));

    engine.exit_word_navigation_mode();
    assert!(!engine.is_in_word_navigation_mode());
    assert_eq!(engine.selected_word_index(), None);

    engine.navigate_previous_word();
    assert_eq!(engine.selected_word_index(), Some(2));
}

#[test]
fn test_navigation_without_segments_is_noop() {
    let mut engine = engine_with(TWO_CUES_VTT);
    engine.update_playback_time(4.0);

    assert!(!engine.enter_word_navigation_mode());
    engine.navigate_next_word();
    engine.navigate_previous_word();
    assert_eq!(engine.selected_word_index(), None);
    assert!(!engine.is_in_word_navigation_mode());
}

#[test]
fn test_cue_change_clears_selection_index() {
    let mut engine = engine_with(TWO_CUES_VTT);
    engine.update_playback_time(2.0);
    engine.enter_word_navigation_mode();
    engine.navigate_next_word();
    assert_eq!(engine.selected_word_index(), Some(1));

    engine.update_playback_time(6.0);
    assert_eq!(engine.selected_word_index(), None);
    assert_eq!(engine.word_segments()[0].word, "One");
}

#[test]
fn test_invalid_selection_is_noop() {
    let mut engine = engine_with(SAMPLE_VTT);
    engine.update_playback_time(2.0);

    match engine.selected_segment() {
        Err(SubtitleError::InvalidSelection { index, len }) => {
            assert_eq!(index, None);
            assert_eq!(len, 2);
        }
        other => panic!("unexpected result: {:?}", other),
    }

    assert!(!engine.select_current_word());
    assert_eq!(engine.selected_word(), None);
}

#[test]
fn test_select_word_without_runtime_gives_placeholder() {
    let mut engine = engine_with(SAMPLE_VTT);
    engine.update_playback_time(2.0);
    engine.enter_word_navigation_mode();

    assert!(engine.select_current_word());
    assert_eq!(engine.selected_word(), Some("Hello"));
    assert!(!engine.is_loading_dictionary());

    let entry = engine.dictionary_entry().unwrap();
    assert_eq!(entry.definitions[0].part_of_speech, "unknown");
    assert!(entry.definitions[0].meaning.contains("Hello (en)"));

    // Выход из навигации не сбрасывает выбранное слово
    engine.exit_word_navigation_mode();
    assert_eq!(engine.selected_word(), Some("Hello"));

    engine.select_word(None);
    assert_eq!(engine.selected_word(), None);
    assert!(engine.dictionary_entry().is_none());
}

#[test]
fn test_language_detection_and_cjk_segments() {
    let mut engine = engine_with("WEBVTT\n\n00:00:01.000 --> 00:00:03.000\n你好世界");
    engine.update_playback_time(1.5);

    assert_eq!(engine.detected_language(), Language::Chinese);
    let starts: Vec<usize> = engine.word_segments().iter().map(|s| s.start_index).collect();
    assert_eq!(starts, vec![0, 1, 2, 3]);
}

#[test]
fn test_seek_helpers() {
    let engine = engine_with(TWO_CUES_VTT);

    // Внутри первого субтитра
    assert_eq!(engine.seek_to_previous_cue(2.0), None);
    assert_eq!(engine.seek_to_next_cue(2.0), Some(5.0));
    assert_eq!(engine.seek_to_current_cue_start(2.0), Some(1.0));

    // Пауза между субтитрами относится к предыдущему
    assert_eq!(engine.seek_to_current_cue_start(4.0), Some(1.0));
    assert_eq!(engine.seek_to_next_cue(4.0), Some(5.0));

    // Последний субтитр
    assert_eq!(engine.seek_to_previous_cue(6.0), Some(1.0));
    assert_eq!(engine.seek_to_next_cue(6.0), None);
    assert_eq!(engine.seek_to_next_cue(100.0), None);

    let empty = SubtitleEngine::new(EngineConfig::default());
    assert_eq!(empty.seek_to_current_cue_start(1.0), None);
}

#[test]
fn test_load_states() {
    let mut engine = SubtitleEngine::new(EngineConfig::default());
    assert_eq!(engine.load_state(), &SubtitleLoadState::NoSource);

    engine.load_subtitles(None);
    assert_eq!(engine.load_state(), &SubtitleLoadState::NoSource);

    assert_eq!(engine.load_subtitles_from_content("WEBVTT\n\n", None), 0);
    assert_eq!(engine.load_state(), &SubtitleLoadState::Empty);

    let messages: Vec<Option<String>> = [
        SubtitleLoadState::NoSource,
        SubtitleLoadState::Loading,
        SubtitleLoadState::Empty,
        SubtitleLoadState::AuthRequired,
        SubtitleLoadState::Failed("timeout".to_string()),
    ]
    .iter()
    .map(|s| s.status_message())
    .collect();
    assert!(messages.iter().all(|m| m.is_some()));
    for (i, a) in messages.iter().enumerate() {
        for b in &messages[i + 1..] {
            assert_ne!(a, b);
        }
    }
    assert_eq!(SubtitleLoadState::Ready { cue_count: 3 }.status_message(), None);
}

#[tokio::test]
async fn test_load_from_source_and_cache() {
    let source = Arc::new(FakeSource::new(&[
        ("http://stash/a.vtt", SAMPLE_VTT),
        ("http://stash/b.vtt", TWO_CUES_VTT),
    ]));
    let mut engine = SubtitleEngine::new(EngineConfig::default()).with_subtitle_source(source.clone());

    engine.load_subtitles(Some("http://stash/a.vtt"));
    assert!(engine.load_state().is_loading());
    assert!(engine.next_event().await);
    assert_eq!(engine.load_state(), &SubtitleLoadState::Ready { cue_count: 1 });

    engine.load_subtitles(Some("http://stash/b.vtt"));
    assert!(engine.next_event().await);
    assert_eq!(engine.subtitles().len(), 2);

    // Повторная загрузка берётся из кэша без запроса
    engine.load_subtitles(Some("http://stash/a.vtt"));
    assert_eq!(engine.load_state(), &SubtitleLoadState::Ready { cue_count: 1 });
    assert_eq!(source.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_stale_load_is_discarded() {
    let source = Arc::new(FakeSource::new(&[
        ("http://stash/a.vtt", SAMPLE_VTT),
        ("http://stash/b.vtt", TWO_CUES_VTT),
    ]));
    let mut engine = SubtitleEngine::new(EngineConfig::default()).with_subtitle_source(source);

    engine.load_subtitles(Some("http://stash/a.vtt"));
    engine.load_subtitles(Some("http://stash/b.vtt"));
    assert!(engine.next_event().await);
    assert!(engine.next_event().await);

    assert_eq!(engine.current_url(), Some("http://stash/b.vtt"));
    assert_eq!(engine.load_state(), &SubtitleLoadState::Ready { cue_count: 2 });
}

#[tokio::test]
async fn test_repeated_load_of_same_url_keeps_resume() {
    let source = Arc::new(FakeSource::new(&[("http://stash/a.vtt", SAMPLE_VTT)]));
    let mut engine = SubtitleEngine::new(EngineConfig::default()).with_subtitle_source(source.clone());
    engine.set_auto_pause_enabled(true);

    engine.load_subtitles(Some("http://stash/a.vtt"));
    engine.load_subtitles(Some("http://stash/a.vtt"));
    assert!(engine.next_event().await);

    engine.update_playback_time(2.85);
    assert!(engine.check_auto_pause(2.85));
    engine.notify_user_resumed();

    tokio::task::yield_now().await;
    assert_eq!(engine.process_pending_events(), 0);
    engine.update_playback_time(2.9);
    assert!(!engine.check_auto_pause(2.9));
    assert_eq!(source.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_superseded_load_of_same_url_is_discarded() {
    let source = Arc::new(FakeSource::new(&[
        ("http://stash/a.vtt", SAMPLE_VTT),
        ("http://stash/b.vtt", TWO_CUES_VTT),
    ]));
    let mut engine = SubtitleEngine::new(EngineConfig::default()).with_subtitle_source(source.clone());

    engine.load_subtitles(Some("http://stash/a.vtt"));
    engine.load_subtitles(Some("http://stash/b.vtt"));
    engine.load_subtitles(Some("http://stash/a.vtt"));

    // Первая загрузка `a` устарела, хотя URL снова текущий
    assert!(engine.next_event().await);
    assert!(engine.load_state().is_loading());

    assert!(engine.next_event().await);
    assert!(engine.next_event().await);
    assert_eq!(engine.load_state(), &SubtitleLoadState::Ready { cue_count: 1 });
    assert_eq!(source.calls.load(Ordering::SeqCst), 3);
}

#[test]
fn test_new_track_clears_word_interaction() {
    let mut engine = engine_with(TWO_CUES_VTT);
    engine.update_playback_time(2.0);
    assert!(engine.enter_word_navigation_mode());
    assert!(engine.select_current_word());
    assert!(engine.dictionary_entry().is_some());

    engine.load_subtitles_from_content(SAMPLE_VTT, None);
    assert!(!engine.is_in_word_navigation_mode());
    assert_eq!(engine.selected_word(), None);
    assert!(engine.dictionary_entry().is_none());
    assert!(!engine.is_loading_dictionary());

    // Без режима навигации автопауза снова зависит только от настройки
    engine.update_playback_time(2.9);
    assert!(!engine.check_auto_pause(2.9));
}

#[tokio::test]
async fn test_load_failures() {
    let mut engine = SubtitleEngine::new(EngineConfig::default())
        .with_subtitle_source(Arc::new(FakeSource::requiring_auth()));
    engine.load_subtitles(Some("http://stash/a.vtt"));
    assert!(engine.next_event().await);
    assert_eq!(engine.load_state(), &SubtitleLoadState::AuthRequired);

    let mut engine = SubtitleEngine::new(EngineConfig::default())
        .with_subtitle_source(Arc::new(FakeSource::new(&[])));
    engine.load_subtitles(Some("http://stash/missing.vtt"));
    assert!(engine.next_event().await);
    match engine.load_state() {
        SubtitleLoadState::Failed(message) => assert!(message.contains("404")),
        other => panic!("unexpected state: {:?}", other),
    }

    let mut engine = SubtitleEngine::new(EngineConfig::default());
    engine.load_subtitles(Some("http://stash/a.vtt"));
    assert!(matches!(engine.load_state(), SubtitleLoadState::Failed(_)));
}

#[tokio::test]
async fn test_select_word_resolves_dictionary_entry() {
    let mut engine = engine_with(SAMPLE_VTT).with_dictionary_backend(Arc::new(EchoBackend));
    engine.update_playback_time(2.0);
    engine.enter_word_navigation_mode();

    assert!(engine.select_current_word());
    // Выбор виден до завершения поиска
    assert_eq!(engine.selected_word(), Some("Hello"));
    assert!(engine.is_loading_dictionary());
    assert!(engine.dictionary_entry().is_none());

    assert!(engine.next_event().await);
    assert!(!engine.is_loading_dictionary());
    let entry = engine.dictionary_entry().unwrap();
    assert_eq!(entry.word, "Hello");
    assert_eq!(entry.definitions[0].meaning, "meaning of Hello");
    assert_eq!(engine.dictionary().cache_len(), 1);
}

#[tokio::test]
async fn test_superseded_lookup_is_discarded() {
    let mut engine = engine_with(SAMPLE_VTT).with_dictionary_backend(Arc::new(EchoBackend));
    engine.update_playback_time(2.0);

    engine.select_word(Some("Hello"));
    engine.select_word(Some("world"));
    assert!(engine.next_event().await);
    assert!(engine.next_event().await);

    assert_eq!(engine.selected_word(), Some("world"));
    assert_eq!(engine.dictionary_entry().map(|e| e.word.as_str()), Some("world"));

    // Снятие выбора отбрасывает незавершённый поиск
    engine.select_word(Some("Hello"));
    engine.select_word(None);
    assert!(engine.next_event().await);
    assert!(engine.dictionary_entry().is_none());
    assert!(!engine.is_loading_dictionary());
}

#[tokio::test]
async fn test_favorites_use_detected_language() {
    let mut engine = engine_with(SAMPLE_VTT);
    engine.update_playback_time(2.0);
    let mut rx = engine.observe_favorites();

    assert!(engine.toggle_favorite("Hello").unwrap());
    assert!(engine.is_favorite("Hello"));
    rx.changed().await.unwrap();
    assert_eq!(rx.borrow().as_slice(), &[FavoriteWord::new("Hello", "en")]);

    assert!(!engine.toggle_favorite("Hello").unwrap());
    assert!(engine.favorites().is_empty());
}

#[test]
fn test_display_preferences_persist() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prefs.json");
    let config = EngineConfig {
        preferences_path: Some(path.to_string_lossy().to_string()),
        ..EngineConfig::default()
    };

    let mut engine = SubtitleEngine::new(config.clone());
    assert_eq!(engine.font_scale(), 1.0);
    assert_eq!(engine.adjust_font_scale(10.0), 3.0);
    assert_eq!(engine.adjust_vertical_offset(-0.25), -0.25);
    engine.set_auto_pause_enabled(true);

    assert!(!engine.toggle_visibility());
    assert!(!engine.snapshot().is_visible);

    let reloaded = SubtitleEngine::new(config);
    assert_eq!(reloaded.font_scale(), 3.0);
    assert_eq!(reloaded.vertical_offset(), -0.25);
    assert!(reloaded.is_auto_pause_enabled());
}

#[test]
fn test_snapshot_serializes() {
    let mut engine = engine_with(SAMPLE_VTT);
    engine.update_playback_time(2.0);
    let json = serde_json::to_value(engine.snapshot()).unwrap();
    assert_eq!(json["current_cue"]["text"], "Hello world");
    assert_eq!(json["word_segments"].as_array().map(|a| a.len()), Some(2));
    assert_eq!(json["selected_word_index"], serde_json::Value::Null);
}

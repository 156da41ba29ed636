//! Пример: загрузка субтитров и имитация воспроизведения
//!
//! ```text
//! cargo run --example playback_demo -- path/to/subtitles.srt
//! ```

use anyhow::{Context, Result};
use stash_subtitle_core::{init_logger, EngineConfig, SubtitleEngine};

const SAMPLE: &str = "WEBVTT

00:00:01.000 --> 00:00:03.000
Hello world

00:00:04.000 --> 00:00:06.500
<i>Subtitles</i> keep the story moving
";

const TICK_SECS: f64 = 0.1;

#[tokio::main]
async fn main() -> Result<()> {
    init_logger();

    let mut engine = SubtitleEngine::new(EngineConfig::default());

    match std::env::args().nth(1) {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read subtitle file {}", path))?;
            let count = engine.load_subtitles_from_content(&content, Some(&path));
            log::info!("{} contains {} cues", path, count);
        }
        None => {
            engine.load_subtitles_from_content(SAMPLE, None);
        }
    }

    if let Some(message) = engine.load_state().status_message() {
        println!("{}", message);
        return Ok(());
    }

    engine.set_auto_pause_enabled(true);
    let end = engine.subtitles().iter().map(|c| c.end_time).fold(0.0, f64::max);

    let mut tick = 0u32;
    loop {
        let time = f64::from(tick) * TICK_SECS;
        if time > end + TICK_SECS {
            break;
        }

        engine.update_playback_time(time);
        if engine.check_auto_pause(time) {
            let cue = engine.current_cue().map(|c| c.text.clone()).unwrap_or_default();
            println!("[{:>6.2}s] auto-pause: {}", time, cue.replace('\n', " "));

            let words: Vec<String> = engine.word_segments().iter().map(|s| s.word.clone()).collect();
            println!("          words: {}", words.join(" | "));

            if engine.enter_word_navigation_mode() {
                engine.navigate_previous_word();
                if engine.select_current_word() {
                    engine.next_event().await;
                    if let Some(entry) = engine.dictionary_entry() {
                        for definition in &entry.definitions {
                            println!("          {}: {}", definition.part_of_speech, definition.meaning);
                        }
                    }
                }
                engine.exit_word_navigation_mode();
            }

            engine.notify_user_resumed();
        }

        tick += 1;
    }

    let state = engine.snapshot();
    println!("{}", serde_json::to_string_pretty(&state.load_state)?);
    Ok(())
}

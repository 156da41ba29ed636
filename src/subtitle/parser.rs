//! Модуль для парсинга субтитров
//!
//! Этот модуль содержит функции для разбора VTT и SRT субтитров.
//! Разбор никогда не завершается ошибкой из-за испорченного блока:
//! такие блоки пропускаются, а возвращается всё, что удалось распознать.

use std::path::Path;
use lazy_static::lazy_static;
use regex::Regex;
use crate::error::{Result, SubtitleError};
use super::types::{SubtitleCue, SubtitleFormat};

lazy_static! {
    static ref VTT_TIMING: Regex =
        Regex::new(r"^(\d{2}:\d{2}:\d{2}\.\d{3})\s*-->\s*(\d{2}:\d{2}:\d{2}\.\d{3})").unwrap();
    static ref SRT_TIMING: Regex =
        Regex::new(r"^(\d{2}:\d{2}:\d{2}[.,]\d{3})\s*-->\s*(\d{2}:\d{2}:\d{2}[.,]\d{3})").unwrap();
    static ref SRT_TIMING_ANYWHERE: Regex =
        Regex::new(r"\d{2}:\d{2}:\d{2},\d{3}\s*-->\s*\d{2}:\d{2}:\d{2},\d{3}").unwrap();
    static ref VTT_TIMING_ANYWHERE: Regex =
        Regex::new(r"\d{2}:\d{2}:\d{2}\.\d{3}\s*-->\s*\d{2}:\d{2}:\d{2}\.\d{3}").unwrap();
    static ref SEQUENCE_NUMBER: Regex = Regex::new(r"^\d+$").unwrap();
    static ref MARKUP_TAG: Regex = Regex::new(r"<[^>]*>").unwrap();
}

/// Определить формат и разобрать субтитры
pub fn parse_subtitles(content: &str, url: Option<&str>) -> Vec<SubtitleCue> {
    let format = detect_format(content, url);
    log::debug!("Detected subtitle format {:?} (url: {:?})", format, url);
    match format {
        SubtitleFormat::Srt => parse_srt(content),
        SubtitleFormat::Vtt => parse_vtt(content),
    }
}

/// Определить формат субтитров по расширению URL или по содержимому
pub fn detect_format(content: &str, url: Option<&str>) -> SubtitleFormat {
    if let Some(url) = url {
        let lower = url.to_lowercase();
        if lower.ends_with(".srt") {
            return SubtitleFormat::Srt;
        }
        if lower.ends_with(".vtt") {
            return SubtitleFormat::Vtt;
        }
    }

    let first_line = content
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("");
    // BOM в начале файла не должен мешать распознать заголовок
    let first_line = first_line.trim_start_matches('\u{feff}');

    if first_line.starts_with("WEBVTT") {
        return SubtitleFormat::Vtt;
    }
    if SEQUENCE_NUMBER.is_match(first_line) {
        return SubtitleFormat::Srt;
    }
    if SRT_TIMING_ANYWHERE.is_match(content) {
        return SubtitleFormat::Srt;
    }
    if VTT_TIMING_ANYWHERE.is_match(content) {
        return SubtitleFormat::Vtt;
    }

    // Сервер Stash всегда отдаёт VTT
    SubtitleFormat::Vtt
}

/// Разбор VTT субтитров
pub fn parse_vtt(content: &str) -> Vec<SubtitleCue> {
    let lines: Vec<&str> = content.lines().collect();
    let mut cues = Vec::new();
    let mut skipped = 0usize;

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i].trim().trim_start_matches('\u{feff}');

        if line.is_empty() || line.starts_with("WEBVTT") || line.starts_with("NOTE") {
            i += 1;
            continue;
        }

        let Some(captures) = VTT_TIMING.captures(line) else {
            i += 1;
            continue;
        };

        let range = parse_time_range(&captures[1], &captures[2]);
        i += 1;

        let mut body: Vec<String> = Vec::new();
        while i < lines.len() {
            let next = lines[i].trim();
            if next.is_empty() || VTT_TIMING.is_match(next) {
                break;
            }
            body.push(strip_markup(next));
            i += 1;
        }

        match range {
            Ok((start, end)) => {
                let text = body.join("\n").trim().to_string();
                if !text.is_empty() {
                    cues.push(SubtitleCue::new(start, end, text));
                }
            }
            Err(e) => {
                skipped += 1;
                log::debug!("Skipping VTT block: {}", e);
            }
        }
    }

    if skipped > 0 {
        log::warn!("Skipped {} malformed VTT blocks", skipped);
    }
    cues
}

/// Разбор SRT субтитров
pub fn parse_srt(content: &str) -> Vec<SubtitleCue> {
    let lines: Vec<&str> = content.lines().collect();
    let mut cues = Vec::new();
    let mut skipped = 0usize;

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i].trim().trim_start_matches('\u{feff}');

        if line.is_empty() {
            i += 1;
            continue;
        }

        // Номер блока перед строкой времени
        if SEQUENCE_NUMBER.is_match(line) {
            i += 1;
            if i >= lines.len() {
                break;
            }
        }

        let Some(captures) = SRT_TIMING.captures(lines[i].trim()) else {
            i += 1;
            continue;
        };

        let range = parse_time_range(
            &captures[1].replace(',', "."),
            &captures[2].replace(',', "."),
        );
        i += 1;

        let mut body = String::new();
        while i < lines.len() {
            let next = lines[i].trim();

            if next.is_empty() {
                // Пустая строка разделяет блоки, только если дальше идёт строка времени
                let mut lookahead = i + 1;
                while lookahead < lines.len() && lines[lookahead].trim().is_empty() {
                    lookahead += 1;
                }
                if lookahead >= lines.len() || SRT_TIMING.is_match(lines[lookahead].trim()) {
                    break;
                }
                if is_sequence_before_timing(&lines, lookahead) {
                    break;
                }
                if !body.is_empty() {
                    body.push('\n');
                }
                i += 1;
                continue;
            }

            if SRT_TIMING.is_match(next) || is_sequence_before_timing(&lines, i) {
                break;
            }

            if !body.is_empty() && !body.ends_with('\n') {
                body.push('\n');
            }
            body.push_str(&strip_markup(next));
            i += 1;
        }

        match range {
            Ok((start, end)) => {
                let text = body.trim().to_string();
                if !text.is_empty() {
                    cues.push(SubtitleCue::new(start, end, text));
                }
            }
            Err(e) => {
                skipped += 1;
                log::debug!("Skipping SRT block: {}", e);
            }
        }
    }

    if skipped > 0 {
        log::warn!("Skipped {} malformed SRT blocks", skipped);
    }
    cues
}

/// Прочитать и разобрать файл субтитров с диска
pub fn parse_subtitle_file<P: AsRef<Path>>(path: P) -> Result<Vec<SubtitleCue>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let hint = path.to_string_lossy();
    let cues = parse_subtitles(&content, Some(hint.as_ref()));
    log::info!("Parsed {} cues from {}", cues.len(), path.display());
    Ok(cues)
}

/// Строка является номером следующего блока, за которым сразу идёт строка времени
fn is_sequence_before_timing(lines: &[&str], index: usize) -> bool {
    SEQUENCE_NUMBER.is_match(lines[index].trim())
        && lines
            .get(index + 1)
            .map(|line| SRT_TIMING.is_match(line.trim()))
            .unwrap_or(false)
}

fn strip_markup(line: &str) -> String {
    MARKUP_TAG.replace_all(line, "").into_owned()
}

fn parse_time_range(start: &str, end: &str) -> Result<(f64, f64)> {
    Ok((parse_timestamp(start)?, parse_timestamp(end)?))
}

/// Парсит время из строки формата "HH:MM:SS.mmm" в секунды
pub fn parse_timestamp(timestamp: &str) -> Result<f64> {
    let parts: Vec<&str> = timestamp.trim().split(':').collect();
    if parts.len() != 3 {
        return Err(SubtitleError::Parse(format!("Invalid timestamp: {}", timestamp)));
    }

    let hours: u32 = parts[0]
        .parse()
        .map_err(|_| SubtitleError::Parse(format!("Invalid hours: {}", parts[0])))?;
    let minutes: u32 = parts[1]
        .parse()
        .map_err(|_| SubtitleError::Parse(format!("Invalid minutes: {}", parts[1])))?;

    let (seconds, millis) = match parts[2].split_once('.') {
        Some((seconds, millis)) => (seconds, millis),
        None => (parts[2], "0"),
    };
    let seconds: u32 = seconds
        .parse()
        .map_err(|_| SubtitleError::Parse(format!("Invalid seconds: {}", seconds)))?;
    let millis: u32 = millis
        .parse()
        .map_err(|_| SubtitleError::Parse(format!("Invalid milliseconds: {}", millis)))?;

    if minutes >= 60 || seconds >= 60 {
        return Err(SubtitleError::Parse(format!("Timestamp out of range: {}", timestamp)));
    }

    Ok(hours as f64 * 3600.0 + minutes as f64 * 60.0 + seconds as f64 + millis as f64 / 1000.0)
}

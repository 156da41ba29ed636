//! Поиск субтитра по времени воспроизведения.
//!
//! Поиск линейный: список субтитров обычно содержит от сотен до пары тысяч
//! элементов, а порядок в исходном файле не гарантирован.

use super::types::SubtitleCue;

/// Субтитр, содержащий момент `time` (границы включительно).
///
/// Если моменту соответствуют несколько субтитров (например, общая граница
/// `end == start` соседних), выигрывает первый по порядку в списке.
/// Вне всех интервалов возвращается `None`.
pub fn active_cue(cues: &[SubtitleCue], time: f64) -> Option<&SubtitleCue> {
    cues.iter().find(|cue| cue.contains(time))
}

/// Индекс субтитра, содержащего момент `time`
pub fn active_cue_index(cues: &[SubtitleCue], time: f64) -> Option<usize> {
    cues.iter().position(|cue| cue.contains(time))
}

/// Индекс субтитра «рядом» с моментом `time`.
///
/// - субтитр, содержащий `time`;
/// - в паузе между субтитрами: предыдущий субтитр;
/// - до первого субтитра: `0`;
/// - после последнего: последний индекс.
///
/// Для пустого списка возвращается `None`.
pub fn cue_index_near(cues: &[SubtitleCue], time: f64) -> Option<usize> {
    if cues.is_empty() {
        return None;
    }

    let mut last_before: Option<usize> = None;
    for (i, cue) in cues.iter().enumerate() {
        if cue.contains(time) {
            return Some(i);
        }
        if time > cue.end_time {
            last_before = Some(i);
        } else {
            // time < cue.start_time
            return Some(last_before.unwrap_or(0));
        }
    }

    Some(cues.len() - 1)
}

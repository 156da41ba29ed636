//! Автопауза в конце субтитра
//!
//! Пауза срабатывает не больше одного раза на субтитр. После того как
//! пользователь сам продолжил воспроизведение, автопауза для этого субтитра
//! подавлена до смены субтитра, иначе продолжение за долю секунды до окна
//! паузы сразу же снова ставило бы плеер на паузу.

use serde::Serialize;
use crate::subtitle::SubtitleCue;

#[derive(Debug, Clone, Serialize)]
pub struct AutoPause {
    window_secs: f64,
    /// Пауза уже срабатывала для текущего субтитра
    triggered: bool,
    /// Пользователь продолжил воспроизведение в текущем субтитре
    user_resumed: bool,
    /// Плеер сейчас стоит на автопаузе
    paused: bool,
}

impl AutoPause {
    pub fn new(window_secs: f64) -> Self {
        Self {
            window_secs,
            triggered: false,
            user_resumed: false,
            paused: false,
        }
    }

    /// Проверить, нужно ли поставить плеер на паузу в момент `time`.
    ///
    /// Возвращает `true` ровно один раз при входе в окно перед концом субтитра.
    pub fn check(&mut self, enabled: bool, cue: Option<&SubtitleCue>, time: f64) -> bool {
        if !enabled {
            self.paused = false;
            return false;
        }

        let Some(cue) = cue else {
            self.paused = false;
            return false;
        };

        if self.user_resumed {
            return false;
        }

        let remaining = cue.end_time - time;
        if remaining <= 0.0 {
            self.paused = false;
            return false;
        }

        if remaining <= self.window_secs && !self.triggered {
            self.triggered = true;
            self.paused = true;
            log::debug!("Auto-pause triggered at {:.3}s, cue ends at {:.3}s", time, cue.end_time);
            return true;
        }

        false
    }

    /// Пользователь сам продолжил воспроизведение
    pub fn notify_user_resumed(&mut self) {
        self.user_resumed = true;
        self.paused = false;
    }

    /// Сбросить состояние (смена субтитра или повтор текущего)
    pub fn reset(&mut self) {
        self.triggered = false;
        self.user_resumed = false;
        self.paused = false;
    }

    pub fn clear_paused(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered
    }

    pub fn user_resumed(&self) -> bool {
        self.user_resumed
    }

    pub fn window_secs(&self) -> f64 {
        self.window_secs
    }
}

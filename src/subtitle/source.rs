//! Источник субтитров
//!
//! Загрузка сырого текста субтитров по URL. Сервер Stash при отсутствии
//! авторизации отдаёт HTML-страницу входа со статусом 200, поэтому такой
//! ответ распознаётся отдельно от ошибок сети и разбора.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use crate::config::HttpConfig;
use crate::error::{Result, SubtitleError};

/// Источник сырого текста субтитров
#[async_trait]
pub trait SubtitleSource: Send + Sync {
    /// Загрузить текст субтитров
    async fn fetch(&self, url: &str, auth_token: Option<&str>) -> Result<String>;
}

/// Источник субтитров поверх HTTP
pub struct HttpSubtitleSource {
    client: Client,
    api_key_header: String,
}

impl HttpSubtitleSource {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        Ok(Self {
            client: config.build_client()?,
            api_key_header: config.api_key_header.clone(),
        })
    }
}

#[async_trait]
impl SubtitleSource for HttpSubtitleSource {
    async fn fetch(&self, url: &str, auth_token: Option<&str>) -> Result<String> {
        log::debug!("Fetching subtitles from {}", url);

        let mut request = self.client.get(url);
        if let Some(token) = auth_token.map(str::trim).filter(|t| !t.is_empty()) {
            request = request.header(self.api_key_header.as_str(), token);
        }

        let response = request.send().await.map_err(|e| {
            log::error!("Failed to load subtitles from {}: {}", url, e);
            SubtitleError::Network(e)
        })?;

        let status = response.status();
        if status != StatusCode::OK {
            let message = status.canonical_reason().unwrap_or("Unknown status").to_string();
            log::error!("Subtitle request {} failed with HTTP {}", url, status.as_u16());
            return Err(SubtitleError::Http { status: status.as_u16(), message });
        }

        let content = response.text().await?;
        if looks_like_html(&content) {
            log::warn!("Received HTML instead of subtitles from {}", url);
            return Err(SubtitleError::AuthRequired);
        }

        Ok(content)
    }
}

/// Ответ является HTML-страницей, а не субтитрами
pub fn looks_like_html(content: &str) -> bool {
    let head: String = content
        .trim_start()
        .chars()
        .take(16)
        .collect::<String>()
        .to_lowercase();
    head.starts_with("<!doctype") || head.starts_with("<html")
}

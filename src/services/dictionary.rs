//! Модуль словаря
//!
//! Поиск значения слова через бэкенд (GraphQL мутация `ollamaExplainWord`
//! на сервере Stash) с ограниченным кэшем перед ним. Ошибка поиска никогда
//! не превращается в пустой результат: вместо неё возвращается статья-заглушка,
//! чтобы диалог словаря всегда было чем заполнить.

use std::sync::Arc;
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use crate::cache::{BoundedCache, FifoCache};
use crate::config::{EngineConfig, HttpConfig};
use crate::error::{Result, SubtitleError};

/// Одно значение слова
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DictionaryDefinition {
    pub part_of_speech: String,
    pub meaning: String,
    #[serde(default)]
    pub examples: Vec<String>,
}

/// Словарная статья
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DictionaryEntry {
    pub word: String,
    pub pronunciation: Option<String>,
    pub definitions: Vec<DictionaryDefinition>,
    pub etymology: Option<String>,
}

impl DictionaryEntry {
    /// Статья-заглушка с причиной, по которой настоящей статьи нет
    pub fn placeholder(word: &str, language: &str, reason: &str) -> Self {
        Self {
            word: word.to_string(),
            pronunciation: None,
            definitions: vec![DictionaryDefinition {
                part_of_speech: "unknown".to_string(),
                meaning: format!("{} ({}) - {}", word, language, reason),
                examples: Vec::new(),
            }],
            etymology: None,
        }
    }
}

/// Бэкенд словаря
#[async_trait]
pub trait DictionaryBackend: Send + Sync {
    /// Найти слово. Должен быть безопасен для параллельных вызовов.
    async fn lookup(&self, word: &str, language: &str, context: &str) -> Result<DictionaryEntry>;
}

/// Словарь с кэшем перед бэкендом
pub struct DictionaryService {
    backend: Option<Arc<dyn DictionaryBackend>>,
    cache: Mutex<FifoCache<String, DictionaryEntry>>,
    context_chars: usize,
}

impl DictionaryService {
    pub fn new(backend: Option<Arc<dyn DictionaryBackend>>, config: &EngineConfig) -> Self {
        Self {
            backend,
            cache: Mutex::new(FifoCache::new(config.dictionary_cache_capacity)),
            context_chars: config.dictionary_context_chars,
        }
    }

    /// Найти слово, всегда возвращая статью
    pub async fn lookup(&self, word: &str, language: &str, context: &str) -> DictionaryEntry {
        let key = self.cache_key(word, language, context);
        if let Some(entry) = self.cache.lock().get(&key) {
            log::debug!("Dictionary cache hit for '{}'", word);
            return entry.clone();
        }

        let Some(backend) = self.backend.as_ref() else {
            log::warn!("Dictionary backend is not configured, cannot lookup '{}'", word);
            return DictionaryEntry::placeholder(word, language, "service unavailable");
        };

        match backend.lookup(word, language, context).await {
            Ok(entry) => {
                log::info!("Dictionary lookup successful for word: {}", word);
                self.cache.lock().insert(key, entry.clone());
                entry
            }
            Err(SubtitleError::LookupUnavailable(reason)) => {
                log::warn!("Dictionary unavailable for '{}': {}", word, reason);
                DictionaryEntry::placeholder(word, language, &reason)
            }
            Err(e) => {
                log::warn!("Dictionary lookup failed for '{}': {}", word, e);
                DictionaryEntry::placeholder(word, language, &format!("lookup failed: {}", e))
            }
        }
    }

    /// Ключ кэша: слово в нижнем регистре, язык и начало контекста
    pub fn cache_key(&self, word: &str, language: &str, context: &str) -> String {
        if context.is_empty() {
            format!("{}_{}", word.to_lowercase(), language)
        } else {
            let context: String = context.chars().take(self.context_chars).collect();
            format!("{}_{}_{}", word.to_lowercase(), language, context)
        }
    }

    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }

    pub fn cache_len(&self) -> usize {
        self.cache.lock().len()
    }
}

const EXPLAIN_WORD_MUTATION: &str = "mutation OllamaExplainWord($input: OllamaExplainWordInput!) { \
ollamaExplainWord(input: $input) { word pronunciation definitions { partOfSpeech meaning examples } etymology } }";

#[derive(Serialize)]
struct GraphQlRequest<'a> {
    query: &'a str,
    variables: ExplainWordVariables<'a>,
}

#[derive(Serialize)]
struct ExplainWordVariables<'a> {
    input: ExplainWordInput<'a>,
}

#[derive(Serialize)]
struct ExplainWordInput<'a> {
    word: &'a str,
    context: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<&'a str>,
}

#[derive(Deserialize)]
struct GraphQlResponse {
    data: Option<ExplainWordData>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExplainWordData {
    ollama_explain_word: Option<ExplainWordPayload>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Deserialize)]
struct ExplainWordPayload {
    word: String,
    pronunciation: Option<String>,
    #[serde(default)]
    definitions: Vec<DefinitionPayload>,
    etymology: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DefinitionPayload {
    #[serde(default)]
    part_of_speech: String,
    meaning: String,
    #[serde(default)]
    examples: Vec<Option<String>>,
}

impl From<ExplainWordPayload> for DictionaryEntry {
    fn from(payload: ExplainWordPayload) -> Self {
        Self {
            word: payload.word,
            pronunciation: payload.pronunciation,
            definitions: payload
                .definitions
                .into_iter()
                .map(|def| DictionaryDefinition {
                    part_of_speech: if def.part_of_speech.is_empty() {
                        "unknown".to_string()
                    } else {
                        def.part_of_speech
                    },
                    meaning: def.meaning,
                    examples: def.examples.into_iter().flatten().collect(),
                })
                .collect(),
            etymology: payload.etymology,
        }
    }
}

/// Бэкенд словаря на GraphQL API сервера Stash
pub struct GraphQlDictionaryBackend {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    api_key_header: String,
}

impl GraphQlDictionaryBackend {
    pub fn new(server_url: &str, config: &HttpConfig) -> Result<Self> {
        Ok(Self {
            client: config.build_client()?,
            endpoint: format!("{}/graphql", server_url.trim_end_matches('/')),
            api_key: config.trimmed_api_key().map(str::to_string),
            api_key_header: config.api_key_header.clone(),
        })
    }
}

#[async_trait]
impl DictionaryBackend for GraphQlDictionaryBackend {
    async fn lookup(&self, word: &str, language: &str, context: &str) -> Result<DictionaryEntry> {
        let body = GraphQlRequest {
            query: EXPLAIN_WORD_MUTATION,
            variables: ExplainWordVariables {
                input: ExplainWordInput {
                    word,
                    context,
                    language: Some(language).filter(|l| !l.is_empty()),
                },
            },
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.header(self.api_key_header.as_str(), key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SubtitleError::Http {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("Unknown status").to_string(),
            });
        }

        let payload: GraphQlResponse = response.json().await?;
        parse_explain_response(payload)
    }
}

fn parse_explain_response(response: GraphQlResponse) -> Result<DictionaryEntry> {
    if let Some(entry) = response.data.and_then(|data| data.ollama_explain_word) {
        return Ok(entry.into());
    }
    if !response.errors.is_empty() {
        let messages: Vec<String> = response.errors.into_iter().map(|e| e.message).collect();
        return Err(SubtitleError::Lookup(format!("query errors: {}", messages.join(", "))));
    }
    Err(SubtitleError::Lookup("no definition found".to_string()))
}

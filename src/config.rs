//! Session configuration

use crate::search::{HybridConfig, RerankConfig, SearchRequest, SummaryLanguage, SummaryRequest};

pub const DEFAULT_ENDPOINT: &str = "api.vectara.io";
pub const DEFAULT_SUMMARIZER: &str = "vectara-summary-ext-v1.2.0";

/// Fixed for the lifetime of a controller. Starting a new conversation does
/// not touch it.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub customer_id: String,
    pub corpus_ids: Vec<String>,
    pub api_key: String,
    pub endpoint: String,
    /// Used when a send does not pick a language itself
    pub language: SummaryLanguage,
    pub summary_prompt_name: String,
    pub enable_streaming: bool,
    pub enable_factual_consistency_score: bool,
    /// Metadata filter expression, empty for none
    pub filter: String,
    pub rerank: RerankConfig,
    pub hybrid: HybridConfig,
    pub summary_num_results: u32,
    pub summary_num_sentences: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            customer_id: String::new(),
            corpus_ids: Vec::new(),
            api_key: String::new(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            language: SummaryLanguage::Auto,
            summary_prompt_name: DEFAULT_SUMMARIZER.to_string(),
            enable_streaming: true,
            enable_factual_consistency_score: false,
            filter: String::new(),
            rerank: RerankConfig::default(),
            hybrid: HybridConfig::default(),
            summary_num_results: 7,
            summary_num_sentences: 3,
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn new(
        customer_id: impl Into<String>,
        corpus_ids: Vec<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            customer_id: customer_id.into(),
            corpus_ids,
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    #[must_use]
    pub fn with_language(mut self, language: SummaryLanguage) -> Self {
        self.language = language;
        self
    }

    #[must_use]
    pub fn with_summary_prompt(mut self, prompt_name: impl Into<String>) -> Self {
        self.summary_prompt_name = prompt_name.into();
        self
    }

    #[must_use]
    pub fn with_streaming(mut self, enabled: bool) -> Self {
        self.enable_streaming = enabled;
        self
    }

    #[must_use]
    pub fn with_factual_consistency_score(mut self, enabled: bool) -> Self {
        self.enable_factual_consistency_score = enabled;
        self
    }

    /// Load from `RAG_CHAT_*` environment variables
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unset or blank keys keep their defaults;
    /// unparsable values are logged and ignored.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut config = Self::default();

        if let Some(customer_id) = get("RAG_CHAT_CUSTOMER_ID") {
            config.customer_id = customer_id;
        }
        if let Some(corpus_ids) = get("RAG_CHAT_CORPUS_IDS") {
            config.corpus_ids = parse_corpus_ids(&corpus_ids);
        }
        if let Some(api_key) = get("RAG_CHAT_API_KEY") {
            config.api_key = api_key;
        }
        if let Some(endpoint) = get("RAG_CHAT_ENDPOINT") {
            config.endpoint = endpoint;
        }
        if let Some(language) = get("RAG_CHAT_LANGUAGE") {
            match language.parse() {
                Ok(language) => config.language = language,
                Err(e) => tracing::warn!(error = %e, "Ignoring RAG_CHAT_LANGUAGE"),
            }
        }
        if let Some(prompt) = get("RAG_CHAT_SUMMARY_PROMPT") {
            config.summary_prompt_name = prompt;
        }
        if let Some(value) = get("RAG_CHAT_STREAMING") {
            if let Some(enabled) = parse_bool(&value) {
                config.enable_streaming = enabled;
            } else {
                tracing::warn!(value = %value, "Ignoring RAG_CHAT_STREAMING");
            }
        }
        if let Some(value) = get("RAG_CHAT_FCS") {
            if let Some(enabled) = parse_bool(&value) {
                config.enable_factual_consistency_score = enabled;
            } else {
                tracing::warn!(value = %value, "Ignoring RAG_CHAT_FCS");
            }
        }

        config
    }

    /// Whether the credentials needed to reach the API are present
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.customer_id.is_empty() && !self.api_key.is_empty() && !self.corpus_ids.is_empty()
    }

    /// Parameters for the retrieval phase
    #[must_use]
    pub fn retrieval_request(&self, question: &str) -> SearchRequest {
        SearchRequest {
            customer_id: self.customer_id.clone(),
            corpus_ids: self.corpus_ids.clone(),
            query: question.to_string(),
            filter: self.filter.clone(),
            rerank: self.rerank,
            hybrid: self.hybrid,
            endpoint: self.endpoint.clone(),
            api_key: self.api_key.clone(),
            summary: None,
        }
    }

    /// Parameters for the summarize phase
    #[must_use]
    pub fn summary_request(
        &self,
        question: &str,
        language: Option<SummaryLanguage>,
        conversation_id: Option<String>,
    ) -> SearchRequest {
        SearchRequest {
            summary: Some(SummaryRequest {
                language: language.unwrap_or(self.language),
                prompt_name: self.summary_prompt_name.clone(),
                num_results: self.summary_num_results,
                num_sentences: self.summary_num_sentences,
                conversation_id,
                factual_consistency_score: self.enable_factual_consistency_score,
                stream: self.enable_streaming,
            }),
            ..self.retrieval_request(question)
        }
    }
}

/// Corpus ids may be separated by spaces, commas, or both
#[must_use]
pub fn parse_corpus_ids(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|id| !id.is_empty())
        .map(String::from)
        .collect()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::errors::RewriteError;
use crate::prompts::{build_prompt, prompt_text, REWRITE_CLOSE, REWRITE_OPEN};
use crate::{RewriteBackend, RewriteRequest};

/// Sampling parameters handed to the model.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CompletionParams {
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
}

impl Default for CompletionParams {
    fn default() -> Self {
        Self {
            temperature: 0.5,
            max_tokens: 20_000,
            top_p: 0.9,
        }
    }
}

/// Opaque text-completion engine: prompt in, generated text out.
#[async_trait]
pub trait TextCompletion: Send + Sync {
    async fn complete(&self, prompt: &str, params: &CompletionParams) -> Result<String, RewriteError>;
}

/// Backend that renders the prompt locally and cleans the raw completion.
pub struct PromptBackend<C> {
    completion: C,
    params: CompletionParams,
}

impl<C: TextCompletion> PromptBackend<C> {
    pub fn new(completion: C) -> Self {
        Self {
            completion,
            params: CompletionParams::default(),
        }
    }

    pub fn with_params(mut self, params: CompletionParams) -> Self {
        self.params = params;
        self
    }
}

#[async_trait]
impl<C: TextCompletion> RewriteBackend for PromptBackend<C> {
    async fn complete_rewrite(&self, request: &RewriteRequest) -> Result<String, RewriteError> {
        let prompt = build_prompt(request.mode, &request.text, request.platform.as_deref());
        trace!(request_id = %request.request_id, prompt_len = prompt.len(), "prompt built");
        let raw = self.completion.complete(&prompt, &self.params).await?;
        let cleaned = clean_response(&raw)?;
        debug!(
            request_id = %request.request_id,
            raw_len = raw.len(),
            len = cleaned.len(),
            "completion cleaned"
        );
        Ok(cleaned)
    }
}

/// Pulls the rewrite out of a raw completion.
///
/// Takes the text between the `<REWRITE>` delimiters when present (an
/// unterminated block runs to the end), trims it and strips one pair of
/// surrounding quotes.
pub fn clean_response(raw: &str) -> Result<String, RewriteError> {
    let mut text = raw.trim();
    if let Some(start) = text.find(REWRITE_OPEN) {
        let body = &text[start + REWRITE_OPEN.len()..];
        text = match body.find(REWRITE_CLOSE) {
            Some(end) => &body[..end],
            None => body,
        };
        text = text.trim();
    }
    let quoted = text.len() >= 2
        && ((text.starts_with('"') && text.ends_with('"'))
            || (text.starts_with('\'') && text.ends_with('\'')));
    if quoted {
        text = text[1..text.len() - 1].trim();
    }
    if text.is_empty() {
        return Err(RewriteError::EmptyResponse);
    }
    Ok(text.to_string())
}

/// Offline completion that answers with the prompt's own text, optionally
/// prefixed. Used for dry runs without a model.
#[derive(Clone, Debug, Default)]
pub struct EchoCompletion {
    prefix: String,
}

impl EchoCompletion {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

#[async_trait]
impl TextCompletion for EchoCompletion {
    async fn complete(&self, prompt: &str, _params: &CompletionParams) -> Result<String, RewriteError> {
        let text = prompt_text(prompt)
            .ok_or_else(|| RewriteError::Completion("prompt has no text section".into()))?;
        Ok(format!("{REWRITE_OPEN}\n{}{}\n{REWRITE_CLOSE}", self.prefix, text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recast_core_types::{PostId, RewriteMode};

    #[test]
    fn extracts_delimited_block() {
        let raw = "Sure! Here you go:\n<REWRITE>\nShort version.\n</REWRITE>\nHope that helps";
        assert_eq!(clean_response(raw).unwrap(), "Short version.");
    }

    #[test]
    fn strips_one_pair_of_quotes() {
        assert_eq!(clean_response("  \"quoted\"  ").unwrap(), "quoted");
        assert_eq!(clean_response("<REWRITE>'single'</REWRITE>").unwrap(), "single");
        assert_eq!(clean_response("\"\"twice\"\"").unwrap(), "\"twice\"");
        assert_eq!(clean_response("\"unbalanced").unwrap(), "\"unbalanced");
    }

    #[test]
    fn unterminated_block_runs_to_end() {
        assert_eq!(clean_response("<REWRITE>\npartial output").unwrap(), "partial output");
    }

    #[test]
    fn empty_rewrites_are_errors() {
        assert_eq!(clean_response("<REWRITE>\n\n</REWRITE>"), Err(RewriteError::EmptyResponse));
        assert_eq!(clean_response("\"\""), Err(RewriteError::EmptyResponse));
        assert_eq!(clean_response("   "), Err(RewriteError::EmptyResponse));
    }

    #[tokio::test]
    async fn echo_backend_round_trips_text() {
        let backend = PromptBackend::new(EchoCompletion::new("[dry-run] "));
        let request = RewriteRequest::new(
            PostId::from("p1"),
            "Leveraging synergies",
            RewriteMode::Debuzzword,
            Some("reddit".into()),
            120_000,
        );
        assert_eq!(
            backend.complete_rewrite(&request).await.unwrap(),
            "[dry-run] Leveraging synergies"
        );
    }
}

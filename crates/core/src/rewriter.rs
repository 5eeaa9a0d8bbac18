use crate::traits::LanguageModel;
use tracing::{debug, warn};

fn rewrite_prompt(question: &str) -> String {
    format!(
        "Rewrite the following student question to be more effective for retrieving relevant \
         information from educational materials. Make it more specific, clear, and focused on \
         key concepts.\nOriginal query: \"{question}\"\nRewritten query:"
    )
}

/// Reformulates a question for vector retrieval.
///
/// Rewriting never fails: a model error or an empty completion yields the
/// original question.
pub struct QueryRewriter<L> {
    llm: L,
}

impl<L: LanguageModel> QueryRewriter<L> {
    pub fn new(llm: L) -> Self {
        Self { llm }
    }

    pub fn model(&self) -> &L {
        &self.llm
    }

    pub async fn rewrite(&self, question: &str) -> String {
        match self.llm.complete(&rewrite_prompt(question)).await {
            Ok(completion) => {
                let rewritten = clean_rewrite(&completion);
                if rewritten.is_empty() {
                    warn!(question, "query rewrite was empty, using original question");
                    return question.to_string();
                }
                debug!(question, rewritten = %rewritten, "query rewritten");
                rewritten
            }
            Err(error) => {
                warn!(question, error = %error, "query rewrite failed, using original question");
                question.to_string()
            }
        }
    }
}

fn clean_rewrite(completion: &str) -> String {
    let first_line = completion.trim().lines().next().unwrap_or_default();
    let unlabelled = first_line
        .strip_prefix("Rewritten query:")
        .unwrap_or(first_line);
    unlabelled
        .trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FakeModel {
        reply: Result<&'static str, u16>,
        prompts: Mutex<Vec<String>>,
    }

    impl FakeModel {
        fn replying(reply: &'static str) -> Self {
            Self {
                reply: Ok(reply),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn failing(status: u16) -> Self {
            Self {
                reply: Err(status),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LanguageModel for FakeModel {
        async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            match self.reply {
                Ok(text) => Ok(text.to_string()),
                Err(status) => Err(LlmError::BackendResponse {
                    status,
                    details: "unavailable".to_string(),
                }),
            }
        }
    }

    #[tokio::test]
    async fn rewrite_strips_quotes_and_labels() {
        let rewriter = QueryRewriter::new(FakeModel::replying(
            "Rewritten query: \"definition of a derivative as a limit\"\n(made it specific)",
        ));
        let rewritten = rewriter.rewrite("what's a derivative").await;
        assert_eq!(rewritten, "definition of a derivative as a limit");

        let prompts = rewriter.model().prompts.lock().unwrap();
        assert!(prompts[0].contains("Original query: \"what's a derivative\""));
    }

    #[tokio::test]
    async fn model_failure_falls_back_to_original() {
        let rewriter = QueryRewriter::new(FakeModel::failing(500));
        assert_eq!(rewriter.rewrite("what is entropy?").await, "what is entropy?");
    }

    #[tokio::test]
    async fn empty_rewrite_falls_back_to_original() {
        let rewriter = QueryRewriter::new(FakeModel::replying(" \"\" "));
        assert_eq!(rewriter.rewrite("what is entropy?").await, "what is entropy?");
    }
}

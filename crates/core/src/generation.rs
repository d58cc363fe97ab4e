use crate::traits::{AnswerGenerator, ChatModel};
use crate::ModelError;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant for insurance policy analysis.";
pub const CONTEXT_SEPARATOR: &str = "\n---\n";

pub fn build_prompt(question: &str, context: &[&str]) -> String {
    let clauses = context.join(CONTEXT_SEPARATOR);
    format!(
        "\nYou are an expert insurance policy analyst.\n\
         Given the following policy clauses:\n\
         {clauses}\n\
         Answer the question: {question}\n\
         - Provide a clear, concise answer.\n\
         - Reference the clause(s) you used.\n\
         - Explain your reasoning.\n"
    )
}

/// Asks each chat model in order, moving on only while the current one
/// reports that it is unavailable.
pub struct FallbackGenerator {
    models: Vec<Arc<dyn ChatModel>>,
}

impl FallbackGenerator {
    pub fn new(models: Vec<Arc<dyn ChatModel>>) -> Result<Self, ModelError> {
        if models.is_empty() {
            return Err(ModelError::InvalidConfig(
                "at least one chat model is required".to_string(),
            ));
        }
        Ok(Self { models })
    }

    pub fn models(&self) -> Vec<&str> {
        self.models.iter().map(|model| model.model()).collect()
    }
}

#[async_trait]
impl AnswerGenerator for FallbackGenerator {
    async fn generate(&self, question: &str, context: &[&str]) -> Result<String, ModelError> {
        let prompt = build_prompt(question, context);

        for model in &self.models {
            match model.complete(SYSTEM_PROMPT, &prompt).await {
                Ok(answer) => {
                    debug!(model = model.model(), "answer generated");
                    return Ok(answer);
                }
                Err(error) if error.is_unavailable() => {
                    warn!(model = model.model(), error = %error, "chat model unavailable, trying next");
                }
                Err(error) => return Err(error),
            }
        }

        Err(ModelError::NoModelAvailable(self.models().join(", ")))
    }
}

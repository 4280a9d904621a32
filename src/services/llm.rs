use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestUserMessage,
        ChatCompletionRequestUserMessageContent, CreateChatCompletionRequest, Role,
    },
    Client,
};

use crate::error::AppError;

/// Answers the user's question over the retrieved chunk contents.
pub struct AnswerGenerator {
    client: Client<OpenAIConfig>,
    model: String,
}

impl AnswerGenerator {
    pub fn new(client: Client<OpenAIConfig>, model: &str) -> Self {
        Self {
            client,
            model: model.to_string(),
        }
    }

    pub async fn generate_answer(&self, query: &str, context: &str) -> Result<String, AppError> {
        let prompt = format!(
            "Context from spreadsheet:\n{}\n\nQuestion: {}\n\nAnswer based on context:",
            context, query
        );

        let messages = vec![ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessage {
                content: ChatCompletionRequestUserMessageContent::Text(prompt),
                name: None,
                role: Role::User,
            },
        )];

        let request = CreateChatCompletionRequest {
            model: self.model.clone(),
            messages,
            max_tokens: Some(1000),
            ..Default::default()
        };

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| AppError::Llm(e.to_string()))?;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| AppError::Llm("model returned no answer".to_string()))
    }
}

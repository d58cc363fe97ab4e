pub mod openai;

pub use openai::{OpenAiChatModel, OpenAiClient, OpenAiEmbedder};

//! 脚本化生成后端
//!
//! 离线开发与测试用：按入队顺序回放预设应答，可模拟中途失败。

use async_trait::async_trait;
use futures_util::stream;
use parking_lot::Mutex;
use std::collections::VecDeque;

use super::{GenerateOptions, TokenGenerator, TokenStream};
use crate::error::{AppError, Result};

enum ScriptedReply {
    Text(String),
    /// 先产出部分文本，再以给定错误中断
    FailAfter {
        text: String,
        error: String,
    },
}

pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<ScriptedReply>>,
    fallback: String,
}

impl ScriptedGenerator {
    pub fn new(fallback: &str) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: fallback.to_string(),
        }
    }

    /// 入队一条完整应答
    pub fn push_reply(&self, text: &str) {
        self.replies
            .lock()
            .push_back(ScriptedReply::Text(text.to_string()));
    }

    /// 入队一条在部分输出后失败的应答
    pub fn push_failure(&self, partial_text: &str, error: &str) {
        self.replies.lock().push_back(ScriptedReply::FailAfter {
            text: partial_text.to_string(),
            error: error.to_string(),
        });
    }

    fn next_reply(&self) -> ScriptedReply {
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| ScriptedReply::Text(self.fallback.clone()))
    }

    /// 把整句拆为保留空白的词级 token，模拟真实流
    fn tokenize(text: &str) -> Vec<String> {
        text.split_inclusive(' ').map(|t| t.to_string()).collect()
    }
}

#[async_trait]
impl TokenGenerator for ScriptedGenerator {
    async fn stream(&self, _prompt: &str, _options: &GenerateOptions) -> Result<TokenStream> {
        let items: Vec<Result<String>> = match self.next_reply() {
            ScriptedReply::Text(text) => Self::tokenize(&text).into_iter().map(Ok).collect(),
            ScriptedReply::FailAfter { text, error } => {
                let mut items: Vec<Result<String>> =
                    Self::tokenize(&text).into_iter().map(Ok).collect();
                items.push(Err(AppError::Generation(error)));
                items
            }
        };

        Ok(Box::pin(stream::iter(items)))
    }

    async fn complete(&self, _prompt: &str, _options: &GenerateOptions) -> Result<String> {
        match self.next_reply() {
            ScriptedReply::Text(text) => Ok(text),
            ScriptedReply::FailAfter { error, .. } => Err(AppError::Generation(error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    fn options() -> GenerateOptions {
        GenerateOptions {
            max_tokens: 64,
            temperature: 0.0,
            top_k: 40,
            top_p: 0.85,
            num_ctx: 2048,
            stop: vec![],
        }
    }

    #[tokio::test]
    async fn test_replies_replay_in_order() {
        let generator = ScriptedGenerator::new("mặc định");
        generator.push_reply("thứ nhất");
        generator.push_reply("thứ hai");

        assert_eq!(generator.complete("", &options()).await.unwrap(), "thứ nhất");
        assert_eq!(generator.complete("", &options()).await.unwrap(), "thứ hai");
        assert_eq!(generator.complete("", &options()).await.unwrap(), "mặc định");
    }

    #[tokio::test]
    async fn test_stream_concatenates_to_reply() {
        let generator = ScriptedGenerator::new("");
        generator.push_reply("Dạ, em chào anh chị ạ.");

        let mut stream = generator.stream("", &options()).await.unwrap();
        let mut text = String::new();
        while let Some(token) = stream.next().await {
            text.push_str(&token.unwrap());
        }
        assert_eq!(text, "Dạ, em chào anh chị ạ.");
    }

    #[tokio::test]
    async fn test_failure_surfaces_after_partial_output() {
        let generator = ScriptedGenerator::new("");
        generator.push_failure("Dạ, em ", "backend gone");

        let mut stream = generator.stream("", &options()).await.unwrap();
        let mut tokens = Vec::new();
        let mut failed = false;
        while let Some(item) = stream.next().await {
            match item {
                Ok(token) => tokens.push(token),
                Err(_) => failed = true,
            }
        }
        assert!(failed);
        assert!(!tokens.is_empty());
    }
}

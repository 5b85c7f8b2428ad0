//! 文本生成模块
//!
//! 对外部 token 生成器的抽象：惰性、可取消的流式调用，
//! 以及供意图分类使用的确定性非流式调用。

pub mod ollama;
pub mod prompt;
pub mod scripted;

pub use ollama::OllamaGenerator;
pub use scripted::ScriptedGenerator;

use async_trait::async_trait;
use futures_util::stream::Stream;
use std::pin::Pin;

use crate::config::GeneratorConfig;
use crate::error::Result;

/// ChatML 角色标记也是硬停止序列
pub const STOP_SEQUENCES: [&str; 2] = ["<|im_end|>", "<|im_start|>"];

/// 生成调用参数
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// 最大生成 token 数
    pub max_tokens: u32,
    /// 采样温度
    pub temperature: f32,
    /// Top-K 采样
    pub top_k: u32,
    /// Top-P 采样
    pub top_p: f32,
    /// 上下文窗口
    pub num_ctx: usize,
    /// 停止序列
    pub stop: Vec<String>,
}

impl GenerateOptions {
    pub fn from_config(config: &GeneratorConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            top_k: config.top_k,
            top_p: config.top_p,
            num_ctx: config.num_ctx,
            stop: STOP_SEQUENCES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// 分类调用的变体：短输出、零温度
    pub fn for_classification(config: &GeneratorConfig) -> Self {
        let mut options = Self::from_config(config);
        options.max_tokens = 256;
        options.temperature = 0.0;
        options
    }
}

/// 惰性 token 流；丢弃即取消底层请求
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Token 生成器接口
#[async_trait]
pub trait TokenGenerator: Send + Sync {
    /// 流式生成；调用方逐 token 消费
    async fn stream(&self, prompt: &str, options: &GenerateOptions) -> Result<TokenStream>;

    /// 非流式生成，等待完整输出
    async fn complete(&self, prompt: &str, options: &GenerateOptions) -> Result<String>;
}

/// 按配置创建生成器后端
pub fn create_generator(config: &GeneratorConfig) -> Result<Box<dyn TokenGenerator>> {
    match config.backend.as_str() {
        "scripted" => Ok(Box::new(ScriptedGenerator::new(
            "Dạ, em đang chạy ở chế độ ngoại tuyến nên chưa trả lời được ạ.",
        ))),
        _ => Ok(Box::new(OllamaGenerator::new(config)?)),
    }
}

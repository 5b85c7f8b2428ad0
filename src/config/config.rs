use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// 服务地址
    pub host: String,
    /// 服务端口
    pub port: u16,
    /// 请求超时（秒）
    pub request_timeout: u64,
}

/// 文本生成后端配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GeneratorConfig {
    /// 生成后端类型: "ollama" 或 "scripted"
    pub backend: String,
    /// Ollama 服务器地址
    pub ollama_url: String,
    /// 模型名称
    pub model_name: String,
    /// 上下文窗口大小
    pub num_ctx: usize,
    /// 采样温度
    pub temperature: f32,
    /// Top-K 采样
    pub top_k: u32,
    /// Top-P 采样
    pub top_p: f32,
    /// 单轮最大生成 token 数
    pub max_tokens: u32,
    /// 生成请求超时（秒）
    pub request_timeout: u64,
}

/// 嵌入模型配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Embedding 后端类型: "ollama" 或 "simple"
    pub backend: String,
    /// 模型名称
    pub model_name: String,
    /// 向量维度
    pub dimension: usize,
    /// Ollama 服务器地址
    pub ollama_url: String,
    /// Ollama 请求超时（秒）
    pub ollama_timeout: u64,
}

/// 检索配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RetrievalConfig {
    /// 产品目录数据文件路径
    pub catalog_path: PathBuf,
    /// 语义索引文档目录
    pub docs_path: PathBuf,
    /// 语义检索返回条数
    pub semantic_top_k: usize,
    /// 产品咨询推荐条数
    pub suggestion_count: usize,
    /// 单阶段检索超时（毫秒）
    pub stage_timeout_ms: u64,
    /// 组织名称别名（用于识别提及组织的提问）
    pub org_aliases: Vec<String>,
    /// 组织记录缺失热线时的兜底值
    pub fallback_hotline: String,
    /// 组织记录缺失网址时的兜底值
    pub fallback_website: String,
}

/// 会话配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SessionConfig {
    /// 保留的对话轮次窗口大小
    pub max_turns: usize,
    /// 空闲会话存活时间（秒）
    pub idle_ttl: u64,
    /// 空闲清扫间隔（秒）
    pub sweep_interval: u64,
    /// 合成应答的分块大小（字符）
    pub synthetic_chunk_chars: usize,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: String,
    /// 结构化日志格式
    pub structured: bool,
    /// 日志文件路径
    pub log_dir: Option<PathBuf>,
}

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// 服务器配置
    pub server: ServerConfig,
    /// 文本生成配置
    pub generator: GeneratorConfig,
    /// 嵌入模型配置
    pub embedding: EmbeddingConfig,
    /// 检索配置
    pub retrieval: RetrievalConfig,
    /// 会话配置
    pub session: SessionConfig,
    /// 日志配置
    pub logging: LoggingConfig,
    /// 应用名称
    pub app_name: String,
    /// 环境
    pub environment: String,
}

impl AppConfig {
    /// 创建开发环境配置
    pub fn development() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".into(),
                port: 8000,
                request_timeout: 30,
            },
            generator: GeneratorConfig {
                backend: "ollama".into(),
                ollama_url: "http://localhost:11434".into(),
                model_name: "qwen2.5:7b".into(),
                num_ctx: 4096,
                temperature: 0.1,
                top_k: 40,
                top_p: 0.85,
                max_tokens: 1024,
                request_timeout: 120,
            },
            embedding: EmbeddingConfig {
                backend: "simple".into(),
                model_name: "keepitreal/vietnamese-sbert".into(),
                dimension: 384,
                ollama_url: "http://localhost:11434".into(),
                ollama_timeout: 60,
            },
            retrieval: RetrievalConfig {
                catalog_path: PathBuf::from("./data/catalog.json"),
                docs_path: PathBuf::from("./data/docs"),
                semantic_top_k: 3,
                suggestion_count: 2,
                stage_timeout_ms: 5000,
                org_aliases: vec![],
                fallback_hotline: "1900 0000".into(),
                fallback_website: "https://example.vn/".into(),
            },
            session: SessionConfig {
                max_turns: 5,
                idle_ttl: 300,
                sweep_interval: 60,
                synthetic_chunk_chars: 120,
            },
            logging: LoggingConfig {
                level: "debug".into(),
                structured: true,
                log_dir: Some(PathBuf::from("./logs")),
            },
            app_name: "agrichat".into(),
            environment: "development".into(),
        }
    }

    /// 创建生产环境配置
    pub fn production() -> Self {
        let mut config = Self::development();
        config.environment = "production".into();
        config.logging.level = "info".into();
        config
    }
}

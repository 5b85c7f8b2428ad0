//! 语义索引模块

pub mod embedding;
pub mod vector;

pub use embedding::{EmbeddingModel, OllamaEmbeddingModel, SimpleEmbeddingModel, create_embedding_model};
pub use vector::MemoryVectorIndex;

use async_trait::async_trait;

use crate::error::Result;

/// 语义相似度检索接口
///
/// 索引的构建与重建由外部流程负责，核心只消费检索操作。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SemanticIndex: Send + Sync {
    /// 返回与查询最相近的至多 k 个文本片段，按相似度降序
    async fn search(&self, query: &str, k: usize) -> Result<Vec<String>>;
}

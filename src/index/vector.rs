//! 向量索引服务

use async_trait::async_trait;
use parking_lot::RwLock;
use std::path::Path;
use tracing::{info, warn};

use super::SemanticIndex;
use super::embedding::EmbeddingModel;
use crate::error::{AppError, Result};

/// 文档切块大小（字符）
const CHUNK_CHARS: usize = 500;
/// 相邻切块重叠（字符）
const CHUNK_OVERLAP: usize = 50;

struct IndexedChunk {
    text: String,
    embedding: Vec<f32>,
}

/// 内存向量索引
///
/// 启动时对文档目录做一次切块嵌入，检索用余弦相似度全量扫描。
pub struct MemoryVectorIndex {
    chunks: RwLock<Vec<IndexedChunk>>,
    embedding_model: Box<dyn EmbeddingModel>,
}

impl MemoryVectorIndex {
    pub fn new(embedding_model: Box<dyn EmbeddingModel>) -> Self {
        Self {
            chunks: RwLock::new(Vec::new()),
            embedding_model,
        }
    }

    /// 切块并嵌入一篇文档，返回新增切块数
    pub async fn add_document(&self, text: &str) -> Result<usize> {
        let pieces = split_text(text, CHUNK_CHARS, CHUNK_OVERLAP);
        let mut indexed = Vec::with_capacity(pieces.len());

        for piece in pieces {
            let embedding = self.embedding_model.encode(&piece).await?;
            indexed.push(IndexedChunk {
                text: piece,
                embedding,
            });
        }

        let added = indexed.len();
        self.chunks.write().extend(indexed);
        Ok(added)
    }

    /// 读入目录下所有 .txt 文档，返回索引的切块总数
    pub async fn ingest_dir(&self, dir: &Path) -> Result<usize> {
        if !dir.is_dir() {
            warn!(path = %dir.display(), "docs directory not found, semantic index starts empty");
            return Ok(0);
        }

        let mut total = 0;
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("txt") {
                continue;
            }
            let text = std::fs::read_to_string(&path)?;
            total += self.add_document(&text).await?;
        }

        info!(chunks = total, "semantic index built");
        Ok(total)
    }

    pub fn len(&self) -> usize {
        self.chunks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.read().is_empty()
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }

        dot_product / (norm_a * norm_b)
    }
}

#[async_trait]
impl SemanticIndex for MemoryVectorIndex {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<String>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = self.embedding_model.encode(query).await?;
        if query_embedding.len() != self.embedding_model.dimension() {
            return Err(AppError::Embedding(format!(
                "query embedding has dimension {}, expected {}",
                query_embedding.len(),
                self.embedding_model.dimension()
            )));
        }

        let chunks = self.chunks.read();
        let mut scored: Vec<(f32, &IndexedChunk)> = chunks
            .iter()
            .map(|c| (Self::cosine_similarity(&query_embedding, &c.embedding), c))
            .filter(|(score, _)| *score > 0.0)
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        Ok(scored.into_iter().map(|(_, c)| c.text.clone()).collect())
    }
}

/// 按字符窗口切块，窗口间保留重叠
fn split_text(text: &str, chunk_chars: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }

    let step = chunk_chars.saturating_sub(overlap).max(1);
    let mut pieces = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + chunk_chars).min(chars.len());
        let piece: String = chars[start..end].iter().collect();
        let piece = piece.trim().to_string();
        if !piece.is_empty() {
            pieces.push(piece);
        }
        if end == chars.len() {
            break;
        }
        start += step;
    }

    pieces
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::embedding::SimpleEmbeddingModel;

    fn index() -> MemoryVectorIndex {
        MemoryVectorIndex::new(Box::new(SimpleEmbeddingModel::new(128)))
    }

    #[tokio::test]
    async fn test_search_returns_most_similar_chunk_first() {
        let index = index();
        index
            .add_document("phân bón hữu cơ giúp cải tạo đất trồng")
            .await
            .unwrap();
        index
            .add_document("lịch gieo trồng vụ đông xuân ở miền bắc")
            .await
            .unwrap();

        let results = index.search("phân bón hữu cơ", 1).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].contains("phân bón hữu cơ"));
    }

    #[tokio::test]
    async fn test_search_empty_index() {
        let index = index();
        assert!(index.search("bất kỳ", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_k_zero() {
        let index = index();
        index.add_document("một đoạn văn").await.unwrap();
        assert!(index.search("đoạn văn", 0).await.unwrap().is_empty());
    }

    #[test]
    fn test_split_text_overlap() {
        let text = "a".repeat(1200);
        let pieces = split_text(&text, 500, 50);

        assert_eq!(pieces.len(), 3);
        assert_eq!(pieces[0].chars().count(), 500);
        assert_eq!(pieces[1].chars().count(), 500);
        // Last window holds the remainder plus the overlap carried forward.
        assert_eq!(pieces[2].chars().count(), 300);
    }

    #[test]
    fn test_split_text_short_input() {
        let pieces = split_text("ngắn", 500, 50);
        assert_eq!(pieces, vec!["ngắn".to_string()]);
    }
}

//! 内存目录实现
//!
//! 启动时从爬虫导出的 JSON 数据文件加载，全程只读。

use async_trait::async_trait;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use super::{CatalogStore, EXPERT_CUES, score_product};
use crate::error::{AppError, Result};
use crate::models::{Expert, Organization, Product};

/// 目录数据文件格式
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogData {
    pub products: Vec<Product>,
    pub organization: Option<Organization>,
    pub experts: Vec<Expert>,
}

/// 内存目录存储
pub struct MemoryCatalogStore {
    products: Vec<Product>,
    organization: Option<Organization>,
    experts: Vec<Expert>,
}

impl MemoryCatalogStore {
    pub fn new(data: CatalogData) -> Self {
        Self {
            products: data.products,
            organization: data.organization,
            experts: data.experts,
        }
    }

    /// 从 JSON 数据文件加载
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| AppError::Retrieval(format!("catalog file {}: {}", path.display(), e)))?;
        let data: CatalogData = serde_json::from_str(&raw)?;
        info!(
            products = data.products.len(),
            experts = data.experts.len(),
            has_organization = data.organization.is_some(),
            "catalog loaded"
        );
        Ok(Self::new(data))
    }

    /// 创建空目录（数据文件缺失时的降级）
    pub fn empty() -> Self {
        Self::new(CatalogData::default())
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalogStore {
    async fn find_product_by_code(&self, code: &str) -> Result<Option<Product>> {
        Ok(self.products.iter().find(|p| p.code == code).cloned())
    }

    async fn search_products_by_text(&self, query: &str) -> Result<Vec<Product>> {
        let query_lower = query.to_lowercase();

        let mut scored: Vec<(u32, &Product)> = self
            .products
            .iter()
            .map(|p| (score_product(&query_lower, p), p))
            .filter(|(score, _)| *score > 0)
            .collect();

        // Equal scores resolve to the lexicographically smallest code so the
        // ranking does not depend on load order.
        scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.code.cmp(&b.1.code)));

        Ok(scored.into_iter().map(|(_, p)| p.clone()).collect())
    }

    async fn get_organization(&self) -> Result<Option<Organization>> {
        Ok(self.organization.clone())
    }

    async fn list_experts(&self, name_query: Option<&str>) -> Result<Vec<Expert>> {
        let Some(query) = name_query else {
            return Ok(self.experts.iter().take(2).cloned().collect());
        };

        let query_lower = query.to_lowercase();
        let matched: Vec<Expert> = self
            .experts
            .iter()
            .filter(|e| query_lower.contains(&e.name.to_lowercase()))
            .cloned()
            .collect();

        if !matched.is_empty() {
            return Ok(matched);
        }

        // Generic expert language with no name match still gets the first two.
        if EXPERT_CUES.iter().any(|cue| query_lower.contains(cue)) {
            return Ok(self.experts.iter().take(2).cloned().collect());
        }

        Ok(Vec::new())
    }

    async fn sample_products(&self, n: usize) -> Result<Vec<Product>> {
        let mut rng = rand::rng();
        Ok(self
            .products
            .choose_multiple(&mut rng, n)
            .cloned()
            .collect())
    }

    async fn count_products(&self) -> Result<usize> {
        Ok(self.products.len())
    }
}

/// 创建目录存储；数据文件缺失时退化为空目录
pub fn create_catalog_store(path: &Path) -> Box<dyn CatalogStore> {
    if path.exists() {
        match MemoryCatalogStore::load(path) {
            Ok(store) => return Box::new(store),
            Err(e) => {
                tracing::warn!(error = %e, "failed to load catalog, starting empty");
            }
        }
    } else {
        tracing::warn!(path = %path.display(), "catalog file not found, starting empty");
    }
    Box::new(MemoryCatalogStore::empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(code: &str, name: &str) -> Product {
        Product {
            code: code.into(),
            name: name.into(),
            url: Some(format!("https://example.vn/{}", code.to_lowercase())),
            ingredients: Some("N-P-K".into()),
            usage: Some("Pha loãng rồi tưới gốc".into()),
            category: Some("Phân bón".into()),
        }
    }

    fn store() -> MemoryCatalogStore {
        MemoryCatalogStore::new(CatalogData {
            products: vec![
                product("NPK01", "Phân bón NPK cao cấp"),
                product("HCVS2", "Phân bón hữu cơ vi sinh"),
                product("ABC123", "Phân bón lá ABC"),
            ],
            organization: Some(Organization {
                name: Some("Nông Nghiệp Xanh".into()),
                hotline: Some("0900 123 456".into()),
                ..Default::default()
            }),
            experts: vec![
                Expert {
                    name: "Nguyễn Văn An".into(),
                    title: Some("Viện trưởng".into()),
                    degree: Some("GS.TS".into()),
                    bio: None,
                    profile_url: None,
                },
                Expert {
                    name: "Trần Thị Bình".into(),
                    title: Some("Chuyên gia thổ nhưỡng".into()),
                    degree: Some("TS".into()),
                    bio: Some("20 năm kinh nghiệm".into()),
                    profile_url: None,
                },
                Expert {
                    name: "Lê Văn Cường".into(),
                    title: None,
                    degree: Some("ThS".into()),
                    bio: None,
                    profile_url: None,
                },
            ],
        })
    }

    #[tokio::test]
    async fn test_code_in_query_wins_over_name_overlap() {
        let store = store();
        let results = store
            .search_products_by_text("cách dùng phân bón ABC123 thế nào")
            .await
            .unwrap();
        assert_eq!(results[0].code, "ABC123");
    }

    #[tokio::test]
    async fn test_tie_breaks_by_lexicographic_code() {
        let store = MemoryCatalogStore::new(CatalogData {
            products: vec![
                product("ZZZ9", "Phân bón đặc biệt"),
                product("AAA1", "Phân bón đặc biệt"),
            ],
            organization: None,
            experts: vec![],
        });

        let results = store
            .search_products_by_text("phân bón đặc biệt")
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].code, "AAA1");
    }

    #[tokio::test]
    async fn test_no_match_returns_empty() {
        let store = store();
        let results = store
            .search_products_by_text("thời tiết ngày mai ra sao")
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_experts_filtered_by_name_substring() {
        let store = store();
        let experts = store
            .list_experts(Some("tiểu sử của chuyên gia Trần Thị Bình"))
            .await
            .unwrap();
        assert_eq!(experts.len(), 1);
        assert_eq!(experts[0].name, "Trần Thị Bình");
    }

    #[tokio::test]
    async fn test_generic_expert_question_returns_first_two() {
        let store = store();
        let experts = store
            .list_experts(Some("bên bạn có chuyên gia nào không"))
            .await
            .unwrap();
        assert_eq!(experts.len(), 2);
        assert_eq!(experts[0].name, "Nguyễn Văn An");
    }

    #[tokio::test]
    async fn test_sample_bounded_by_catalog_size() {
        let store = store();
        let sampled = store.sample_products(10).await.unwrap();
        assert_eq!(sampled.len(), 3);
    }
}

//! 结构化目录模块
//!
//! 产品/组织/专家三类实体的只读查询门面。写入由外部导入脚本负责。

pub mod memory;

pub use memory::{CatalogData, MemoryCatalogStore, create_catalog_store};

use async_trait::async_trait;
use std::collections::HashSet;

use crate::error::Result;
use crate::models::{Expert, Organization, Product};

/// Cues that mark a query as asking about the expert team. Checked lowercased.
pub const EXPERT_CUES: [&str; 2] = ["chuyên gia", "bác sĩ"];

/// 结构化目录查询接口
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// 按产品编码精确查找
    async fn find_product_by_code(&self, code: &str) -> Result<Option<Product>>;

    /// 对产品做模糊文本检索，按得分降序返回
    async fn search_products_by_text(&self, query: &str) -> Result<Vec<Product>>;

    /// 获取组织记录（至多一条）
    async fn get_organization(&self) -> Result<Option<Organization>>;

    /// 列出专家；给定查询时按姓名子串过滤
    async fn list_experts(&self, name_query: Option<&str>) -> Result<Vec<Expert>>;

    /// 随机抽取 n 条产品用于推荐
    async fn sample_products(&self, n: usize) -> Result<Vec<Product>>;

    /// 产品总数
    async fn count_products(&self) -> Result<usize>;
}

/// Fuzzy relevance score for one product against a query.
///
/// +10 when the product code appears literally in the lowercased query, plus
/// one point per case-insensitive whole-word overlap between the query and
/// the product name.
pub fn score_product(query_lower: &str, product: &Product) -> u32 {
    let mut score = 0;

    if query_lower.contains(&product.code.to_lowercase()) {
        score += 10;
    }

    let query_words: HashSet<&str> = query_lower.split_whitespace().collect();
    let name_lower = product.name.to_lowercase();
    let name_words: HashSet<&str> = name_lower.split_whitespace().collect();
    score += query_words.intersection(&name_words).count() as u32;

    score
}

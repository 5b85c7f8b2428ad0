//! 非生成式短路处理
//!
//! 显式的 (谓词, 处理器) 有序列表：日期换算、能力说明、目录
//! 统计等轮次直接合成全文，不经过生成器，但仍走同一事件信封
//! 并照常落一轮历史。

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

use crate::catalog::CatalogStore;
use crate::error::{AppError, Result};

/// 阴阳历换算协作方（外部实现）
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CalendarConverter: Send + Sync {
    /// 阴历转阳历，返回可直接回复用户的文本
    async fn lunar_to_solar(&self, date: &str) -> Result<String>;

    /// 阳历转阴历
    async fn solar_to_lunar(&self, date: &str) -> Result<String>;
}

/// 单个短路处理器
#[async_trait]
pub trait SpecialHandler: Send + Sync {
    fn name(&self) -> &'static str;

    /// 谓词：是否接管这条查询（入参已转小写）
    fn matches(&self, query_lower: &str) -> bool;

    /// 合成完整应答文本
    async fn handle(&self, query: &str) -> Result<String>;
}

/// 按固定优先级顺序分发的短路路由
pub struct SpecialRouter {
    handlers: Vec<Box<dyn SpecialHandler>>,
}

impl SpecialRouter {
    pub fn new(handlers: Vec<Box<dyn SpecialHandler>>) -> Self {
        Self { handlers }
    }

    /// 标准路由：能力说明、目录统计
    pub fn standard(catalog: Arc<dyn CatalogStore>) -> Self {
        Self::new(vec![
            Box::new(CapabilityHandler),
            Box::new(CatalogCountHandler { catalog }),
        ])
    }

    /// 在最高优先级挂接日期换算处理器
    pub fn with_calendar(mut self, converter: Arc<dyn CalendarConverter>) -> Self {
        self.handlers
            .insert(0, Box::new(DateConversionHandler { converter }));
        self
    }

    /// 第一个谓词命中的处理器接管；都不命中返回 None
    pub async fn dispatch(&self, query: &str) -> Option<(&'static str, Result<String>)> {
        let query_lower = query.to_lowercase();
        for handler in &self.handlers {
            if handler.matches(&query_lower) {
                return Some((handler.name(), handler.handle(query).await));
            }
        }
        None
    }
}

static DATE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{1,2}/\d{1,2}/\d{4}").expect("date pattern"));

/// 阴阳历换算
struct DateConversionHandler {
    converter: Arc<dyn CalendarConverter>,
}

#[async_trait]
impl SpecialHandler for DateConversionHandler {
    fn name(&self) -> &'static str {
        "date_conversion"
    }

    fn matches(&self, query_lower: &str) -> bool {
        (query_lower.contains("âm lịch") || query_lower.contains("dương lịch"))
            && DATE_PATTERN.is_match(query_lower)
    }

    async fn handle(&self, query: &str) -> Result<String> {
        let date = DATE_PATTERN
            .find(query)
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| AppError::Protocol("no date in conversion request".into()))?;

        // A query mentioning the lunar calendar names a lunar date to convert.
        if query.to_lowercase().contains("âm lịch") {
            self.converter.lunar_to_solar(&date).await
        } else {
            self.converter.solar_to_lunar(&date).await
        }
    }
}

/// 能力说明
struct CapabilityHandler;

const CAPABILITY_TERMS: &[&str] = &[
    "bạn làm được gì",
    "bạn có thể làm gì",
    "giúp được gì",
    "hỗ trợ được gì",
    "chức năng của bạn",
];

#[async_trait]
impl SpecialHandler for CapabilityHandler {
    fn name(&self) -> &'static str {
        "capability"
    }

    fn matches(&self, query_lower: &str) -> bool {
        CAPABILITY_TERMS.iter().any(|term| query_lower.contains(term))
    }

    async fn handle(&self, _query: &str) -> Result<String> {
        Ok("Dạ, em có thể hỗ trợ anh/chị tra cứu thông tin công ty, tìm hiểu sản phẩm \
            (thành phần, cách dùng, liều lượng), gợi ý sản phẩm phù hợp, giải đáp kỹ thuật \
            trồng trọt dựa trên tài liệu của công ty, và trò chuyện tự nhiên ạ. \
            Anh/chị cứ đặt câu hỏi, em sẽ trả lời ngay ạ."
            .to_string())
    }
}

/// 目录统计
struct CatalogCountHandler {
    catalog: Arc<dyn CatalogStore>,
}

#[async_trait]
impl SpecialHandler for CatalogCountHandler {
    fn name(&self) -> &'static str {
        "catalog_count"
    }

    fn matches(&self, query_lower: &str) -> bool {
        query_lower.contains("bao nhiêu") && query_lower.contains("sản phẩm")
    }

    async fn handle(&self, _query: &str) -> Result<String> {
        let count = self.catalog.count_products().await?;
        Ok(format!(
            "Dạ, hiện hệ thống đang có {} sản phẩm ạ. Anh/chị có thể hỏi tên hoặc mã \
             sản phẩm cụ thể, hoặc nhắn \"tư vấn sản phẩm\" để em gợi ý ạ.",
            count
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogData, MemoryCatalogStore};
    use crate::models::Product;

    fn catalog_with_products(count: usize) -> Arc<MemoryCatalogStore> {
        let products = (0..count)
            .map(|i| Product {
                code: format!("SP{:03}", i),
                name: format!("Sản phẩm {}", i),
                url: None,
                ingredients: None,
                usage: None,
                category: None,
            })
            .collect();
        Arc::new(MemoryCatalogStore::new(CatalogData {
            products,
            organization: None,
            experts: vec![],
        }))
    }

    #[tokio::test]
    async fn test_unmatched_query_is_not_short_circuited() {
        let router = SpecialRouter::standard(Arc::new(MemoryCatalogStore::empty()));
        assert!(router.dispatch("phân bón nào tốt cho lúa").await.is_none());
    }

    #[tokio::test]
    async fn test_catalog_count_summary() {
        let router = SpecialRouter::standard(catalog_with_products(42));
        let (name, reply) = router
            .dispatch("bên bạn có bao nhiêu sản phẩm")
            .await
            .unwrap();

        assert_eq!(name, "catalog_count");
        assert!(reply.unwrap().contains("42"));
    }

    #[tokio::test]
    async fn test_capability_guidance() {
        let router = SpecialRouter::standard(Arc::new(MemoryCatalogStore::empty()));
        let (name, reply) = router.dispatch("bạn làm được gì").await.unwrap();

        assert_eq!(name, "capability");
        assert!(reply.unwrap().contains("tra cứu"));
    }

    #[tokio::test]
    async fn test_lunar_date_routes_to_lunar_to_solar() {
        let mut converter = MockCalendarConverter::new();
        converter
            .expect_lunar_to_solar()
            .withf(|date| date == "15/7/2025")
            .returning(|_| Ok("Dạ, ngày 15/7/2025 âm lịch là 7/9/2025 dương lịch ạ.".into()));

        let router = SpecialRouter::standard(Arc::new(MemoryCatalogStore::empty()))
            .with_calendar(Arc::new(converter));

        let (name, reply) = router
            .dispatch("ngày 15/7/2025 âm lịch là ngày dương nào")
            .await
            .unwrap();

        assert_eq!(name, "date_conversion");
        assert!(reply.unwrap().contains("7/9/2025"));
    }

    #[tokio::test]
    async fn test_calendar_outranks_catalog_count() {
        let mut converter = MockCalendarConverter::new();
        converter
            .expect_solar_to_lunar()
            .returning(|_| Ok("kết quả".into()));

        let router = SpecialRouter::standard(Arc::new(MemoryCatalogStore::empty()))
            .with_calendar(Arc::new(converter));

        // Mentions both a date and products; the ordered list decides.
        let (name, _) = router
            .dispatch("ngày 2/9/2025 dương lịch có bao nhiêu sản phẩm khuyến mãi")
            .await
            .unwrap();
        assert_eq!(name, "date_conversion");
    }
}

//! 混合上下文解析服务
//!
//! 按意图在结构化目录与语义索引之间组装有界上下文，带回退与
//! 跨轮次实体携带规则。任何单个协作方失败都只当作该阶段无结果，
//! 不中断其余阶段。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::catalog::{CatalogStore, EXPERT_CUES};
use crate::config::RetrievalConfig;
use crate::error::Result;
use crate::index::SemanticIndex;
use crate::models::{Expert, Organization, Product};
use crate::services::intent::{Intent, IntentClassifier, ORG_TERMS};

/// 一轮检索的产物，三种结果必须对调用方可区分
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedContext {
    /// 组装出了上下文块
    Grounded {
        text: String,
        product_code: Option<String>,
    },
    /// 结构化意图落空，回复兜底消息
    Fallback { text: String },
    /// 无任何约束，让模型自由对话
    Open,
}

impl ResolvedContext {
    /// 提示词中使用的上下文文本；Open 为空串
    pub fn context_text(&self) -> &str {
        match self {
            ResolvedContext::Grounded { text, .. } => text,
            ResolvedContext::Fallback { text } => text,
            ResolvedContext::Open => "",
        }
    }

    /// 本轮解析出的产品编码
    pub fn product_code(&self) -> Option<&str> {
        match self {
            ResolvedContext::Grounded { product_code, .. } => product_code.as_deref(),
            _ => None,
        }
    }
}

pub struct HybridContextResolver {
    classifier: Arc<dyn IntentClassifier>,
    catalog: Arc<dyn CatalogStore>,
    index: Arc<dyn SemanticIndex>,
    config: RetrievalConfig,
}

impl HybridContextResolver {
    pub fn new(
        classifier: Arc<dyn IntentClassifier>,
        catalog: Arc<dyn CatalogStore>,
        index: Arc<dyn SemanticIndex>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            classifier,
            catalog,
            index,
            config,
        }
    }

    /// Run one collaborator call with the stage timeout; a failure or timeout
    /// degrades to "stage found nothing".
    async fn stage<T, F>(&self, name: &str, fut: F) -> Option<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(Duration::from_millis(self.config.stage_timeout_ms), fut).await
        {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                warn!(stage = name, error = %e, "retrieval stage failed");
                None
            }
            Err(_) => {
                warn!(stage = name, "retrieval stage timed out");
                None
            }
        }
    }

    /// 解析一轮查询；永不出错
    pub async fn resolve(&self, query: &str, entity_memory: Option<&str>) -> ResolvedContext {
        let query_lower = query.to_lowercase();
        let decision = self.classifier.classify(query).await;
        debug!(intent = ?decision.intent, entity_memory = ?entity_memory, "resolving query");

        // Hotline/website are needed for the fallback message whatever the
        // intent turns out to be.
        let organization = self
            .stage("organization", self.catalog.get_organization())
            .await
            .flatten();
        let hotline = organization
            .as_ref()
            .and_then(|o| o.hotline.clone())
            .unwrap_or_else(|| self.config.fallback_hotline.clone());
        let website = organization
            .as_ref()
            .and_then(|o| o.website.clone())
            .unwrap_or_else(|| self.config.fallback_website.clone());

        let fallback = || ResolvedContext::Fallback {
            text: format!(
                "Xin lỗi bạn, hiện tại trợ lý chưa tìm thấy thông tin này trong hệ thống dữ liệu. \
                 Bạn vui lòng ghé thăm website {} hoặc liên hệ hotline {} để được hỗ trợ nhanh nhất.",
                website, hotline
            ),
        };

        let asking_expert = EXPERT_CUES.iter().any(|cue| query_lower.contains(cue));
        let asking_consultation =
            query_lower.contains("tư vấn") && query_lower.contains("sản phẩm");
        let asking_org_contact = ORG_TERMS.iter().any(|term| query_lower.contains(term));
        let mentions_org_name = organization
            .as_ref()
            .and_then(|o| o.name.as_ref())
            .map(|name| query_lower.contains(&name.to_lowercase()))
            .unwrap_or(false)
            || self
                .config
                .org_aliases
                .iter()
                .any(|alias| query_lower.contains(&alias.to_lowercase()));

        let mut blocks: Vec<String> = Vec::new();

        // Stage 1: organization facts and experts.
        if decision.intent == Intent::OrgFacts
            || mentions_org_name
            || asking_expert
            || asking_org_contact
        {
            if let Some(org) = &organization {
                blocks.push(format_organization_block(org, &website));
            }

            if asking_expert {
                let experts = self
                    .stage("experts", self.catalog.list_experts(Some(query)))
                    .await
                    .unwrap_or_default();
                if experts.is_empty() {
                    blocks.push(
                        "KHÔNG TÌM THẤY CHUYÊN GIA NÀO TRONG HỆ THỐNG TRÙNG KHỚP VỚI CÂU HỎI."
                            .to_string(),
                    );
                } else {
                    blocks.push(format_experts_block(&experts));
                }
            }

            // Strictly organizational intent with nothing found fails fast.
            if decision.intent == Intent::OrgFacts && blocks.is_empty() {
                return fallback();
            }
        }

        // Stage 2: products.
        let mut resolved_code: Option<String> = None;
        let mut product_found = false;

        if asking_consultation {
            let sampled = self
                .stage(
                    "sample_products",
                    self.catalog.sample_products(self.config.suggestion_count),
                )
                .await
                .unwrap_or_default();
            if !sampled.is_empty() {
                blocks.push(format_suggestions_block(&sampled, &hotline));
                product_found = true;
            }
        }

        if !asking_consultation
            && (matches!(decision.intent, Intent::ProductFacts | Intent::Blended)
                || query_lower.contains("sản phẩm"))
        {
            let mut product = self
                .stage(
                    "product_search",
                    self.catalog.search_products_by_text(query),
                )
                .await
                .unwrap_or_default()
                .into_iter()
                .next();

            // Carryover: an elliptical follow-up falls back to the product
            // the session last talked about.
            if product.is_none() {
                if let Some(code) = entity_memory {
                    debug!(code, "fuzzy search empty, retrying with carryover code");
                    product = self
                        .stage("carryover", self.catalog.find_product_by_code(code))
                        .await
                        .flatten();
                }
            }

            if let Some(product) = product {
                product_found = true;
                resolved_code = Some(product.code.clone());
                blocks.push(format_product_block(&product, &hotline));
            }
        }

        // Strictly product intent with nothing assembled fails fast.
        if decision.intent == Intent::ProductFacts && !product_found && blocks.is_empty() {
            return fallback();
        }

        // Stage 3: semantic supplement, regardless of earlier success.
        if matches!(decision.intent, Intent::Semantic | Intent::Blended) {
            let fragments = self
                .stage(
                    "semantic_search",
                    self.index.search(query, self.config.semantic_top_k),
                )
                .await
                .unwrap_or_default();
            if !fragments.is_empty() {
                blocks.push(format!(
                    "Thông tin bổ sung (Mô tả, công dụng, lưu ý):\n{}",
                    fragments.join("\n")
                ));
            }
        }

        if blocks.is_empty() {
            return if decision.intent.is_structured() {
                fallback()
            } else {
                ResolvedContext::Open
            };
        }

        ResolvedContext::Grounded {
            text: blocks.join("\n"),
            product_code: resolved_code,
        }
    }
}

fn labeled(value: &Option<String>) -> &str {
    crate::models::field_or_placeholder(value)
}

fn format_organization_block(org: &Organization, website: &str) -> String {
    format!(
        "DỮ LIỆU CÔNG TY:\n\
         - Tên: {}\n\
         - Hotline: {}\n\
         - Địa chỉ: {}\n\
         - Email: {}\n\
         - Website: {}\n\
         - Slogan: {}\n\
         - Giới thiệu: {}\n\
         - Tầm nhìn: {}\n\
         - Sứ mệnh: {}\n\
         - Giá trị cốt lõi: {}\n\
         - Nhà máy: {}\n\
         - Giấy phép/MST: {}\n\
         Mời xem chi tiết tại: {}",
        labeled(&org.name),
        labeled(&org.hotline),
        labeled(&org.address),
        labeled(&org.email),
        website,
        labeled(&org.slogan),
        org.introduction.as_deref().unwrap_or(""),
        org.vision.as_deref().unwrap_or(""),
        org.mission.as_deref().unwrap_or(""),
        org.core_values.as_deref().unwrap_or(""),
        org.factories.as_deref().unwrap_or(""),
        org.license_tax.as_deref().unwrap_or(""),
        website
    )
}

fn format_experts_block(experts: &[Expert]) -> String {
    let mut block = String::from("DANH SÁCH CHUYÊN GIA (Sử dụng thông tin dưới đây):\n");
    for (idx, expert) in experts.iter().enumerate() {
        block.push_str(&format!(
            "{}. {} {} ({})\n",
            idx + 1,
            expert.degree.as_deref().unwrap_or(""),
            expert.name,
            labeled(&expert.title),
        ));
        if let Some(bio) = &expert.bio {
            block.push_str(&format!("   - Tiểu sử: {}\n", bio));
        }
        if let Some(url) = &expert.profile_url {
            block.push_str(&format!("   - Xem chi tiết: {}\n", url));
        }
    }
    block
}

fn format_suggestions_block(products: &[Product], hotline: &str) -> String {
    let mut block = String::from("GỢI Ý SẢN PHẨM TIÊU BIỂU (Tư vấn):\n");
    for product in products {
        block.push_str(&format!(
            "- Sản phẩm: {} (Mã: {})\n",
            product.name, product.code
        ));
        block.push_str(&format!(
            "  Công dụng/Cách dùng: {}\n",
            labeled(&product.usage)
        ));
        block.push_str(&format!("  Thành phần: {}\n", labeled(&product.ingredients)));
        block.push_str(&format!(
            "  Mời xem chi tiết tại: {}\n",
            labeled(&product.url)
        ));
        block.push_str(&format!("  Hoặc liên hệ hotline: {}\n", hotline));
    }
    block
}

fn format_product_block(product: &Product, hotline: &str) -> String {
    format!(
        "DỮ LIỆU SẢN PHẨM:\n\
         - Tên: {}\n\
         - Mã: {}\n\
         - URL: {}\n\
         - Thành phần: {}\n\
         - Hướng dẫn sử dụng/Liều lượng: {}\n\
         - Loại/Danh mục: {}\n\
         Mời xem chi tiết tại: {}\n\
         Hoặc liên hệ hotline: {}",
        product.name,
        product.code,
        labeled(&product.url),
        labeled(&product.ingredients),
        labeled(&product.usage),
        labeled(&product.category),
        labeled(&product.url),
        hotline
    )
}

/// 创建混合上下文解析器
pub fn create_context_resolver(
    classifier: Arc<dyn IntentClassifier>,
    catalog: Arc<dyn CatalogStore>,
    index: Arc<dyn SemanticIndex>,
    config: RetrievalConfig,
) -> Arc<HybridContextResolver> {
    Arc::new(HybridContextResolver::new(classifier, catalog, index, config))
}

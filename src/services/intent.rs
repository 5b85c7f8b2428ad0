//! 意图分类服务
//!
//! 先走模型分类（宽容解析 JSON 输出），失败时回退到确定性的
//! 关键词启发式。回退路径永不出错。

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::GeneratorConfig;
use crate::error::{AppError, Result};
use crate::generation::{GenerateOptions, TokenGenerator};

/// 检索意图
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// 组织信息（地址、热线、简介等）
    OrgFacts,
    /// 产品结构化字段（成分、用法、编码等）
    ProductFacts,
    /// 描述性/收益类问题，需要语义检索
    Semantic,
    /// 既要结构化字段又要描述信息
    Blended,
}

impl Intent {
    fn from_label(label: &str) -> Option<Self> {
        match label {
            "org_facts" => Some(Intent::OrgFacts),
            "product_facts" => Some(Intent::ProductFacts),
            "semantic" => Some(Intent::Semantic),
            "blended" => Some(Intent::Blended),
            _ => None,
        }
    }

    /// 结构化意图：落空时必须回复兜底消息而不是自由对话
    pub fn is_structured(&self) -> bool {
        matches!(self, Intent::OrgFacts | Intent::ProductFacts)
    }
}

/// 产品字段提示
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldHint {
    Ingredients,
    Usage,
    Code,
    Url,
    Category,
}

impl FieldHint {
    fn from_label(label: &str) -> Option<Self> {
        match label {
            "ingredients" => Some(FieldHint::Ingredients),
            "usage" => Some(FieldHint::Usage),
            "code" => Some(FieldHint::Code),
            "url" => Some(FieldHint::Url),
            "category" => Some(FieldHint::Category),
            _ => None,
        }
    }
}

/// 单次分类决策
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntentDecision {
    pub intent: Intent,
    pub field_hint: Option<FieldHint>,
}

/// 意图分类接口；实现永不出错
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, query: &str) -> IntentDecision;
}

/// 组织联系/介绍类关键词（优先级最高）
pub(crate) static ORG_TERMS: &[&str] = &[
    "địa chỉ",
    "hotline",
    "số điện thoại",
    "sđt",
    "sdt",
    "email",
    "liên hệ",
    "công ty",
    "ở đâu",
    "trụ sở",
    "văn phòng",
    "giấy phép",
    "mst",
    "mã số thuế",
    "nhà máy",
    "slogan",
    "tầm nhìn",
    "sứ mệnh",
];

/// 产品字段关键词，按声明顺序检查
static PRODUCT_FIELD_TERMS: &[(FieldHint, &[&str])] = &[
    (
        FieldHint::Ingredients,
        &["thành phần", "chứa gì", "chất gì", "hàm lượng"],
    ),
    (
        FieldHint::Usage,
        &[
            "liều lượng",
            "cách dùng",
            "hướng dẫn sử dụng",
            "sử dụng thế nào",
            "pha như thế nào",
            "tưới bao nhiêu",
        ],
    ),
    (FieldHint::Code, &["mã sản phẩm", "sku", "mã số"]),
    (FieldHint::Url, &["link", "đường dẫn", "website", "trang web"]),
    (FieldHint::Category, &["loại gì", "nhóm nào", "danh mục"]),
];

/// 描述/收益类关键词
static SEMANTIC_TERMS: &[&str] = &[
    "công dụng",
    "tác dụng",
    "lợi ích",
    "mô tả",
    "là gì",
    "an toàn",
    "lưu ý",
    "độc hại",
    "có tốt không",
];

/// Deterministic keyword fallback. Sets are checked organization-first, then
/// product fields, then semantic, so overlapping terms resolve the same way
/// every time. Unmatched queries default to semantic.
pub fn heuristic_classify(query: &str) -> IntentDecision {
    let q = query.to_lowercase();

    if ORG_TERMS.iter().any(|term| q.contains(term)) {
        return IntentDecision {
            intent: Intent::OrgFacts,
            field_hint: None,
        };
    }

    for (hint, terms) in PRODUCT_FIELD_TERMS {
        if terms.iter().any(|term| q.contains(term)) {
            return IntentDecision {
                intent: Intent::ProductFacts,
                field_hint: Some(*hint),
            };
        }
    }

    if SEMANTIC_TERMS.iter().any(|term| q.contains(term)) {
        return IntentDecision {
            intent: Intent::Semantic,
            field_hint: None,
        };
    }

    IntentDecision {
        intent: Intent::Semantic,
        field_hint: None,
    }
}

/// 分类指令；要求模型只输出含 intent/field_hint 两个键的 JSON
const CLASSIFY_INSTRUCTION: &str = "\
Bạn là bộ phân loại truy vấn cho hệ thống tìm kiếm lai (dữ liệu có cấu trúc + ngữ nghĩa). \
Phân loại câu hỏi dưới đây vào một trong các nhóm sau và trả về JSON:
- org_facts: hỏi thông tin công ty (địa chỉ, hotline, email, website, giới thiệu)
- product_facts: hỏi dữ kiện sản phẩm có cấu trúc (thành phần, liều lượng, mã, url, danh mục)
- semantic: hỏi mô tả/công dụng/lợi ích/lưu ý chung
- blended: vừa cần dữ kiện sản phẩm vừa cần mô tả

Nếu product_facts, hãy suy ra 'field_hint' trong [ingredients, usage, code, url, category] \
nếu phù hợp, nếu không thì để null.
CHỈ TRẢ VỀ JSON hợp lệ với các khóa: intent, field_hint.";

#[derive(Deserialize)]
struct RawDecision {
    intent: Option<String>,
    #[serde(default)]
    field_hint: Option<String>,
}

/// Permissive parse of the model's JSON reply: strip code fences, take the
/// outermost brace span, then deserialize. Missing or unknown `intent` is a
/// parse failure.
fn parse_decision(raw: &str) -> Result<IntentDecision> {
    let mut text = raw.trim();

    if text.starts_with("```") {
        text = text.trim_matches(|c: char| c == '`' || c.is_whitespace());
        if let Some(rest) = text.strip_prefix("json") {
            text = rest.trim_start();
        }
    }

    let start = text
        .find('{')
        .ok_or_else(|| AppError::Classification("no JSON object in reply".into()))?;
    let end = text
        .rfind('}')
        .ok_or_else(|| AppError::Classification("unterminated JSON object".into()))?;
    if end < start {
        return Err(AppError::Classification("malformed JSON span".into()));
    }

    let raw_decision: RawDecision = serde_json::from_str(&text[start..=end])
        .map_err(|e| AppError::Classification(e.to_string()))?;

    let intent = raw_decision
        .intent
        .as_deref()
        .and_then(Intent::from_label)
        .ok_or_else(|| AppError::Classification("missing or unknown intent".into()))?;

    Ok(IntentDecision {
        intent,
        field_hint: raw_decision
            .field_hint
            .as_deref()
            .and_then(FieldHint::from_label),
    })
}

/// 模型优先的意图分类器
pub struct LlmIntentClassifier {
    generator: Arc<dyn TokenGenerator>,
    options: GenerateOptions,
    timeout: Duration,
}

impl LlmIntentClassifier {
    pub fn new(generator: Arc<dyn TokenGenerator>, config: &GeneratorConfig) -> Self {
        Self {
            generator,
            options: GenerateOptions::for_classification(config),
            timeout: Duration::from_secs(config.request_timeout),
        }
    }

    async fn classify_with_model(&self, query: &str) -> Result<IntentDecision> {
        let prompt = format!(
            "<|im_start|>system\n{}<|im_end|>\n<|im_start|>user\n{}\n<|im_end|>\n<|im_start|>assistant\n",
            CLASSIFY_INSTRUCTION, query
        );

        let reply = tokio::time::timeout(
            self.timeout,
            self.generator.complete(&prompt, &self.options),
        )
        .await??;

        parse_decision(&reply)
    }
}

#[async_trait]
impl IntentClassifier for LlmIntentClassifier {
    async fn classify(&self, query: &str) -> IntentDecision {
        match self.classify_with_model(query).await {
            Ok(decision) => decision,
            Err(e) => {
                debug!(error = %e, "model classification failed, using keyword fallback");
                heuristic_classify(query)
            }
        }
    }
}

/// 创建意图分类器
pub fn create_intent_classifier(
    generator: Arc<dyn TokenGenerator>,
    config: &GeneratorConfig,
) -> Box<dyn IntentClassifier> {
    Box::new(LlmIntentClassifier::new(generator, config))
}

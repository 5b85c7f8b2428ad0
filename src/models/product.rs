use serde::{Deserialize, Serialize};

/// 产品实体
///
/// 结构化目录中的一条产品记录，对本服务只读。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    /// 产品编码（唯一）
    pub code: String,

    /// 产品名称
    pub name: String,

    /// 详情页链接
    pub url: Option<String>,

    /// 成分说明
    pub ingredients: Option<String>,

    /// 用法/剂量说明
    pub usage: Option<String>,

    /// 产品分类
    pub category: Option<String>,
}

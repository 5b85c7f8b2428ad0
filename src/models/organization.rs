use serde::{Deserialize, Serialize};

/// 组织实体
///
/// 至多一条逻辑记录；所有字段可缺失，格式化时使用占位文案。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Organization {
    /// 组织名称
    pub name: Option<String>,

    /// 客服热线
    pub hotline: Option<String>,

    /// 办公地址
    pub address: Option<String>,

    /// 联系邮箱
    pub email: Option<String>,

    /// 官方网站
    pub website: Option<String>,

    /// 宣传口号
    pub slogan: Option<String>,

    /// 简介
    pub introduction: Option<String>,

    /// 愿景
    pub vision: Option<String>,

    /// 使命
    pub mission: Option<String>,

    /// 核心价值观
    pub core_values: Option<String>,

    /// 工厂信息
    pub factories: Option<String>,

    /// 营业执照/税号
    pub license_tax: Option<String>,
}

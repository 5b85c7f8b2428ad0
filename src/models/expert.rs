use serde::{Deserialize, Serialize};

/// 专家实体
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Expert {
    /// 姓名
    pub name: String,

    /// 职务
    pub title: Option<String>,

    /// 学位/职称
    pub degree: Option<String>,

    /// 个人简介
    pub bio: Option<String>,

    /// 个人主页链接
    pub profile_url: Option<String>,
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 对话轮次实体
///
/// 一轮完整的用户提问与助手应答，写入后不可变。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    /// 用户消息
    pub user_text: String,

    /// 助手应答（生成中断时为已产出的部分文本）
    pub assistant_text: String,

    /// 写入时间
    pub created_at: DateTime<Utc>,
}

impl Turn {
    /// 创建新轮次
    pub fn new(user_text: &str, assistant_text: &str) -> Self {
        Self {
            user_text: user_text.to_string(),
            assistant_text: assistant_text.to_string(),
            created_at: Utc::now(),
        }
    }
}

//! 出站事件信封
//!
//! 每轮固定顺序：start → chunk… →（可选 error）→ end。同一会话内
//! 严格有序、同一时刻只有一个事件在途。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// 单轮应答的类型化事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// 应答开始
    Start,
    /// 一段完整句子
    Chunk { content: String },
    /// 人类可读的失败原因；其后仍会发送 end
    Error { content: String },
    /// 应答结束
    End,
}

impl ChatEvent {
    pub fn chunk(content: &str) -> Self {
        ChatEvent::Chunk {
            content: content.to_string(),
        }
    }
}

/// 事件出口；生产实现写 WebSocket，测试实现收集到内存
#[async_trait]
pub trait EventSink: Send {
    /// 发送一个事件；Err 表示对端已断开
    async fn emit(&mut self, event: ChatEvent) -> Result<()>;
}

/// 合成应答的固定大小分块（按字符边界切）
pub fn split_fixed_chunks(text: &str, chunk_chars: usize) -> Vec<String> {
    if chunk_chars == 0 {
        return vec![text.to_string()];
    }

    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(chunk_chars)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

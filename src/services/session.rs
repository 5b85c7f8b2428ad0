//! 会话状态管理
//!
//! 每个 session_id 唯一对应一份状态；同一会话的读写经由条目级
//! 异步互斥锁串行化，不同会话完全并行。空闲清扫是协作式的，
//! 活跃会话可能略微超过 TTL 才被回收。

use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::SessionConfig;
use crate::models::Turn;
use crate::observability::AppMetrics;

/// 单个会话的可变状态
#[derive(Debug)]
pub struct SessionState {
    session_id: String,
    turns: VecDeque<Turn>,
    entity_memory: Option<String>,
    last_active: Instant,
    max_turns: usize,
}

impl SessionState {
    fn new(session_id: &str, max_turns: usize) -> Self {
        Self {
            session_id: session_id.to_string(),
            turns: VecDeque::with_capacity(max_turns),
            entity_memory: None,
            last_active: Instant::now(),
            max_turns,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// 追加一轮对话，超窗时严格 FIFO 淘汰最旧轮次
    pub fn append_turn(&mut self, user_text: &str, assistant_text: &str) {
        self.turns.push_back(Turn::new(user_text, assistant_text));
        while self.turns.len() > self.max_turns {
            self.turns.pop_front();
        }
        self.touch();
    }

    /// 覆写实体记忆；一旦设置只会被更新的产品覆盖，不会被清空
    pub fn set_entity_memory(&mut self, product_code: &str) {
        self.entity_memory = Some(product_code.to_string());
    }

    pub fn entity_memory(&self) -> Option<&str> {
        self.entity_memory.as_deref()
    }

    /// 按时间顺序（最旧在前）拷贝当前轮次窗口
    pub fn turns_snapshot(&self) -> Vec<Turn> {
        self.turns.iter().cloned().collect()
    }

    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }

    pub fn touch(&mut self) {
        self.last_active = Instant::now();
    }

    fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_active)
    }
}

/// 会话注册表
///
/// DashMap 分片避免全局锁；条目内的 tokio Mutex 保证同一会话
/// 的处理互斥。
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<Mutex<SessionState>>>,
    max_turns: usize,
    idle_ttl: Duration,
}

impl SessionRegistry {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            max_turns: config.max_turns,
            idle_ttl: Duration::from_secs(config.idle_ttl),
        }
    }

    /// 取得或创建会话状态
    pub fn get_or_create(&self, session_id: &str) -> Arc<Mutex<SessionState>> {
        self.sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                debug!(session_id, "session created");
                Arc::new(Mutex::new(SessionState::new(session_id, self.max_turns)))
            })
            .clone()
    }

    /// 显式移除一个会话
    pub fn remove(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// 回收空闲超过 TTL 的会话，返回回收数量
    ///
    /// 正被处理的会话（锁被持有）一律跳过。
    pub fn expire_idle(&self, now: Instant) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, entry| match entry.try_lock() {
            Ok(state) => state.idle_for(now) < self.idle_ttl,
            Err(_) => true,
        });
        before - self.sessions.len()
    }
}

/// 启动空闲清扫任务；调用方持有句柄并在停机时 abort
pub fn spawn_idle_sweeper(
    registry: Arc<SessionRegistry>,
    interval: Duration,
    metrics: AppMetrics,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let removed = registry.expire_idle(Instant::now());
            if removed > 0 {
                metrics.record_sessions_expired(removed as u64);
                debug!(removed, "idle sessions expired");
            }
        }
    })
}

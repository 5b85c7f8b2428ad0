//! 流式会话处理
//!
//! 每条连接一个独立任务：收消息 → 解析上下文 → 组装提示词 →
//! 流式生成经句子切分推送 → 落一轮历史。任何一轮内的失败都不会
//! 关闭连接；断连会立即取消在途生成并保留已产出的部分文本。

use axum::{
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::app_state::AppState;
use super::events::{ChatEvent, EventSink, split_fixed_chunks};
use crate::error::{AppError, Result};
use crate::generation::prompt;
use crate::services::session::SessionState;
use crate::text::SentenceSegmenter;

/// 入站消息无法当作提问时的澄清回复
const CLARIFICATION_REPLY: &str =
    "Dạ, em chưa hiểu tin nhắn vừa rồi. Anh/chị vui lòng nhập câu hỏi dạng văn bản ạ.";

/// 图像查询需要外部视觉协作方，未接入时的回复
const VISION_UNAVAILABLE_REPLY: &str =
    "Dạ, kênh chẩn đoán hình ảnh hiện chưa sẵn sàng. Anh/chị vui lòng mô tả triệu chứng \
     bằng văn bản hoặc liên hệ hotline của công ty để được hỗ trợ ạ.";

#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    /// 调用方提供的不透明会话标识；缺失即协议错误
    pub session_id: Option<String>,
}

/// WebSocket 升级入口
///
/// 不接受缺省共享会话：没有显式 session_id 的连接直接拒绝。
pub async fn chat_ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
) -> Response {
    let Some(session_id) = params
        .session_id
        .filter(|id| !id.trim().is_empty())
    else {
        return axum::response::IntoResponse::into_response(AppError::Protocol(
            "session_id query parameter is required".into(),
        ));
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, session_id))
}

async fn handle_socket(socket: WebSocket, state: AppState, session_id: String) {
    let connection_id = uuid::Uuid::new_v4().to_string();
    state.metrics.record_connection(1);
    info!(%session_id, %connection_id, "chat connection opened");

    let session = state.registry.get_or_create(&session_id);
    let (sender, mut receiver) = socket.split();
    let mut sink = WsEventSink { sender };

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                // The per-session lock is held for the whole turn so two
                // rapid messages on one session cannot interleave.
                let mut guard = session.lock().await;
                if let Err(e) = process_turn(&state, &mut guard, &mut sink, &text).await {
                    debug!(%session_id, error = %e, "client went away mid-turn");
                    break;
                }
            }
            Ok(Message::Close(_)) => {
                debug!(%session_id, "client initiated close");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                debug!(%session_id, error = %e, "transport error");
                break;
            }
        }
    }

    // The session state itself stays registered; the idle sweep reclaims it
    // after the TTL so a quick reconnect keeps its context.
    state.metrics.record_connection(-1);
    info!(%session_id, %connection_id, "chat connection closed");
}

/// 出站事件写入 WebSocket
pub struct WsEventSink {
    sender: SplitSink<WebSocket, Message>,
}

#[async_trait::async_trait]
impl EventSink for WsEventSink {
    async fn emit(&mut self, event: ChatEvent) -> Result<()> {
        let payload = serde_json::to_string(&event)?;
        self.sender
            .send(Message::Text(payload))
            .await
            .map_err(|e| AppError::Connection(e.to_string()))
    }
}

enum InboundMessage {
    Text(String),
    ImageQuery,
    Invalid,
}

/// 入站既接受裸文本，也接受 {"type": "...", "text": "..."} 结构
fn parse_inbound(raw: &str) -> InboundMessage {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) {
        if let Some(object) = value.as_object() {
            return match object.get("type").and_then(|t| t.as_str()) {
                Some("image_query") => InboundMessage::ImageQuery,
                Some("message") | None => match object.get("text").and_then(|t| t.as_str()) {
                    Some(text) if !text.trim().is_empty() => {
                        InboundMessage::Text(text.to_string())
                    }
                    _ => InboundMessage::Invalid,
                },
                Some(_) => InboundMessage::Invalid,
            };
        }
    }

    if raw.trim().is_empty() {
        InboundMessage::Invalid
    } else {
        InboundMessage::Text(raw.to_string())
    }
}

/// 处理一轮入站消息；Err 仅表示对端断开，其余失败都在轮内消化
pub async fn process_turn<S: EventSink>(
    state: &AppState,
    session: &mut SessionState,
    sink: &mut S,
    raw: &str,
) -> Result<()> {
    session.touch();

    let query = match parse_inbound(raw) {
        InboundMessage::Text(query) => query,
        InboundMessage::ImageQuery => {
            deliver_synthetic(sink, state.synthetic_chunk_chars, VISION_UNAVAILABLE_REPLY)
                .await?;
            session.append_turn(raw, VISION_UNAVAILABLE_REPLY);
            state.metrics.record_turn();
            return Ok(());
        }
        InboundMessage::Invalid => {
            deliver_synthetic(sink, state.synthetic_chunk_chars, CLARIFICATION_REPLY).await?;
            session.append_turn(raw, CLARIFICATION_REPLY);
            state.metrics.record_turn();
            return Ok(());
        }
    };

    // Non-generative short-circuits bypass the generator entirely but keep
    // the same event envelope and still persist a turn.
    if let Some((handler, outcome)) = state.special_router.dispatch(&query).await {
        match outcome {
            Ok(text) => {
                debug!(handler, "query short-circuited");
                deliver_synthetic(sink, state.synthetic_chunk_chars, &text).await?;
                session.append_turn(&query, &text);
                state.metrics.record_special_reply();
            }
            Err(e) => {
                warn!(handler, error = %e, "special handler failed");
                sink.emit(ChatEvent::Start).await?;
                sink.emit(ChatEvent::Error {
                    content: e.to_string(),
                })
                .await?;
                sink.emit(ChatEvent::End).await?;
                session.append_turn(&query, "");
            }
        }
        state.metrics.record_turn();
        return Ok(());
    }

    let entity_memory = session.entity_memory().map(str::to_string);
    let resolved = state.resolver.resolve(&query, entity_memory.as_deref()).await;
    if let Some(code) = resolved.product_code() {
        debug!(session_id = session.session_id(), code, "entity memory updated");
        session.set_entity_memory(code);
    }

    let system_msg = prompt::system_instruction(&state.org_display_name, resolved.context_text());
    let full_prompt = prompt::render_chat_prompt(&system_msg, &session.turns_snapshot(), &query);

    let mut assistant_text = String::new();
    let outcome = stream_reply(state, sink, &full_prompt, &mut assistant_text).await;

    // Persist whatever was produced, even when the client vanished
    // mid-stream, so history stays consistent.
    session.append_turn(&query, &assistant_text);
    state.metrics.record_turn();
    outcome
}

/// 流式生成并按句推送；把已产出文本累积到 assistant_text
async fn stream_reply<S: EventSink>(
    state: &AppState,
    sink: &mut S,
    full_prompt: &str,
    assistant_text: &mut String,
) -> Result<()> {
    sink.emit(ChatEvent::Start).await?;

    let mut segmenter = SentenceSegmenter::new();
    match state
        .generator
        .stream(full_prompt, &state.generate_options)
        .await
    {
        Ok(mut tokens) => {
            let mut failed = false;
            while let Some(item) = tokens.next().await {
                match item {
                    Ok(token) => {
                        for sentence in segmenter.push(&token) {
                            sink.emit(ChatEvent::chunk(&sentence)).await?;
                            push_sentence(assistant_text, &sentence);
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "generation failed mid-stream");
                        state.metrics.record_generation_error();
                        sink.emit(ChatEvent::Error {
                            content: e.to_string(),
                        })
                        .await?;
                        failed = true;
                        break;
                    }
                }
            }

            if !failed {
                if let Some(tail) = segmenter.flush() {
                    sink.emit(ChatEvent::chunk(&tail)).await?;
                    push_sentence(assistant_text, &tail);
                }
            }
        }
        Err(e) => {
            warn!(error = %e, "generator unavailable");
            state.metrics.record_generation_error();
            sink.emit(ChatEvent::Error {
                content: e.to_string(),
            })
            .await?;
        }
    }

    sink.emit(ChatEvent::End).await
}

/// 合成应答：全文立即可得，按固定大小分块走同一信封
async fn deliver_synthetic<S: EventSink>(
    sink: &mut S,
    chunk_chars: usize,
    text: &str,
) -> Result<()> {
    sink.emit(ChatEvent::Start).await?;
    for chunk in split_fixed_chunks(text, chunk_chars) {
        sink.emit(ChatEvent::Chunk { content: chunk }).await?;
    }
    sink.emit(ChatEvent::End).await
}

fn push_sentence(text: &mut String, sentence: &str) {
    if !text.is_empty() {
        text.push(' ');
    }
    text.push_str(sentence);
}

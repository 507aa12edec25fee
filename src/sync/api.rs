//! OpenAI Responses HTTP API 客户端
//!
//! 负责聊天记录相关的所有 HTTP 请求

use crate::sync::types::{
    handle_http_response, ConversationItem, InputItemsResp, ResponseEnvelope, TranscriptEntry,
};
use anyhow::{Context, Result};
use tracing::{debug, info};

/// 默认的 OpenAI API 基础 URL
pub const DEFAULT_API_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI Responses API 客户端
pub struct ResponsesApi {
    client: reqwest::Client,
    api_base_url: String,
}

impl ResponsesApi {
    /// 创建新的 API 客户端
    ///
    /// `client` 应该已经在外部配置好认证头
    pub fn new(client: reqwest::Client, api_base_url: String) -> Self {
        Self {
            client,
            api_base_url,
        }
    }

    /// 使用 API Key 创建客户端（Bearer 认证通过 default_headers 自动添加）
    pub fn with_api_key(api_key: &str, api_base_url: String) -> Result<Self> {
        let client = reqwest::ClientBuilder::new()
            .default_headers({
                let mut headers = reqwest::header::HeaderMap::new();
                headers.insert(
                    reqwest::header::AUTHORIZATION,
                    reqwest::header::HeaderValue::from_str(&format!("Bearer {}", api_key))
                        .context("无效的 API Key")?,
                );
                headers.insert(
                    reqwest::header::CONTENT_TYPE,
                    reqwest::header::HeaderValue::from_static("application/json"),
                );
                headers
            })
            .build()
            .context("创建 HTTP 客户端失败")?;

        Ok(Self::new(client, api_base_url))
    }

    /// 获取会话的输入条目列表（接口按最新在前返回）
    pub async fn get_input_items(&self, response_id: &str) -> Result<InputItemsResp> {
        let url = format!("{}/responses/{}/input_items", self.api_base_url, response_id);
        debug!("[OpenAI]   请求URL: {}", url);

        let response = self.client.get(&url).send().await.context("请求失败")?;
        handle_http_response::<InputItemsResp>(response, "输入条目列表").await
    }

    /// 获取响应信封（output 数组的第一个条目是最新输出）
    pub async fn get_response(&self, response_id: &str) -> Result<ResponseEnvelope> {
        let url = format!("{}/responses/{}", self.api_base_url, response_id);
        debug!("[OpenAI]   请求URL: {}", url);

        let response = self.client.get(&url).send().await.context("请求失败")?;
        handle_http_response::<ResponseEnvelope>(response, "响应详情").await
    }

    /// 拉取并组装一条响应记录对应的完整聊天记录
    ///
    /// 两次读取调用：历史条目列表 + 最新响应信封。任何一步失败（网络错误、
    /// 非 2xx 状态、payload 结构异常）都视为本次拉取整体失败，不会返回部分结果。
    /// 本方法内部不做重试，由调用方决定下个 tick 是否重新处理。
    pub async fn fetch_chat_history(&self, response_id: &str) -> Result<Vec<TranscriptEntry>> {
        info!("[OpenAI] ⏳ 拉取聊天记录: responseID={}", response_id);

        let items = self.get_input_items(response_id).await?;
        let envelope = self.get_response(response_id).await?;

        let transcript = assemble_transcript(items, envelope)?;
        info!(
            "[OpenAI] ✅ 聊天记录组装完成: responseID={}, 共 {} 条消息",
            response_id,
            transcript.len()
        );
        Ok(transcript)
    }
}

/// 组装完整聊天记录：历史条目恢复时间正序后，追加信封中的最新输出
///
/// 任何条目缺少内容块都会让整次组装失败，不产出半截记录
pub fn assemble_transcript(
    items: InputItemsResp,
    envelope: ResponseEnvelope,
) -> Result<Vec<TranscriptEntry>> {
    let mut transcript = Vec::with_capacity(items.data.len() + 1);

    // 接口按最新在前返回，落库前恢复时间正序
    for item in items.data.into_iter().rev() {
        transcript.push(project_item(item)?);
    }

    let last = envelope
        .output
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("响应信封缺少输出条目"))?;
    transcript.push(project_item(last)?);

    Ok(transcript)
}

/// 把一个会话条目投影为 role + 首个内容块文本
fn project_item(item: ConversationItem) -> Result<TranscriptEntry> {
    let ConversationItem { role, content } = item;
    let block = content
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("条目缺少内容块: role={}", role))?;
    Ok(TranscriptEntry {
        role,
        content: block.text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn items(value: serde_json::Value) -> InputItemsResp {
        serde_json::from_value(value).unwrap()
    }

    fn envelope(value: serde_json::Value) -> ResponseEnvelope {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn assembles_reversed_items_then_latest_output() {
        let items = items(json!({
            "data": [
                { "role": "user", "content": [{ "text": "b" }] },
                { "role": "assistant", "content": [{ "text": "a" }] },
            ]
        }));
        let envelope = envelope(json!({
            "output": [{ "role": "assistant", "content": [{ "text": "c" }] }]
        }));

        let transcript = assemble_transcript(items, envelope).unwrap();
        assert_eq!(
            transcript,
            vec![
                TranscriptEntry {
                    role: "assistant".to_string(),
                    content: "a".to_string()
                },
                TranscriptEntry {
                    role: "user".to_string(),
                    content: "b".to_string()
                },
                TranscriptEntry {
                    role: "assistant".to_string(),
                    content: "c".to_string()
                },
            ]
        );
    }

    #[test]
    fn empty_history_keeps_only_latest_output() {
        let items = items(json!({ "data": [] }));
        let envelope = envelope(json!({
            "output": [{ "role": "assistant", "content": [{ "text": "你好" }] }]
        }));

        let transcript = assemble_transcript(items, envelope).unwrap();
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript[0].content, "你好");
    }

    #[test]
    fn item_with_empty_content_fails_whole_assembly() {
        let items = items(json!({
            "data": [
                { "role": "user", "content": [] },
                { "role": "assistant", "content": [{ "text": "a" }] },
            ]
        }));
        let envelope = envelope(json!({
            "output": [{ "role": "assistant", "content": [{ "text": "c" }] }]
        }));

        assert!(assemble_transcript(items, envelope).is_err());
    }

    #[test]
    fn envelope_without_output_items_fails_whole_assembly() {
        let items = items(json!({
            "data": [{ "role": "user", "content": [{ "text": "b" }] }]
        }));
        let envelope = envelope(json!({ "output": [] }));

        assert!(assemble_transcript(items, envelope).is_err());
    }
}

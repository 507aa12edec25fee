//! OpenAI Responses API 的线上数据结构与通用响应处理

use serde::{Deserialize, Serialize};

/// 输入条目列表响应（`GET /responses/{id}/input_items`）
///
/// 接口按最新在前返回条目，组装聊天记录前需要恢复时间正序
#[derive(Debug, Deserialize)]
pub struct InputItemsResp {
    /// data 字段可能缺失，缺失时视为空列表
    #[serde(default)]
    pub data: Vec<ConversationItem>,
}

/// 响应信封（`GET /responses/{id}`）
///
/// 只关心 output 数组，其中第一个条目是本轮的最新输出
#[derive(Debug, Deserialize)]
pub struct ResponseEnvelope {
    pub output: Vec<ConversationItem>,
}

/// 会话条目（输入条目与信封输出条目共用同一形状）
///
/// role 与 content 缺失视为 payload 结构异常，整个反序列化失败
#[derive(Debug, Clone, Deserialize)]
pub struct ConversationItem {
    pub role: String,
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

/// 条目内容块，只取其中的文本部分
#[derive(Debug, Clone, Deserialize)]
pub struct ContentBlock {
    pub text: String,
}

/// 落库用的聊天记录条目，role/content 两列的有序序列
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: String,
    pub content: String,
}

/// 通用 HTTP 响应处理函数：检查状态码并反序列化响应 body
/// 所有 API 都可以共用此方法
pub async fn handle_http_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    operation_name: &str,
) -> anyhow::Result<T> {
    use anyhow::Context;
    use tracing::{debug, error};

    let status = response.status();

    // 读取 body bytes（只能读取一次）
    let body_bytes = response.bytes().await.context("读取响应 body 失败")?;
    let body_str = String::from_utf8_lossy(&body_bytes);
    debug!("[HTTP] {}响应 Body: {}", operation_name, body_str);

    if !status.is_success() {
        error!(
            "[HTTP] {}请求失败，HTTP状态: {}, 响应: {}",
            operation_name, status, body_str
        );
        return Err(anyhow::anyhow!("HTTP 错误 {}: {}", status, body_str));
    }
    debug!("[HTTP] {}请求成功，HTTP状态: {}", operation_name, status);

    // 从 bytes 反序列化（因为 body 已经被消费了）
    let parsed: T = serde_json::from_slice(&body_bytes).map_err(|e| {
        error!(
            "[HTTP] {}反序列化失败: {:?}\n原始响应: {}",
            operation_name, e, body_str
        );
        anyhow::anyhow!("反序列化响应失败: {:?}", e)
    })?;

    Ok(parsed)
}

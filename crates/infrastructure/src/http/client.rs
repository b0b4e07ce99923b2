use std::sync::Arc;

use choreo_core::{ChoreoError, ChoreoResult, CONSTRUCTOR_METHOD};
use choreo_domain::{
    CompositionCodec, OperationTarget, SequentialComposition, TaggedValue, TextCompositionCodec, WireState,
};
use serde::Serialize;
use tracing::{debug, error};

use super::protocol::{input_kwargs, ChoreographyRequest, ChoreographyResponse, CHOREOGRAPHY_PATH};

/// 发送 JSON 请求并解析响应体，任何失败都是传输错误
pub(crate) async fn post_json<T: Serialize + ?Sized>(
    http_client: &reqwest::Client,
    url: &str,
    body: &T,
) -> ChoreoResult<ChoreographyResponse> {
    let response = http_client.post(url).json(body).send().await.map_err(|e| {
        error!("连接 {url} 失败: {e}");
        ChoreoError::Transport(format!("连接 {url} 失败: {e}"))
    })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        error!("{url} 返回 HTTP {status}: {body}");
        return Err(ChoreoError::Transport(format!("{url} 返回 HTTP {status}: {body}")));
    }

    response
        .json::<ChoreographyResponse>()
        .await
        .map_err(|e| ChoreoError::Transport(format!("无法解析 {url} 的响应: {e}")))
}

/// 调用方使用的编排客户端
pub struct ChoreographyClient {
    http_client: reqwest::Client,
    codec: Arc<dyn CompositionCodec>,
}

impl Default for ChoreographyClient {
    fn default() -> Self {
        Self::new(Arc::new(TextCompositionCodec::new()))
    }
}

impl ChoreographyClient {
    pub fn new(codec: Arc<dyn CompositionCodec>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            codec,
        }
    }

    /// 把整个组合交给第一个调用所在的主机
    pub async fn invoke_composition(
        &self,
        composition: &SequentialComposition,
        kwargs: WireState,
    ) -> ChoreoResult<WireState> {
        let first = composition
            .get(0)
            .ok_or_else(|| ChoreoError::malformed("组合为空"))?;
        let target = OperationTarget::parse(first.operation().name())?;
        let host = target.host().ok_or_else(|| {
            ChoreoError::malformed(format!("第一个调用必须带主机限定符: {}", first.operation().name()))
        })?;

        let url = format!("http://{host}{CHOREOGRAPHY_PATH}");
        let request = ChoreographyRequest {
            composition: self.codec.render(composition),
            bound: None,
            kwargs,
        };
        debug!("提交组合到 {url}, 共 {} 个调用", composition.len());
        Ok(post_json(&self.http_client, &url, &request).await?.state)
    }

    /// 单次调用：`id` 为空时调用构造函数
    pub async fn call_operation(
        &self,
        host: &str,
        class: &str,
        id: Option<&str>,
        method: &str,
        args: Vec<TaggedValue>,
    ) -> ChoreoResult<WireState> {
        let url = match id {
            None if method == CONSTRUCTOR_METHOD => format!("http://{host}/{class}/{CONSTRUCTOR_METHOD}"),
            Some(id) if method != CONSTRUCTOR_METHOD => format!("http://{host}/{class}/{id}/{method}"),
            _ => {
                return Err(ChoreoError::malformed(format!(
                    "构造调用不能带实例 id, 实例方法调用必须带 id: {class}::{method}"
                )))
            }
        };
        debug!("单次调用 {url}");
        Ok(post_json(&self.http_client, &url, &input_kwargs(args)).await?.state)
    }
}

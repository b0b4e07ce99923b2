use std::sync::Arc;

use async_trait::async_trait;
use choreo_core::ChoreoResult;
use choreo_domain::{CompositionCodec, ExecutionBound, OutboundCaller, SequentialComposition, WireState};
use tracing::info;

use super::client::post_json;
use super::protocol::{ChoreographyRequest, CHOREOGRAPHY_PATH};

/// 通过 `POST http://{host}/choreography` 把剩余组合交给下游主机
pub struct HttpOutboundCaller {
    http_client: reqwest::Client,
    codec: Arc<dyn CompositionCodec>,
}

impl HttpOutboundCaller {
    pub fn new(codec: Arc<dyn CompositionCodec>) -> Self {
        Self::with_client(reqwest::Client::new(), codec)
    }

    pub fn with_client(http_client: reqwest::Client, codec: Arc<dyn CompositionCodec>) -> Self {
        Self { http_client, codec }
    }
}

#[async_trait]
impl OutboundCaller for HttpOutboundCaller {
    async fn invoke(
        &self,
        address: &str,
        composition: &SequentialComposition,
        bound: ExecutionBound,
        state: WireState,
    ) -> ChoreoResult<WireState> {
        let url = format!("http://{address}{CHOREOGRAPHY_PATH}");
        let request = ChoreographyRequest {
            composition: self.codec.render(composition),
            bound: Some(bound),
            kwargs: state,
        };
        info!("转发到 {url}, 窗口 {bound}, 携带 {} 个变量", request.kwargs.len());
        let response = post_json(&self.http_client, &url, &request).await?;
        Ok(response.state)
    }
}

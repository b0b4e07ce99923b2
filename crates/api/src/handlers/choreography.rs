use axum::{
    extract::{Path, State},
    Json,
};
use choreo_core::CONSTRUCTOR_METHOD;
use choreo_domain::WireState;
use choreo_infrastructure::{ChoreographyRequest, ChoreographyResponse};
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::routes::AppState;

/// 执行组合在给定窗口内的部分
pub async fn execute_choreography(
    State(state): State<AppState>,
    Json(request): Json<ChoreographyRequest>,
) -> ApiResult<Json<ChoreographyResponse>> {
    let composition = state.codec.parse(&request.composition)?;
    info!(
        "收到组合: {} 个调用, 窗口 {:?}",
        composition.len(),
        request.bound.map(|bound| bound.to_string())
    );

    let result = state
        .interpreter
        .execute(&composition, request.bound, request.kwargs)
        .await?;
    Ok(Json(ChoreographyResponse { state: result }))
}

/// 构造新实例，参数为 `i1..iN`
pub async fn construct(
    State(state): State<AppState>,
    Path(class): Path<String>,
    Json(kwargs): Json<WireState>,
) -> ApiResult<Json<ChoreographyResponse>> {
    let result = state
        .interpreter
        .execute_bare(&class, None, CONSTRUCTOR_METHOD, kwargs)
        .await?;
    Ok(Json(ChoreographyResponse { state: result }))
}

/// 在已持久化的实例上调用方法
pub async fn invoke_method(
    State(state): State<AppState>,
    Path((class, id, method)): Path<(String, String, String)>,
    Json(kwargs): Json<WireState>,
) -> ApiResult<Json<ChoreographyResponse>> {
    if method == CONSTRUCTOR_METHOD {
        return Err(ApiError::BadRequest(format!(
            "构造函数不能在已有实例上调用: {class}/{id}"
        )));
    }
    let result = state
        .interpreter
        .execute_bare(&class, Some(&id), &method, kwargs)
        .await?;
    Ok(Json(ChoreographyResponse { state: result }))
}

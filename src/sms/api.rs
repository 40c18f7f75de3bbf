use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Extension, Query},
    response::{IntoResponse, Response},
    Json,
};

use crate::clients::ClientStats;
use crate::error::{ApiResponse, AppResult};
use crate::extractor::{ApiClient, SendingClient};

use super::{
    BulkSendSummary, BulkSmsRequest, DeliveryStatus, LogQueryParams, RequestMetadata,
    SendLogEntry, SmsRequest, SmsService,
};

/// key: sms-api -> send, bulk send, logs, stats
pub async fn send_sms(
    Extension(service): Extension<Arc<SmsService>>,
    SendingClient(client): SendingClient,
    metadata: RequestMetadata,
    payload: Result<Json<SmsRequest>, JsonRejection>,
) -> AppResult<Response> {
    let Json(request) = payload?;
    let result = service.send_single(&client, request, &metadata).await?;

    // Provider rejections are business outcomes, not HTTP errors.
    let body = if result.status == DeliveryStatus::Sent {
        ApiResponse::ok("SMS sent successfully", result)
    } else {
        let reason = result.provider_response.message.clone();
        ApiResponse::failed("SMS failed to send", reason, Some(result))
    };
    Ok(Json(body).into_response())
}

pub async fn send_bulk_sms(
    Extension(service): Extension<Arc<SmsService>>,
    SendingClient(client): SendingClient,
    metadata: RequestMetadata,
    payload: Result<Json<BulkSmsRequest>, JsonRejection>,
) -> AppResult<Json<ApiResponse<BulkSendSummary>>> {
    let Json(request) = payload?;
    let summary = service
        .send_bulk(&client, request.messages, &metadata)
        .await?;
    Ok(Json(ApiResponse::ok("Bulk SMS processing completed", summary)))
}

pub async fn list_logs(
    Extension(service): Extension<Arc<SmsService>>,
    ApiClient(client): ApiClient,
    params: Result<Query<LogQueryParams>, QueryRejection>,
) -> AppResult<Json<ApiResponse<Vec<SendLogEntry>>>> {
    let Query(params) = params?;
    let logs = service.list_logs(&client, params.into()).await?;
    Ok(Json(ApiResponse::ok("Logs retrieved successfully", logs)))
}

pub async fn stats(
    Extension(service): Extension<Arc<SmsService>>,
    ApiClient(client): ApiClient,
) -> Json<ApiResponse<ClientStats>> {
    Json(ApiResponse::ok(
        "Statistics retrieved successfully",
        service.stats(&client),
    ))
}

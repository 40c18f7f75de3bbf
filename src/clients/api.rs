use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Extension, Path, Query,
    },
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::error::{ApiResponse, AppResult};
use crate::extractor::AdminUser;

use super::{
    ClientAdmin, ClientRecord, CreateClient, IssuedCredentials, ListClientsQuery, UpdateClient,
};

/// key: client-admin-api -> basic-auth guarded client management
pub async fn create_client(
    _admin: AdminUser,
    Extension(admin): Extension<Arc<ClientAdmin>>,
    payload: Result<Json<CreateClient>, JsonRejection>,
) -> AppResult<(StatusCode, Json<ApiResponse<IssuedCredentials>>)> {
    let Json(request) = payload?;
    let issued = admin.create(request).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("Client created successfully", issued)),
    ))
}

pub async fn list_clients(
    _admin: AdminUser,
    Extension(admin): Extension<Arc<ClientAdmin>>,
    query: Result<Query<ListClientsQuery>, QueryRejection>,
) -> AppResult<Json<ApiResponse<Vec<ClientRecord>>>> {
    let Query(query) = query?;
    let clients = admin.list(query.is_active).await?;
    Ok(Json(ApiResponse::ok("Clients retrieved successfully", clients)))
}

pub async fn update_client(
    _admin: AdminUser,
    Extension(admin): Extension<Arc<ClientAdmin>>,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateClient>, JsonRejection>,
) -> AppResult<Json<ApiResponse<ClientRecord>>> {
    let Path(id) = id?;
    let Json(changes) = payload?;
    let record = admin.update(id, changes).await?;
    Ok(Json(ApiResponse::ok("Client updated successfully", record)))
}

pub async fn reset_client_usage(
    _admin: AdminUser,
    Extension(admin): Extension<Arc<ClientAdmin>>,
    id: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<ApiResponse<ClientRecord>>> {
    let Path(id) = id?;
    let record = admin.reset_usage(id).await?;
    Ok(Json(ApiResponse::ok("Client usage reset successfully", record)))
}

pub async fn delete_client(
    _admin: AdminUser,
    Extension(admin): Extension<Arc<ClientAdmin>>,
    id: Result<Path<Uuid>, PathRejection>,
) -> AppResult<Json<ApiResponse<()>>> {
    let Path(id) = id?;
    admin.soft_delete(id).await?;
    Ok(Json(ApiResponse::message("Client deleted successfully")))
}

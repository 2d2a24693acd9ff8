use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use uuid::Uuid;

use super::{distribuciones, letras, pedidos, today};
use crate::auth::{require, Action, Principal};
use crate::error::AppResult;
use crate::models::distribucion::{
    CreateDistribucion, DistribucionFilter, DistribucionResponse, UpdateDistribucion,
};
use crate::models::letra::{
    BulkLetras, CreateLetra, LetraFilter, LetraResponse, MarcarPagada, UpdateLetra,
};
use crate::models::pedido::{
    CreatePedido, PedidoFilter, PedidoResponse, PedidoResumen, UpdatePedido,
};
use crate::models::{DistribucionFinal, Letra, Pedido};
use crate::pagination::{PageParams, Paginated};
use crate::router::AppState;

#[derive(Debug, Deserialize)]
pub struct ProximasQuery {
    pub dias: Option<u64>,
}

// Pedidos

pub async fn list_pedidos(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(filter): Query<PedidoFilter>,
    Query(page): Query<PageParams>,
) -> AppResult<Json<Paginated<PedidoResponse>>> {
    require(&principal, Action::Read)?;
    Ok(Json(pedidos::list(&state.db, filter, page).await?))
}

pub async fn get_pedido(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<PedidoResponse>> {
    require(&principal, Action::Read)?;
    Ok(Json(pedidos::get(&state.db, id).await?))
}

pub async fn create_pedido(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<CreatePedido>,
) -> AppResult<(StatusCode, Json<Pedido>)> {
    require(&principal, Action::Write)?;
    Ok((StatusCode::CREATED, Json(pedidos::create(&state.db, body).await?)))
}

pub async fn update_pedido(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdatePedido>,
) -> AppResult<Json<Pedido>> {
    require(&principal, Action::Write)?;
    Ok(Json(pedidos::update(&state.db, id, body).await?))
}

pub async fn delete_pedido(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    require(&principal, Action::Write)?;
    pedidos::delete(&state.db, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/pedidos/:id/asignar`
pub async fn asignar_pedido(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Pedido>> {
    require(&principal, Action::Write)?;
    Ok(Json(pedidos::asignar(&state.db, id).await?))
}

/// `POST /api/pedidos/:id/cancelar`
pub async fn cancelar_pedido(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Pedido>> {
    require(&principal, Action::Write)?;
    Ok(Json(pedidos::cancelar(&state.db, id).await?))
}

/// `GET /api/pedidos/:id/resumen`
pub async fn resumen_pedido(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<PedidoResumen>> {
    require(&principal, Action::Read)?;
    Ok(Json(pedidos::resumen(&state.db, id).await?))
}

// Distribuciones

pub async fn list_distribuciones(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(filter): Query<DistribucionFilter>,
    Query(page): Query<PageParams>,
) -> AppResult<Json<Paginated<DistribucionResponse>>> {
    require(&principal, Action::Read)?;
    Ok(Json(distribuciones::list(&state.db, filter, page).await?))
}

/// `GET /api/distribuciones/pendientes`
pub async fn distribuciones_pendientes(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> AppResult<Json<Vec<DistribucionResponse>>> {
    require(&principal, Action::Read)?;
    Ok(Json(distribuciones::pendientes(&state.db).await?))
}

pub async fn get_distribucion(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
) -> AppResult<Json<DistribucionResponse>> {
    require(&principal, Action::Read)?;
    Ok(Json(distribuciones::get(&state.db, id).await?))
}

pub async fn create_distribucion(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<CreateDistribucion>,
) -> AppResult<(StatusCode, Json<DistribucionFinal>)> {
    require(&principal, Action::Write)?;
    let created = distribuciones::create(&state.db, body, today()).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_distribucion(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateDistribucion>,
) -> AppResult<Json<DistribucionFinal>> {
    require(&principal, Action::Write)?;
    Ok(Json(distribuciones::update(&state.db, id, body).await?))
}

pub async fn delete_distribucion(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    require(&principal, Action::Write)?;
    distribuciones::delete(&state.db, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Letras

pub async fn list_letras(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(filter): Query<LetraFilter>,
    Query(page): Query<PageParams>,
) -> AppResult<Json<Paginated<LetraResponse>>> {
    require(&principal, Action::Read)?;
    Ok(Json(letras::list(&state.db, filter, page, today()).await?))
}

/// `GET /api/letras/proximas?dias=N`
pub async fn letras_proximas(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<ProximasQuery>,
) -> AppResult<Json<Vec<LetraResponse>>> {
    require(&principal, Action::Read)?;
    let dias = query.dias.unwrap_or(letras::DEFAULT_PROXIMAS_DIAS);
    Ok(Json(letras::proximas(&state.db, dias, today()).await?))
}

pub async fn get_letra(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<LetraResponse>> {
    require(&principal, Action::Read)?;
    Ok(Json(letras::get(&state.db, id, today()).await?))
}

pub async fn create_letra(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<CreateLetra>,
) -> AppResult<(StatusCode, Json<Letra>)> {
    require(&principal, Action::Write)?;
    Ok((StatusCode::CREATED, Json(letras::create(&state.db, body, today()).await?)))
}

/// `POST /api/letras/bulk`
pub async fn bulk_letras(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<BulkLetras>,
) -> AppResult<(StatusCode, Json<Vec<Letra>>)> {
    require(&principal, Action::Write)?;
    let created = letras::bulk_create(&state.db, body, today()).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_letra(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateLetra>,
) -> AppResult<Json<Letra>> {
    require(&principal, Action::Write)?;
    Ok(Json(letras::update(&state.db, id, body, today()).await?))
}

pub async fn delete_letra(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    require(&principal, Action::Write)?;
    letras::delete(&state.db, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/letras/:id/pagar`. The body is optional.
pub async fn pagar_letra(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    body: Option<Json<MarcarPagada>>,
) -> AppResult<Json<Letra>> {
    require(&principal, Action::Write)?;
    let input = body.map(|Json(b)| b).unwrap_or_default();
    Ok(Json(letras::marcar_pagada(&state.db, id, input, today()).await?))
}

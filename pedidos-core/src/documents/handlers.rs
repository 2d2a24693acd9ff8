use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use uuid::Uuid;

use super::{facturas, guias};
use crate::auth::{require, Action, Principal};
use crate::error::AppResult;
use crate::ledger::today;
use crate::models::factura::{CreateFactura, DocumentoFilter, FacturaResponse, UpdateFactura};
use crate::models::guia::{CreateGuia, GuiaResponse, UpdateGuia};
use crate::models::{Factura, GuiaDeRemision};
use crate::pagination::{PageParams, Paginated};
use crate::router::AppState;

pub async fn list_guias(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(filter): Query<DocumentoFilter>,
    Query(page): Query<PageParams>,
) -> AppResult<Json<Paginated<GuiaResponse>>> {
    require(&principal, Action::Read)?;
    Ok(Json(guias::list(&state.db, filter, page).await?))
}

pub async fn get_guia(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<GuiaResponse>> {
    require(&principal, Action::Read)?;
    Ok(Json(guias::get(&state.db, id).await?))
}

pub async fn create_guia(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<CreateGuia>,
) -> AppResult<(StatusCode, Json<GuiaDeRemision>)> {
    require(&principal, Action::Write)?;
    Ok((StatusCode::CREATED, Json(guias::create(&state.db, body).await?)))
}

pub async fn update_guia(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateGuia>,
) -> AppResult<Json<GuiaDeRemision>> {
    require(&principal, Action::Write)?;
    Ok(Json(guias::update(&state.db, id, body).await?))
}

pub async fn delete_guia(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    require(&principal, Action::Write)?;
    guias::delete(&state.db, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_facturas(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(filter): Query<DocumentoFilter>,
    Query(page): Query<PageParams>,
) -> AppResult<Json<Paginated<FacturaResponse>>> {
    require(&principal, Action::Read)?;
    Ok(Json(facturas::list(&state.db, filter, page, today()).await?))
}

pub async fn get_factura(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<FacturaResponse>> {
    require(&principal, Action::Read)?;
    Ok(Json(facturas::get(&state.db, id, today()).await?))
}

pub async fn create_factura(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<CreateFactura>,
) -> AppResult<(StatusCode, Json<Factura>)> {
    require(&principal, Action::Write)?;
    Ok((StatusCode::CREATED, Json(facturas::create(&state.db, body).await?)))
}

pub async fn update_factura(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateFactura>,
) -> AppResult<Json<Factura>> {
    require(&principal, Action::Write)?;
    Ok(Json(facturas::update(&state.db, id, body).await?))
}

pub async fn delete_factura(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    require(&principal, Action::Write)?;
    facturas::delete(&state.db, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

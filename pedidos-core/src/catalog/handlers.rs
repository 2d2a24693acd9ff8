use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};

use super::{empresas, proveedores, vendedores};
use crate::auth::{require, Action, Principal};
use crate::error::AppResult;
use crate::models::empresa::{CreateEmpresa, EmpresaResponse, UpdateEmpresa};
use crate::models::proveedor::{CreateProveedor, ProveedorResponse, UpdateProveedor};
use crate::models::vendedor::{CreateVendedor, UpdateVendedor, VendedorResponse};
use crate::models::{Empresa, Proveedor, Vendedor};
use crate::pagination::{PageParams, Paginated};
use crate::router::AppState;

// Empresas

pub async fn list_empresas(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(page): Query<PageParams>,
) -> AppResult<Json<Paginated<EmpresaResponse>>> {
    require(&principal, Action::Read)?;
    Ok(Json(empresas::list(&state.db, page).await?))
}

pub async fn get_empresa(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
) -> AppResult<Json<EmpresaResponse>> {
    require(&principal, Action::Read)?;
    Ok(Json(empresas::get(&state.db, id).await?))
}

pub async fn create_empresa(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<CreateEmpresa>,
) -> AppResult<(StatusCode, Json<Empresa>)> {
    require(&principal, Action::Write)?;
    Ok((StatusCode::CREATED, Json(empresas::create(&state.db, body).await?)))
}

pub async fn update_empresa(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateEmpresa>,
) -> AppResult<Json<Empresa>> {
    require(&principal, Action::Write)?;
    Ok(Json(empresas::update(&state.db, id, body).await?))
}

pub async fn delete_empresa(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    require(&principal, Action::Write)?;
    empresas::delete(&state.db, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Vendedores

pub async fn list_vendedores(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(page): Query<PageParams>,
) -> AppResult<Json<Paginated<VendedorResponse>>> {
    require(&principal, Action::Read)?;
    Ok(Json(vendedores::list(&state.db, page).await?))
}

pub async fn get_vendedor(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
) -> AppResult<Json<VendedorResponse>> {
    require(&principal, Action::Read)?;
    Ok(Json(vendedores::get(&state.db, id).await?))
}

pub async fn create_vendedor(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<CreateVendedor>,
) -> AppResult<(StatusCode, Json<Vendedor>)> {
    require(&principal, Action::Write)?;
    Ok((StatusCode::CREATED, Json(vendedores::create(&state.db, body).await?)))
}

pub async fn update_vendedor(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateVendedor>,
) -> AppResult<Json<Vendedor>> {
    require(&principal, Action::Write)?;
    Ok(Json(vendedores::update(&state.db, id, body).await?))
}

pub async fn delete_vendedor(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    require(&principal, Action::Write)?;
    vendedores::delete(&state.db, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Proveedores

pub async fn list_proveedores(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(page): Query<PageParams>,
) -> AppResult<Json<Paginated<ProveedorResponse>>> {
    require(&principal, Action::Read)?;
    Ok(Json(proveedores::list(&state.db, page).await?))
}

pub async fn get_proveedor(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
) -> AppResult<Json<ProveedorResponse>> {
    require(&principal, Action::Read)?;
    Ok(Json(proveedores::get(&state.db, id).await?))
}

pub async fn create_proveedor(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<CreateProveedor>,
) -> AppResult<(StatusCode, Json<Proveedor>)> {
    require(&principal, Action::Write)?;
    Ok((StatusCode::CREATED, Json(proveedores::create(&state.db, body).await?)))
}

pub async fn update_proveedor(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateProveedor>,
) -> AppResult<Json<Proveedor>> {
    require(&principal, Action::Write)?;
    Ok(Json(proveedores::update(&state.db, id, body).await?))
}

pub async fn delete_proveedor(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    require(&principal, Action::Write)?;
    proveedores::delete(&state.db, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

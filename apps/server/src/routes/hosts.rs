use actix_web::web::{Data, Json, Path, Query, ServiceConfig};
use actix_web::{HttpResponse, delete, get, post, put};
use hostwatch_service::database::{HostDetails, NewHost};
use hostwatch_service::monitoring::HostId;
use hostwatch_service::validation::SegmentFilter;
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

pub fn routes(cfg: &mut ServiceConfig) {
    cfg.service(list_hosts)
        .service(list_segments)
        .service(register_host)
        .service(change_address)
        .service(delete_host)
        .service(get_host)
        .service(update_details);
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    segment: String,
}

#[derive(Debug, Deserialize)]
pub struct AddressBody {
    address: String,
}

#[get("/hosts")]
pub async fn list_hosts(state: Data<AppState>, query: Query<ListQuery>) -> Result<HttpResponse, AppError> {
    let filter = SegmentFilter::parse(&query.segment)?;
    let records = state.repository.list_records(filter).await?;
    Ok(HttpResponse::Ok().json(records))
}

#[get("/segments")]
pub async fn list_segments(state: Data<AppState>) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(state.repository.segments().await?))
}

#[get("/hosts/{address}")]
pub async fn get_host(state: Data<AppState>, address: Path<String>) -> Result<HttpResponse, AppError> {
    let record = state.repository.get_host(&address).await?.ok_or(AppError::NotFound)?;
    Ok(HttpResponse::Ok().json(record))
}

#[post("/hosts")]
pub async fn register_host(state: Data<AppState>, body: Json<NewHost>) -> Result<HttpResponse, AppError> {
    let record = state.repository.register_host(body.into_inner()).await?;
    Ok(HttpResponse::Created().json(record))
}

#[put("/hosts/{address}")]
pub async fn update_details(
    state: Data<AppState>,
    address: Path<String>,
    body: Json<HostDetails>,
) -> Result<HttpResponse, AppError> {
    let record = state.repository.update_details(&address, body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(record))
}

#[put("/hosts/id/{id}/address")]
pub async fn change_address(
    state: Data<AppState>,
    id: Path<HostId>,
    body: Json<AddressBody>,
) -> Result<HttpResponse, AppError> {
    let record = state.repository.change_address(id.into_inner(), &body.address).await?;
    Ok(HttpResponse::Ok().json(record))
}

#[delete("/hosts/id/{id}")]
pub async fn delete_host(state: Data<AppState>, id: Path<HostId>) -> Result<HttpResponse, AppError> {
    let id = id.into_inner();
    if state.repository.delete_host(id).await? {
        tracing::info!(host_id = id, "Deleted host");
        Ok(HttpResponse::NoContent().finish())
    } else {
        Err(AppError::NotFound)
    }
}

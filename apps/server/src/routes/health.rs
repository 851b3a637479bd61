use actix_web::web::ServiceConfig;
use actix_web::{HttpResponse, Responder, get};

pub fn routes(cfg: &mut ServiceConfig) {
    cfg.service(health_route);
}

/// Health check route
/// This route returns no content, the response status is enough.
#[get("/health")]
pub async fn health_route() -> impl Responder {
    HttpResponse::Ok()
}

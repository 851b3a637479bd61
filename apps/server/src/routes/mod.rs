use actix_web::web::ServiceConfig;

mod health;
mod hosts;
mod probe;

/// Register every route of the API
pub fn routes(cfg: &mut ServiceConfig) {
    cfg.configure(health::routes).configure(hosts::routes).configure(probe::routes);
}

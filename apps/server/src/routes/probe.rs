use actix_web::web::{Data, Query, ServiceConfig};
use actix_web::{HttpResponse, post};
use hostwatch_service::monitoring::{TriggerMode, TriggerResponse};
use serde::Deserialize;
use serde_json::json;

use crate::error::AppError;
use crate::state::AppState;

pub fn routes(cfg: &mut ServiceConfig) {
    cfg.service(trigger_probe);
}

#[derive(Debug, Deserialize)]
pub struct ProbeQuery {
    #[serde(default = "wait_by_default")]
    wait: bool,
}

fn wait_by_default() -> bool {
    true
}

/// Run a pass outside the regular schedule.
/// With `wait=false` the request returns 202 once the scheduler took it.
#[post("/probe")]
pub async fn trigger_probe(state: Data<AppState>, query: Query<ProbeQuery>) -> Result<HttpResponse, AppError> {
    let mode = if query.wait { TriggerMode::Wait } else { TriggerMode::Detached };

    match state.trigger.trigger_now(mode).await? {
        TriggerResponse::Accepted => Ok(HttpResponse::Accepted().json(json!({ "status": "accepted" }))),
        TriggerResponse::Finished(outcome) => Ok(HttpResponse::Ok().json(outcome)),
    }
}

#[cfg(test)]
mod tests {
    use crate::routes;
    use crate::test_support::{fixture, wait_for_idle, wait_until};
    use actix_web::http::StatusCode;
    use actix_web::{App, test};
    use serde_json::{Value, json};
    use std::time::Duration;

    #[actix_web::test]
    async fn test_waiting_trigger_returns_report() {
        let fixture = fixture(Duration::ZERO).await;
        let app = test::init_service(App::new().app_data(fixture.state.clone()).configure(routes::routes)).await;
        for address in ["10.0.0.5", "10.0.0.9"] {
            let req = test::TestRequest::post().uri("/hosts").set_json(json!({ "address": address })).to_request();
            test::call_service(&app, req).await;
        }
        wait_for_idle(&fixture.coordinator).await;

        let req = test::TestRequest::post().uri("/probe?wait=true").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "completed");
        assert_eq!(body["hosts"], 2);
        assert_eq!(body["reachable"], 1);
        assert_eq!(body["saved"], 2);

        let req = test::TestRequest::get().uri("/hosts/10.0.0.5").to_request();
        let record: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(record["last_probe"]["reachable"], true);
        assert_eq!(record["last_probe"]["resolved_hostname"], "printer.local");
    }

    #[actix_web::test]
    async fn test_trigger_during_pass_is_skipped() {
        let fixture = fixture(Duration::from_millis(300)).await;
        let app = test::init_service(App::new().app_data(fixture.state.clone()).configure(routes::routes)).await;
        let req = test::TestRequest::post().uri("/hosts").set_json(json!({ "address": "10.0.0.5" })).to_request();
        test::call_service(&app, req).await;
        wait_for_idle(&fixture.coordinator).await;

        let req = test::TestRequest::post().uri("/probe?wait=false").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);

        wait_until("the detached pass", || fixture.coordinator.is_running()).await;
        let req = test::TestRequest::post().uri("/probe").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body, json!({ "status": "skipped" }));
    }
}

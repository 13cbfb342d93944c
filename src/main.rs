// src/main.rs

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod common;
mod config;
mod db;
mod docs;
mod handlers;
mod middleware;
mod models;
mod services;

use crate::config::{AppState, Config};
use crate::docs::ApiDoc;

#[tokio::main]
async fn main() {
    // RUST_LOG controla o nível (padrão: info)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    // .expect() é bom aqui: se a configuração falhar, a aplicação não deve iniciar.
    let config = Config::from_env().expect("Configuração inválida.");
    let app_state = AppState::new(&config)
        .await
        .expect("Falha ao inicializar o estado da aplicação.");

    // Sessões limpas e paradas saem da memória
    app_state.zone_service.spawn_session_sweeper(config.session_idle_timeout);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .expect("Falha ao iniciar o listener TCP");
    tracing::info!(
        "🚀 Servidor escutando em {}",
        listener.local_addr().map(|a| a.to_string()).unwrap_or(config.bind_addr.clone())
    );

    axum::serve(listener, app(app_state))
        .await
        .expect("Erro no servidor Axum");
}

fn app(app_state: AppState) -> Router {
    let zone_routes = Router::new()
        .route("/", get(handlers::zones::get_tree).post(handlers::zones::add_zone))
        .route("/commit", post(handlers::zones::commit))
        .route("/discard", post(handlers::zones::discard))
        .route("/events", get(handlers::zones::revision_events))
        .route("/delete-all", post(handlers::zones::delete_all))
        .route(
            "/{zone_id}",
            put(handlers::zones::rename_zone).delete(handlers::zones::delete_zone),
        )
        .route("/{zone_id}/duplicate", post(handlers::zones::duplicate_zone))
        .route("/{zone_id}/positions", post(handlers::zones::create_positions))
        .route("/{zone_id}/clone", post(handlers::zones::clone_positions));

    let position_routes = Router::new().route(
        "/{position_id}",
        put(handlers::zones::rename_position).delete(handlers::zones::delete_position),
    );

    let template_routes = Router::new()
        .route(
            "/",
            get(handlers::templates::list_templates).post(handlers::templates::save_template),
        )
        .route("/{template_id}", delete(handlers::templates::delete_template))
        .route("/{template_id}/apply", post(handlers::templates::apply_template));

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/api/health", get(|| async { "OK" }))
        .nest("/api/zones", zone_routes)
        .nest("/api/positions", position_routes)
        .nest("/api/zone-templates", template_routes)
        .with_state(app_state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::db::MemoryZoneStore;
    use crate::services::zone_manager::EditorOptions;

    fn test_app() -> Router {
        app(AppState::with_store(Arc::new(MemoryZoneStore::new()), EditorOptions::default()))
    }

    async fn send(app: &Router, method: &str, uri: &str, tenant: Option<Uuid>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("accept-language", "pt-BR");
        if let Some(tenant) = tenant {
            builder = builder.header("x-tenant-id", tenant.to_string());
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn zone_id(tree: &Value, code: &str) -> Uuid {
        let id = tree["zones"]
            .as_array()
            .unwrap()
            .iter()
            .find(|z| z["code"] == code)
            .unwrap()["id"]
            .as_str()
            .unwrap();
        Uuid::parse_str(id).unwrap()
    }

    #[tokio::test]
    async fn health_check_answers_ok() {
        let app = test_app();
        let response = app
            .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_tenant_header_is_rejected() {
        let app = test_app();
        let (status, body) = send(&app, "GET", "/api/zones", None, None).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("X-Tenant-ID"));
    }

    #[tokio::test]
    async fn added_zones_show_up_in_the_tree_until_commit() {
        let app = test_app();
        let tenant = Uuid::new_v4();

        let (status, _) = send(
            &app,
            "POST",
            "/api/zones",
            Some(tenant),
            Some(json!({ "code": "a", "name": "Corredor", "count": 2 })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, tree) = send(&app, "GET", "/api/zones", Some(tenant), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(tree["isDirty"], true);
        assert_eq!(tree["zones"].as_array().unwrap().len(), 2);
        zone_id(&tree, "A1");

        let (status, body) = send(&app, "POST", "/api/zones/commit", Some(tenant), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["summary"]["zonesInserted"], 2);
        assert_eq!(body["tree"]["isDirty"], false);

        // Outro escopo não enxerga nada
        let (_, other) = send(&app, "GET", "/api/zones", Some(Uuid::new_v4()), None).await;
        assert!(other["zones"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_payload_reports_field_details() {
        let app = test_app();
        let (status, body) = send(
            &app,
            "POST",
            "/api/zones",
            Some(Uuid::new_v4()),
            Some(json!({ "code": "", "name": "Corredor" })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["details"]["code"].is_array());
    }

    #[tokio::test]
    async fn cloning_from_an_empty_zone_is_unprocessable() {
        let app = test_app();
        let tenant = Uuid::new_v4();

        let (_, tree) = send(
            &app,
            "POST",
            "/api/zones",
            Some(tenant),
            Some(json!({ "code": "A", "name": "Corredor", "count": 2 })),
        )
        .await;
        let source = zone_id(&tree, "A1");
        let target = zone_id(&tree, "A2");

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/zones/{target}/clone"),
            Some(tenant),
            Some(json!({ "sourceZoneId": source })),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["details"]["reason"].is_string());
    }

    #[tokio::test]
    async fn manual_positions_are_created_on_the_target_zone() {
        let app = test_app();
        let tenant = Uuid::new_v4();

        let (_, tree) = send(
            &app,
            "POST",
            "/api/zones",
            Some(tenant),
            Some(json!({ "code": "B", "name": "Estante" })),
        )
        .await;
        let shelf = zone_id(&tree, "B");

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/zones/{shelf}/positions"),
            Some(tenant),
            Some(json!({ "mode": "manual", "prefix": "B.V", "start": 1, "count": 3 })),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["created"], 3);
        let positions = body["tree"]["positionsByZone"][shelf.to_string()].as_array().unwrap();
        let codes: Vec<&str> = positions.iter().map(|p| p["code"].as_str().unwrap()).collect();
        assert_eq!(codes, vec!["B.V1", "B.V2", "B.V3"]);
    }

    #[tokio::test]
    async fn delete_all_requires_double_confirmation() {
        let app = test_app();
        let tenant = Uuid::new_v4();

        let (status, _) = send(
            &app,
            "POST",
            "/api/zones/delete-all",
            Some(tenant),
            Some(json!({ "confirmed": true, "confirmedAgain": false })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, tree) = send(
            &app,
            "POST",
            "/api/zones/delete-all",
            Some(tenant),
            Some(json!({ "confirmed": true, "confirmedAgain": true })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(tree["zones"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_template_is_not_found() {
        let app = test_app();
        let (status, _) = send(
            &app,
            "POST",
            &format!("/api/zone-templates/{}/apply", Uuid::new_v4()),
            Some(Uuid::new_v4()),
            Some(json!({ "code": "G2", "name": "Galpão 2" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn blank_renames_are_rejected_like_empty_ones() {
        let app = test_app();
        let tenant = Uuid::new_v4();

        let (_, tree) = send(&app, "POST", "/api/zones", Some(tenant), Some(json!({ "code": "B", "name": "Estante" }))).await;
        let shelf = zone_id(&tree, "B");

        for (code, name) in [("", "Estante"), ("   ", "Estante"), ("B", "  ")] {
            let (status, _) = send(
                &app,
                "PUT",
                &format!("/api/zones/{shelf}"),
                Some(tenant),
                Some(json!({ "code": code, "name": name })),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "code={code:?} name={name:?}");
        }

        let (_, body) = send(
            &app,
            "POST",
            &format!("/api/zones/{shelf}/positions"),
            Some(tenant),
            Some(json!({ "mode": "manual", "prefix": "B.V", "start": 1, "count": 1 })),
        )
        .await;
        let position = body["tree"]["positionsByZone"][shelf.to_string()][0]["id"].as_str().unwrap().to_string();

        let (status, body) = send(&app, "PUT", &format!("/api/positions/{position}"), Some(tenant), Some(json!({ "code": " " }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["details"]["code"].is_array());

        let (status, _) = send(&app, "PUT", &format!("/api/positions/{position}"), Some(tenant), Some(json!({ "code": "B.V9" }))).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn revision_events_stream_the_current_revision() {
        let app = test_app();
        let request = Request::builder()
            .uri("/api/zones/events")
            .header("x-tenant-id", Uuid::new_v4().to_string())
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()["content-type"].to_str().unwrap().starts_with("text/event-stream"));

        let mut body = response.into_body();
        let frame = tokio::time::timeout(std::time::Duration::from_secs(1), body.frame())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let text = String::from_utf8(frame.into_data().unwrap().to_vec()).unwrap();
        assert!(text.contains("event: revision"));
        // A carga inicial já conta como revisão 1
        assert!(text.contains("data: 1"));
    }
}

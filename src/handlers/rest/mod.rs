use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use axum_macros::{FromRef, debug_handler};
use metrics_exporter_prometheus::PrometheusHandle;
use utoipa::OpenApi;

use std::sync::Arc;

use crate::{
    dto::{EmailRequest, EmailResponse},
    service::MailService,
};

/// Content type of the Prometheus text exposition format.
pub const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

#[derive(OpenApi)]
#[openapi(
    info(title = "email.proto", description = "REST gateway of the email service"),
    paths(send_mail),
    components(schemas(EmailRequest, EmailResponse)),
    tags(
        (name = "EmailService", description = "Email sending API")
    )
)]
pub struct ApiDoc;

/// Pre-rendered OpenAPI document served on `/swagger.json`.
#[derive(Debug, Clone)]
pub struct SwaggerDocument(Bytes);

impl SwaggerDocument {
    /// Renders [`ApiDoc`] once; every request is answered with the same bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be serialized to JSON.
    pub fn render() -> Result<Self, serde_json::Error> {
        ApiDoc::openapi()
            .to_pretty_json()
            .map(|json| Self(Bytes::from(json)))
    }

    pub const fn as_bytes(&self) -> &Bytes {
        &self.0
    }
}

#[derive(Clone, FromRef)]
pub struct AppState {
    pub mail: Arc<MailService>,
    pub metrics: PrometheusHandle,
    pub swagger: SwaggerDocument,
}

#[utoipa::path(
    post,
    path = "/v1alpha1/email",
    operation_id = "SendMail",
    request_body = EmailRequest,
    responses(
        (status = 200, description = "Message handled", body = EmailResponse),
        (status = 400, description = "Malformed request body"),
        (status = 405, description = "Method not allowed")
    ),
    tag = "EmailService"
)]
#[debug_handler(state = AppState)]
pub async fn send_mail(
    State(service): State<Arc<MailService>>,
    Json(payload): Json<EmailRequest>,
) -> Response {
    (StatusCode::OK, Json(service.send_mail(payload))).into_response()
}

#[debug_handler(state = AppState)]
pub async fn swagger_json(State(document): State<SwaggerDocument>) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        document.0,
    )
        .into_response()
}

#[debug_handler(state = AppState)]
pub async fn metrics(State(handle): State<PrometheusHandle>) -> Response {
    handle.run_upkeep();
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, METRICS_CONTENT_TYPE)],
        handle.render(),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Router,
        body::{Body, to_bytes},
        http::{Method, Request},
        routing::{get, post},
    };
    use metrics_exporter_prometheus::PrometheusBuilder;
    use tower::ServiceExt;

    fn router() -> Router {
        let state = AppState {
            mail: Arc::new(MailService::new()),
            metrics: PrometheusBuilder::new().build_recorder().handle(),
            swagger: SwaggerDocument::render().unwrap(),
        };

        Router::new()
            .route("/v1alpha1/email", post(send_mail))
            .route("/swagger.json", get(swagger_json))
            .route("/metrics", get(metrics))
            .with_state(state)
    }

    async fn body_string(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn post_email_echoes_message() {
        let response = router()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/v1alpha1/email")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"message":"Hello"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, r#"{"error":"Hello"}"#);
    }

    #[tokio::test]
    async fn missing_message_is_treated_as_empty() {
        let response = router()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/v1alpha1/email")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "{}");
    }

    #[tokio::test]
    async fn get_on_email_route_is_not_allowed() {
        let response = router()
            .oneshot(
                Request::builder()
                    .method(Method::GET)
                    .uri("/v1alpha1/email")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn malformed_json_is_rejected() {
        let response = router()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/v1alpha1/email")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"message":"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn swagger_json_is_stable() {
        let expected = SwaggerDocument::render().unwrap();
        let app = router();

        let mut bodies = Vec::new();
        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(
                    Request::builder()
                        .uri("/swagger.json")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(
                response.headers()[header::CONTENT_TYPE],
                "application/json"
            );
            bodies.push(body_string(response).await);
        }

        assert_eq!(bodies[0], bodies[1]);
        assert_eq!(bodies[0].as_bytes(), expected.as_bytes().as_ref());
    }

    #[test]
    fn swagger_document_describes_send_mail() {
        let document = SwaggerDocument::render().unwrap();
        let json: serde_json::Value = serde_json::from_slice(document.as_bytes()).unwrap();

        let operation = &json["paths"]["/v1alpha1/email"]["post"];
        assert_eq!(operation["operationId"], "SendMail");
        assert_eq!(operation["tags"][0], "EmailService");
        assert!(json["components"]["schemas"]["EmailRequest"]["properties"]["message"].is_object());
        assert!(json["components"]["schemas"]["EmailResponse"]["properties"]["error"].is_object());
    }

    #[tokio::test]
    async fn metrics_uses_exposition_content_type() {
        let response = router()
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], METRICS_CONTENT_TYPE);
    }
}

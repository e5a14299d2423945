use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Iris API",
        version = "0.1.0",
        description = "Dashboard for a scheduled structured-data extractor."
    ),
    paths(
        crate::routes::status,
        crate::routes::records,
        crate::routes::trigger_fetch,
        crate::routes::health,
    ),
    components(schemas(
        crate::dto::StatusResponse,
        crate::dto::RecordsResponse,
        crate::dto::FetchResponse,
        crate::dto::HealthResponse,
        crate::dto::ErrorResponse,
    )),
    tags(
        (name = "dashboard", description = "Poller status, latest records, manual trigger"),
        (name = "system", description = "Health and system status"),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Adds Bearer token security scheme to the OpenAPI spec.
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::HttpBuilder::new()
                        .scheme(utoipa::openapi::security::HttpAuthScheme::Bearer)
                        .bearer_format("token")
                        .description(Some(
                            "Trigger API key. Set via IRIS_SERVER_API_KEY environment variable.",
                        ))
                        .build(),
                ),
            );
        }
    }
}

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Pricing API",
        version = "0.1.0",
        description = "Per-tenant pricing settings and suggested retail prices for recipes and products"
    ),
    servers(
        (url = "/api", description = "API base path")
    ),
    nest(
        (path = "/pricing", api = domain_pricing::handlers::ApiDoc)
    )
)]
pub struct ApiDoc;

pub mod api;

use actix_web::dev::ResourceDef;
use actix_web::http::StatusCode;
use actix_web::{App, HttpRequest, HttpResponse, HttpServer, ResponseError, middleware, web};
use serde::Serialize;
use tracing::{error, info};

use crate::service::{DeviceService, ServiceError};

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServiceError::Conflict => StatusCode::CONFLICT,
            ServiceError::NotFound => StatusCode::NOT_FOUND,
            ServiceError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let ServiceError::Internal(detail) = self {
            error!(detail = %detail, "Request failed");
        }
        HttpResponse::build(self.status_code()).json(self.body())
    }
}

/// Largest request body accepted by the create and update endpoints
pub const MAX_BODY_BYTES: usize = 256 * 1024;

/// Paths served by the API, in actix pattern syntax
const ROUTES: [&str; 4] = ["/", "/devices", "/devices/{name}", "/ping/{name}"];

#[derive(Serialize)]
struct FallbackBody {
    error: &'static str,
    message: &'static str,
}

fn is_known_path(path: &str) -> bool {
    ROUTES
        .iter()
        .any(|pattern| ResourceDef::new(*pattern).is_match(path))
}

/// Unmatched requests: 405 for a known path with the wrong method, else 404
async fn fallback(req: HttpRequest) -> HttpResponse {
    if is_known_path(req.path()) {
        HttpResponse::MethodNotAllowed().json(FallbackBody {
            error: "MethodNotAllowed",
            message: "Method not allowed",
        })
    } else {
        HttpResponse::NotFound().json(FallbackBody {
            error: "NotFound",
            message: "Resource not found",
        })
    }
}

/// Register every route plus the JSON fallback for unmatched requests
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::PayloadConfig::new(MAX_BODY_BYTES))
        .service(api::health)
        .service(api::list_devices)
        .service(api::create_device)
        .service(api::get_device)
        .service(api::update_device)
        .service(api::delete_device)
        .service(api::ping_device)
        .default_service(web::to(fallback));
}

/// Serve until SIGINT/SIGTERM; actix drains in-flight requests on shutdown
pub async fn start(bind: &str, port: u16, service: DeviceService) -> std::io::Result<()> {
    let service = web::Data::new(service);

    info!(bind, port, "Starting web server");
    HttpServer::new(move || {
        App::new()
            .wrap(middleware::NormalizePath::trim())
            .wrap(middleware::Logger::default())
            .app_data(service.clone())
            .configure(configure)
    })
    .bind((bind, port))?
    .run()
    .await
}

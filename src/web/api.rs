//! Handlers for the device inventory endpoints.

use actix_web::http::StatusCode;
use actix_web::web::{Bytes, Data, Path};
use actix_web::{HttpResponse, delete, get, post, put};
use serde::Serialize;

use crate::device::validate::ValidationErrors;
use crate::service::{DeviceService, ServiceError};

#[derive(Serialize)]
pub struct MessageResponse {
    message: &'static str,
}

/// Map payload extraction failures onto the JSON error bodies
fn request_body(body: Result<Bytes, actix_web::Error>) -> Result<Bytes, ServiceError> {
    body.map_err(|e| {
        if e.as_response_error().status_code() == StatusCode::PAYLOAD_TOO_LARGE {
            ServiceError::PayloadTooLarge
        } else {
            ServiceError::BadRequest(ValidationErrors::body())
        }
    })
}

#[get("/")]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(MessageResponse { message: "Healthy" })
}

#[get("/devices")]
pub async fn list_devices(service: Data<DeviceService>) -> Result<HttpResponse, ServiceError> {
    let devices = service.list_devices().await?;
    Ok(HttpResponse::Ok().json(devices))
}

#[post("/devices")]
pub async fn create_device(
    service: Data<DeviceService>,
    body: Result<Bytes, actix_web::Error>,
) -> Result<HttpResponse, ServiceError> {
    let body = request_body(body)?;
    let device = service.create_device(&body).await?;
    Ok(HttpResponse::Created().json(device))
}

#[get("/devices/{name}")]
pub async fn get_device(
    service: Data<DeviceService>,
    name: Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let device = service.get_device(&name).await?;
    Ok(HttpResponse::Ok().json(device))
}

#[put("/devices/{name}")]
pub async fn update_device(
    service: Data<DeviceService>,
    name: Path<String>,
    body: Result<Bytes, actix_web::Error>,
) -> Result<HttpResponse, ServiceError> {
    let body = request_body(body)?;
    let device = service.update_device(&name, &body).await?;
    Ok(HttpResponse::Ok().json(device))
}

#[delete("/devices/{name}")]
pub async fn delete_device(
    service: Data<DeviceService>,
    name: Path<String>,
) -> Result<HttpResponse, ServiceError> {
    service.delete_device(&name).await?;
    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "Device deleted",
    }))
}

/// Probe problems are part of the 200 body; only lookup failures are errors
#[get("/ping/{name}")]
pub async fn ping_device(
    service: Data<DeviceService>,
    name: Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let result = service.ping_device(&name).await?;
    Ok(HttpResponse::Ok().json(result))
}

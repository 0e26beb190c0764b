use std::sync::Arc;

use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use chrono::{DateTime, Utc};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{FulfillmentDetails, Order, OrderError, OrderStatus};
use crate::lifecycle::{CreateOrderRequest, OrderLifecycleManager};
use crate::metrics::Metrics;

// ============================================================================
// HTTP API
// ============================================================================
//
// Thin surface over the lifecycle manager:
//   POST /orders               - create an order
//   GET  /orders/{id}          - query an order
//   PUT  /orders/{id}/status   - internal status write-back
//   GET  /health, GET /metrics
//
// Fulfillment problems never surface as 5xx here; a failed shipment is only
// visible as the Failed order status.
//
// ============================================================================

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    order_id: Uuid,
    status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    fulfillment: Option<FulfillmentDetails>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            order_id: order.id,
            status: order.status,
            fulfillment: order.fulfillment,
        }
    }
}

/// Explicit, statically-typed update payload: only these optional fields are
/// recognized on the status write-back surface.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub carrier: Option<String>,
    #[serde(default)]
    pub shipped_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl UpdateStatusRequest {
    fn details(&self) -> Option<FulfillmentDetails> {
        if self.tracking_number.is_none()
            && self.carrier.is_none()
            && self.shipped_at.is_none()
            && self.error_message.is_none()
        {
            return None;
        }
        Some(FulfillmentDetails {
            tracking_number: self.tracking_number.clone(),
            carrier: self.carrier.clone(),
            shipped_at: self.shipped_at,
            error_message: self.error_message.clone(),
        })
    }
}

fn error_response(error: &OrderError) -> HttpResponse {
    match error {
        OrderError::Validation { violations } => HttpResponse::BadRequest().json(
            serde_json::json!({"error": "validation failed", "violations": violations}),
        ),
        OrderError::NotFound(order_id) => HttpResponse::NotFound()
            .json(serde_json::json!({"error": format!("order {order_id} not found")})),
        OrderError::InvalidTransition { .. } => {
            HttpResponse::Conflict().json(serde_json::json!({"error": error.to_string()}))
        }
        OrderError::DuplicateOrder(_) | OrderError::Backend(_) => {
            tracing::error!(error = %error, "Unexpected error on API surface");
            HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": "internal error"}))
        }
    }
}

async fn create_order(
    manager: web::Data<Arc<OrderLifecycleManager>>,
    request: web::Json<CreateOrderRequest>,
) -> impl Responder {
    match manager.create_order(request.into_inner()).await {
        Ok(created) => HttpResponse::Created().json(created),
        Err(error) => error_response(&error),
    }
}

async fn get_order(
    manager: web::Data<Arc<OrderLifecycleManager>>,
    order_id: web::Path<Uuid>,
) -> impl Responder {
    match manager.get_order(*order_id).await {
        Ok(order) => HttpResponse::Ok().json(OrderResponse::from(order)),
        Err(error) => error_response(&error),
    }
}

async fn update_status(
    manager: web::Data<Arc<OrderLifecycleManager>>,
    order_id: web::Path<Uuid>,
    request: web::Json<UpdateStatusRequest>,
) -> impl Responder {
    match manager
        .update_status(*order_id, request.status, request.details())
        .await
    {
        Ok(order) => HttpResponse::Ok().json(OrderResponse::from(order)),
        Err(error) => error_response(&error),
    }
}

async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "order-fulfillment"
    }))
}

async fn metrics_endpoint(metrics: web::Data<Arc<Metrics>>) -> impl Responder {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    match encoder.encode(&metrics.registry().gather(), &mut buffer) {
        Ok(()) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(buffer),
        Err(error) => {
            tracing::error!(error = %error, "Failed to encode metrics");
            HttpResponse::InternalServerError().finish()
        }
    }
}

pub async fn run_http_server(
    manager: Arc<OrderLifecycleManager>,
    metrics: Arc<Metrics>,
    port: u16,
) -> std::io::Result<()> {
    tracing::info!(port = port, "Starting HTTP server");

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(manager.clone()))
            .app_data(web::Data::new(metrics.clone()))
            .route("/health", web::get().to(health))
            .route("/metrics", web::get().to(metrics_endpoint))
            .route("/orders", web::post().to(create_order))
            .route("/orders/{order_id}", web::get().to(get_order))
            .route("/orders/{order_id}/status", web::put().to(update_status))
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}

use std::sync::Arc;

use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use serde::Deserialize;
use uuid::Uuid;

use crate::application::{CreateOrderError, OrderService};
use crate::domain::order::NewOrderItem;

// ============================================================================
// HTTP API - thin plumbing around the order service
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub customer_id: Uuid,
    pub items: Vec<CreateOrderItemRequest>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderItemRequest {
    pub product_id: Uuid,
    pub quantity: i32,
    pub price: f64,
}

pub async fn serve(service: Arc<OrderService>, port: u16) -> std::io::Result<()> {
    tracing::info!(port, "Order API listening");

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(service.clone()))
            .route("/orders", web::post().to(create_order))
            .route("/health", web::get().to(health))
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}

async fn create_order(
    service: web::Data<Arc<OrderService>>,
    req: web::Json<CreateOrderRequest>,
) -> impl Responder {
    let req = req.into_inner();
    let items = req
        .items
        .into_iter()
        .map(|item| NewOrderItem {
            product_id: item.product_id,
            quantity: item.quantity,
            price: item.price,
        })
        .collect();

    match service.create_order(req.customer_id, items).await {
        Ok(order_id) => HttpResponse::Created().json(serde_json::json!({
            "orderId": order_id,
            "message": "Order created and event staged in outbox",
        })),
        Err(e @ CreateOrderError::Validation(_)) => {
            HttpResponse::BadRequest().json(serde_json::json!({ "error": e.to_string() }))
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to create order");
            HttpResponse::InternalServerError()
                .json(serde_json::json!({ "error": "failed to create order" }))
        }
    }
}

async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "order-outbox"
    }))
}

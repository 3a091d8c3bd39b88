use std::{future::Future, pin::Pin};

use atelier_billing_server::{config::ServerConfig, server::run_server};
use atelier_billing_engine::events::{EventHandlers, EventHooks};
use dotenvy::dotenv;
use log::info;

#[actix_web::main]
async fn main() {
    dotenv().ok();
    env_logger::init();
    let config = ServerConfig::from_env_or_default();

    // Notification delivery (email/SMS) is an external collaborator. The default subscribers only log;
    // a dispatcher is hooked in here without touching the engine.
    let mut hooks = EventHooks::default();
    hooks.on_order_received(|event| {
        Box::pin(async move {
            info!("📧️ Order {} received from {}. Confirmation notification queued.", event.order.id, event.order.customer_id);
        }) as Pin<Box<dyn Future<Output = ()> + Send>>
    });
    hooks.on_order_paid(|event| {
        Box::pin(async move {
            info!("📧️ Order {} fully paid. New-order notifications queued.", event.order.id);
        }) as Pin<Box<dyn Future<Output = ()> + Send>>
    });
    let handlers = EventHandlers::new(10, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;

    info!("🚀️ Starting server on {}:{}", config.host, config.port);
    match run_server(config, producers).await {
        Ok(_) => println!("Bye!"),
        Err(e) => eprintln!("{e}"),
    }
}

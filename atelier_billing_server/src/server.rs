use std::time::Duration;

use actix_web::{http::KeepAlive, middleware::Logger, web, App, HttpServer};
use actix_web::dev::Server;
use log::info;

use atelier_billing_engine::{events::EventProducers, BasketApi, OrderFlowApi, SqliteDatabase, SubscriptionApi};
use paypal_tools::PaypalApi;

use crate::{
    config::ServerConfig,
    errors::ServerError,
    paypal_routes::{paypal_payments_webhook, paypal_subscription_webhook},
    routes::{
        add_line_attachment,
        apply_coupon,
        billing_history,
        cancel_subscription,
        checkout,
        clear_basket,
        current_subscription,
        get_basket,
        health,
        order_by_id,
        remove_basket_line,
        upsert_basket_line,
    },
    twocheckout_routes::twocheckout_webhook,
};

pub async fn run_server(config: ServerConfig, producers: EventProducers) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let srv = create_server_instance(config, db, producers)?;
    srv.await.map_err(|e| ServerError::BackendError(e.to_string()))
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    producers: EventProducers,
) -> Result<Server, ServerError> {
    let paypal_api =
        PaypalApi::new(config.paypal.clone()).map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let host = config.host.clone();
    let port = config.port;
    let srv = HttpServer::new(move || {
        let orders_api = OrderFlowApi::new(db.clone(), producers.clone());
        let basket_api = BasketApi::new(db.clone());
        let subscription_api = SubscriptionApi::new(db.clone());
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("abg::access_log"))
            .app_data(web::Data::new(orders_api))
            .app_data(web::Data::new(basket_api))
            .app_data(web::Data::new(subscription_api))
            .app_data(web::Data::new(paypal_api.clone()))
            .app_data(web::Data::new(config.twocheckout.clone()));
        let api_scope = web::scope("/api")
            .route("/baskets/{customer_id}", web::get().to(get_basket::<SqliteDatabase>))
            .route("/baskets/{customer_id}/lines", web::post().to(upsert_basket_line::<SqliteDatabase>))
            .route("/baskets/{customer_id}/lines/{line_id}", web::delete().to(remove_basket_line::<SqliteDatabase>))
            .route(
                "/baskets/{customer_id}/lines/{line_id}/attachments",
                web::post().to(add_line_attachment::<SqliteDatabase>),
            )
            .route("/baskets/{customer_id}/clear", web::post().to(clear_basket::<SqliteDatabase>))
            .route("/baskets/{customer_id}/coupon", web::post().to(apply_coupon::<SqliteDatabase>))
            .route("/baskets/{customer_id}/checkout", web::post().to(checkout::<SqliteDatabase>))
            .route("/orders/{order_id}", web::get().to(order_by_id::<SqliteDatabase>))
            .route("/subscription", web::get().to(current_subscription::<SqliteDatabase>))
            .route("/subscription/payments", web::get().to(billing_history::<SqliteDatabase>))
            .route("/subscription/cancel", web::post().to(cancel_subscription::<SqliteDatabase>));
        let webhook_scope = web::scope("/webhook")
            .route("/paypal", web::post().to(paypal_payments_webhook::<SqliteDatabase>))
            .route("/paypal/subscription", web::post().to(paypal_subscription_webhook::<SqliteDatabase>))
            .route("/twocheckout", web::post().to(twocheckout_webhook::<SqliteDatabase>));
        app.service(health).service(api_scope).service(webhook_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((host.as_str(), port))?
    .run();
    info!("💻️ Server instance created");
    Ok(srv)
}

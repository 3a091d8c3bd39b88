pub mod basket_api;
pub mod order_flow_api;
pub mod order_objects;
pub mod pricing_api;
pub mod subscription_api;

pub use basket_api::{BasketApi, BasketSummary};
pub use order_flow_api::OrderFlowApi;
pub use pricing_api::{coupon_is_valid, PricingApi};
pub use subscription_api::SubscriptionApi;

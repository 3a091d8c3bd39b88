//! Atelier Billing Engine
//!
//! The billing backbone of the Atelier service marketplace: customers assemble a basket of custom work
//! orders, prices come from tiered rate tables, a basket converts atomically into a payable order, and
//! asynchronous payment-gateway events are reconciled into a durable payment ledger that drives order and
//! line status. The same reconciliation pattern also tracks the platform's own recurring-billing
//! subscription. This library contains the core logic for the engine. It is provider-agnostic.
//!
//! The library is divided into two main sections:
//! 1. Database management and control. SQLite is the supported backend (behind the `sqlite` feature). You
//!    should never need to access the database directly; use the public API instead. The exception is the
//!    data types used in the database, which are defined in [`db_types`] and are public.
//! 2. The public API layer: [`PricingApi`] (rate resolution and coupon selection), [`BasketApi`] (the
//!    mutable pre-order basket), [`OrderFlowApi`] (checkout and payment-event reconciliation) and
//!    [`SubscriptionApi`] (platform subscription billing). Backends implement the traits in [`traits`] to
//!    serve these APIs.
//!
//! The engine also provides a set of events that can be subscribed to (see [`events`]). They are emitted
//! after the transaction that caused them commits; a small actor framework lets you hook notification
//! side effects onto them without ever coupling them to the transaction's fate.
mod api;

pub mod db_types;
pub mod events;
pub mod helpers;
pub mod ledger;
pub mod traits;

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use api::{basket_api::BestMatchCoupon, coupon_is_valid, order_objects, BasketApi, BasketSummary, OrderFlowApi, PricingApi, SubscriptionApi};
#[cfg(feature = "sqlite")]
pub use sqlite::{db_url, new_pool, SqliteDatabase};

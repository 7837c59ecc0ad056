//! Cart and order persistence for the shop backend.
//!
//! Two backends implement [`CartStore`]:
//! - [`PostgresStore`], which relies on native upsert and a per-cart row
//!   lock
//! - [`OptimisticCartStore`] over any versioned [`CartRepository`] (such as
//!   [`InMemoryStore`]), which reloads and re-applies on conflict
//!
//! Both keep the invariants of the cart aggregate under concurrent
//! writers: one line per product and no lost increments.

pub mod error;
pub mod memory;
pub mod optimistic;
pub mod postgres;
pub mod retry;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::{InMemoryProductCatalog, InMemoryStore};
pub use optimistic::OptimisticCartStore;
pub use postgres::PostgresStore;
pub use retry::{RetryExhausted, RetryPolicy, retry_on_conflict, retry_with_reload};
pub use store::{CartRepository, CartStore, OrderStore, ProductCatalog};

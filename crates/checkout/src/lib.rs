//! Shop operations on top of the cart store.
//!
//! [`ShopService`] is the surface the HTTP layer talks to: cart edits,
//! checkout, order lookup and order status changes. Checkout itself is
//! driven by [`CheckoutCoordinator`], which turns a cart into an order and
//! empties the cart as one atomic, conflict-checked step.

pub mod coordinator;
pub mod error;
pub mod requester;
pub mod service;

pub use coordinator::{CheckoutCoordinator, OrderSummary};
pub use error::{Result, ShopError};
pub use requester::{Requester, Role};
pub use service::ShopService;

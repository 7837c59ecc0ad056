//! Shared identifier types used across the shop crates.

mod types;

pub use types::{CartId, LineItemId, OrderId, ProductId, UserId, Version};

//! Catalog fixture loaded at startup.
//!
//! The file is a JSON array of products:
//!
//! ```json
//! [{ "id": "6f1c0c9e-8a51-4d6e-9a53-1f1f2c3d4e5f", "name": "Widget", "unit_price_cents": 1250 }]
//! ```

use std::path::Path;

use cart_store::{InMemoryProductCatalog, PostgresStore, StoreError};
use common::ProductId;
use domain::{Money, ProductSnapshot, SnapshotError};
use serde::Deserialize;
use thiserror::Error;

/// Errors raised while reading or applying a catalog fixture.
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("Failed to read catalog fixture {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Malformed catalog fixture: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Product(#[from] SnapshotError),

    #[error("Failed to store catalog fixture: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Deserialize)]
struct FixtureProduct {
    id: ProductId,
    name: String,
    unit_price_cents: i64,
}

/// Parses fixture JSON into product snapshots.
pub fn parse_catalog(json: &str) -> Result<Vec<ProductSnapshot>, FixtureError> {
    let products: Vec<FixtureProduct> = serde_json::from_str(json)?;
    products
        .into_iter()
        .map(|p| {
            ProductSnapshot::new(p.id, p.name, Money::from_cents(p.unit_price_cents))
                .map_err(FixtureError::from)
        })
        .collect()
}

/// Reads and parses the fixture at `path`.
pub async fn load_catalog(path: impl AsRef<Path>) -> Result<Vec<ProductSnapshot>, FixtureError> {
    let path = path.as_ref();
    let json = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| FixtureError::Io {
            path: path.display().to_string(),
            source,
        })?;
    parse_catalog(&json)
}

/// Adds every product to the in-memory catalog. Returns the count.
pub async fn stock_in_memory(
    catalog: &InMemoryProductCatalog,
    products: Vec<ProductSnapshot>,
) -> usize {
    let count = products.len();
    for product in products {
        catalog.insert(product).await;
    }
    count
}

/// Upserts every product into the PostgreSQL catalog. Returns the count.
pub async fn stock_postgres(
    store: &PostgresStore,
    products: &[ProductSnapshot],
) -> Result<usize, FixtureError> {
    for product in products {
        store.upsert_product(product).await?;
    }
    Ok(products.len())
}

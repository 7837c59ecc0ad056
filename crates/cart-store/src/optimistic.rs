use async_trait::async_trait;
use common::{CartId, ProductId, UserId};
use domain::{Cart, CartError, CartLine, Order, ProductSnapshot};

use crate::{
    Result, StoreError,
    retry::{RetryPolicy, retry_with_reload},
    store::{CartRepository, CartStore},
};

/// `CartStore` built from a versioned [`CartRepository`].
///
/// Each mutation loads the cart, applies the change through the domain
/// aggregate and saves it with a compare-and-swap on the version. A lost
/// race reloads and re-applies the change, up to the retry policy's
/// budget.
#[derive(Clone)]
pub struct OptimisticCartStore<R> {
    repo: R,
    policy: RetryPolicy,
}

impl<R: CartRepository> OptimisticCartStore<R> {
    pub fn new(repo: R) -> Self {
        Self::with_policy(repo, RetryPolicy::default())
    }

    pub fn with_policy(repo: R, policy: RetryPolicy) -> Self {
        Self { repo, policy }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Loads `cart_id`, applies `apply`, and saves if it reports a change.
    ///
    /// A domain rejection from `apply` is returned as is and never retried.
    async fn mutate<T, F>(&self, operation: &'static str, cart_id: CartId, apply: F) -> Result<T>
    where
        T: Send,
        F: Fn(&mut Cart) -> std::result::Result<(T, bool), CartError> + Send + Sync,
    {
        let repo = &self.repo;
        let apply = &apply;

        retry_with_reload(
            &self.policy,
            operation,
            StoreError::is_conflict,
            move || async move {
                repo.load(cart_id)
                    .await?
                    .ok_or_else(|| StoreError::not_found("cart", cart_id))
            },
            move |mut cart: Cart| async move {
                let (result, changed) = apply(&mut cart)?;
                if changed {
                    repo.save(&cart).await?;
                }
                Ok::<_, StoreError>(result)
            },
        )
        .await
    }
}

#[async_trait]
impl<R: CartRepository> CartStore for OptimisticCartStore<R> {
    #[tracing::instrument(skip(self))]
    async fn get_or_create_cart(&self, user_id: UserId) -> Result<Cart> {
        let repo = &self.repo;

        retry_with_reload(
            &self.policy,
            "get_or_create_cart",
            StoreError::is_conflict,
            move || async move { repo.load_by_user(user_id).await },
            move |existing: Option<Cart>| async move {
                match existing {
                    Some(cart) => Ok(cart),
                    None => {
                        let cart = Cart::new(user_id);
                        // Losing the race surfaces as Conflict; the retry
                        // then loads the winner's cart.
                        repo.insert(&cart).await?;
                        tracing::debug!(cart_id = %cart.id(), "Created cart");
                        Ok::<_, StoreError>(cart)
                    }
                }
            },
        )
        .await
    }

    async fn find_cart(&self, user_id: UserId) -> Result<Option<Cart>> {
        self.repo.load_by_user(user_id).await
    }

    #[tracing::instrument(skip(self, product), fields(product_id = %product.product_id()))]
    async fn upsert_line(
        &self,
        cart_id: CartId,
        product: &ProductSnapshot,
        delta: i32,
    ) -> Result<Option<CartLine>> {
        self.mutate("upsert_line", cart_id, |cart| {
            let line = cart.add_item(product.clone(), delta)?;
            let changed = line.is_some();
            Ok((line, changed))
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn set_line_quantity(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<bool> {
        self.mutate("set_line_quantity", cart_id, |cart| {
            let changed = cart.set_quantity(product_id, quantity)?;
            Ok((changed, changed))
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn remove_line(&self, cart_id: CartId, product_id: ProductId) -> Result<bool> {
        self.mutate("remove_line", cart_id, |cart| {
            let removed = cart.remove_item(product_id).is_some();
            Ok((removed, removed))
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    async fn clear_lines(&self, cart_id: CartId) -> Result<usize> {
        self.mutate("clear_lines", cart_id, |cart| {
            let removed = cart.clear();
            Ok((removed, removed > 0))
        })
        .await
    }

    #[tracing::instrument(skip(self, cart, order), fields(cart_id = %cart.id(), order_id = %order.id()))]
    async fn commit_checkout(&self, cart: &Cart, order: &Order) -> Result<()> {
        let mut emptied = cart.clone();
        emptied.clear();
        self.repo.save_with_order(&emptied, order).await?;
        Ok(())
    }
}

//! Catalog writes: product creation and edits.

use chrono::Utc;
use tracing::{info, instrument};

use stockhold_audit::AuditRecorder;
use stockhold_core::{Entity, Principal, ProductId};
use stockhold_inventory::{NewProduct, Product, ProductPatch};

use crate::error::{WorkflowError, WorkflowResult};
use crate::store::InventoryStore;

#[derive(Debug, Clone)]
pub struct CatalogService<S> {
    store: S,
}

impl<S: InventoryStore> CatalogService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[instrument(skip(self, input, principal), fields(name = %input.name))]
    pub async fn create_product(
        &self,
        input: NewProduct,
        principal: Option<&Principal>,
    ) -> WorkflowResult<Product> {
        let now = Utc::now();
        let product = Product::create(input, now)?;
        let recorder = AuditRecorder::for_principal(principal, now);

        let mut tx = self.store.begin().await?;
        tx.insert_product(&product).await?;
        tx.append_audit(&recorder.product_created(&product)).await?;
        tx.commit().await?;

        info!(product_id = %product.id(), "product created");
        Ok(product)
    }

    /// Edit a product under its row lock, so the edit serializes with
    /// purchases and reclamation. Stock fields must still balance afterwards.
    #[instrument(skip(self, patch, principal))]
    pub async fn update_product(
        &self,
        product_id: ProductId,
        patch: ProductPatch,
        principal: Option<&Principal>,
    ) -> WorkflowResult<Product> {
        let now = Utc::now();
        let recorder = AuditRecorder::for_principal(principal, now);

        let mut tx = self.store.begin().await?;
        let before = tx
            .lock_product(product_id)
            .await?
            .ok_or(WorkflowError::ProductNotFound(product_id))?;
        if patch.is_empty() {
            return Ok(before);
        }

        let mut after = before.clone();
        after.apply_patch(patch, now)?;
        tx.update_product(&after).await?;
        tx.append_audit(&recorder.product_updated(&before, &after))
            .await?;
        tx.commit().await?;

        info!(product_id = %product_id, "product updated");
        Ok(after)
    }
}

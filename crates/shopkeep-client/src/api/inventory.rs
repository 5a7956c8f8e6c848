//! Inventory lots and their links to products.
//!
//! Attaching a lot to a product takes two calls:
//! ```text
//! POST /inventory {cost, sellingPrice, stock}      ──► inventory _id
//! POST /product-inventory {productId, inventoryId} ──► link _id
//! ```

use serde::Serialize;
use serde_json::json;
use shopkeep_core::money::{self, Money};
use shopkeep_core::validation::validate_inventory_form;
use shopkeep_core::{Inventory, InventoryForm};
use tracing::debug;

use crate::error::ClientResult;
use crate::http::{query, ApiClient};
use crate::normalize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InventoryBody {
    #[serde(with = "money::as_major")]
    cost: Money,
    #[serde(with = "money::as_major")]
    selling_price: Money,
    stock: i64,
}

impl From<&InventoryForm> for InventoryBody {
    fn from(form: &InventoryForm) -> Self {
        InventoryBody {
            cost: form.cost,
            selling_price: form.selling_price,
            stock: form.stock,
        }
    }
}

pub struct InventoryApi<'a> {
    client: &'a ApiClient,
}

impl<'a> InventoryApi<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        InventoryApi { client }
    }

    pub async fn create(&self, form: &InventoryForm) -> ClientResult<Inventory> {
        validate_inventory_form(form)?;
        let body = self
            .client
            .post_value("/inventory", &InventoryBody::from(form))
            .await?;
        normalize::inventory(&body)
    }

    pub async fn update(&self, id: &str, form: &InventoryForm) -> ClientResult<Option<Inventory>> {
        validate_inventory_form(form)?;
        let body = self
            .client
            .put_value("/inventory", query(&[("id", id)]), &InventoryBody::from(form))
            .await?;
        Ok(normalize::inventory(&body).ok())
    }

    pub async fn delete(&self, id: &str) -> ClientResult<()> {
        self.client
            .delete_value("/inventory", query(&[("id", id)]))
            .await?;
        Ok(())
    }

    /// Links a lot to a product (server record ids). Returns the link id.
    pub async fn link(&self, product_id: &str, inventory_id: &str) -> ClientResult<String> {
        let body = self
            .client
            .post_value(
                "/product-inventory",
                &json!({ "productId": product_id, "inventoryId": inventory_id }),
            )
            .await?;
        let link_id = normalize::created_id(&body, &["productInventory", "link"])?;
        debug!(product_id = %product_id, inventory_id = %inventory_id, link_id = %link_id, "Linked inventory");
        Ok(link_id)
    }

    pub async fn unlink(&self, link_id: &str) -> ClientResult<()> {
        self.client
            .delete_value("/product-inventory", query(&[("id", link_id)]))
            .await?;
        Ok(())
    }
}

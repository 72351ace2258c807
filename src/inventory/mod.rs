//! Inventory: stock levels per workspace.

pub mod routes;

pub use routes::inventory_routes;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{Error, ValidationError};
use crate::forms::{parse_count, require};
use crate::gateway::{DataGateway, InventoryItem, NewInventoryItem};
use crate::notify::Notifier;
use crate::session::{Role, Session};

pub const DEFAULT_QUANTITY: &str = "10";
pub const DEFAULT_THRESHOLD: &str = "5";

/// Free-text inventory entry form, as typed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryForm {
    pub name: String,
    pub quantity: String,
    pub low_stock_threshold: String,
}

impl Default for InventoryForm {
    fn default() -> Self {
        Self {
            name: String::new(),
            quantity: DEFAULT_QUANTITY.to_string(),
            low_stock_threshold: DEFAULT_THRESHOLD.to_string(),
        }
    }
}

impl InventoryForm {
    pub fn is_ready(&self) -> bool {
        !self.name.trim().is_empty()
    }

    pub fn to_new_item(&self, workspace_id: Uuid) -> Result<NewInventoryItem, ValidationError> {
        Ok(NewInventoryItem {
            workspace_id,
            name: require("name", &self.name)?.to_string(),
            quantity: parse_count("quantity", &self.quantity)?,
            low_stock_threshold: parse_count("low_stock_threshold", &self.low_stock_threshold)?,
            unit: None,
        })
    }

    /// Back to defaults after a successful insert.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// An item with its derived stock state, as the inventory screen shows it.
#[derive(Debug, Clone, Serialize)]
pub struct StockLevel {
    #[serde(flatten)]
    pub item: InventoryItem,
    pub is_low: bool,
    pub percent: f64,
    pub unit_label: String,
}

impl From<InventoryItem> for StockLevel {
    fn from(item: InventoryItem) -> Self {
        Self {
            is_low: item.is_low_stock(),
            percent: item.stock_percent(),
            unit_label: item.unit_label().to_string(),
            item,
        }
    }
}

/// Loads and adds inventory for the session's workspace.
pub struct InventoryManager {
    gateway: Arc<dyn DataGateway>,
    session: Session,
    notifier: Notifier,
}

impl InventoryManager {
    pub fn new(gateway: Arc<dyn DataGateway>, session: Session, notifier: Notifier) -> Self {
        Self {
            gateway,
            session,
            notifier,
        }
    }

    pub fn workspace_id(&self) -> Uuid {
        self.session.workspace_id
    }

    /// All items ordered by name, with stock state.
    pub async fn list(&self) -> Result<Vec<StockLevel>, Error> {
        match self.gateway.list_inventory(self.session.workspace_id).await {
            Ok(items) => Ok(items.into_iter().map(StockLevel::from).collect()),
            Err(e) => {
                warn!(workspace_id = %self.session.workspace_id, error = %e, "Failed to load inventory");
                self.notifier.failure("Could not load inventory", &e);
                Err(e.into())
            }
        }
    }

    /// Add an item (admins only) and return the refreshed list.
    pub async fn add(&self, form: &InventoryForm) -> Result<Vec<StockLevel>, Error> {
        if !self.session.is_admin() {
            return Err(Error::PermissionDenied {
                action: "add inventory".into(),
                required: Role::Admin.to_string(),
            });
        }
        let new_item = form.to_new_item(self.session.workspace_id)?;
        match self.gateway.insert_inventory_item(&new_item).await {
            Ok(item) => {
                info!(item_id = %item.id, name = %item.name, "Inventory item added");
                self.notifier.success("Item added!", None);
            }
            Err(e) => {
                warn!(name = %new_item.name, error = %e, "Failed to add inventory item");
                self.notifier.failure("Could not add item", &e);
                return Err(e.into());
            }
        }
        self.list().await
    }
}

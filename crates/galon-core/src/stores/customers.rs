//! Reactive customer state mirrored from the backend.
//!
//! `CustomerStore` owns the customer list, the selected customer, and the
//! loading/error flags. The UI subscribes to [`CustomerState`] snapshots and
//! calls the async actions, each of which talks to the API and then patches
//! the local state.

use std::future::Future;

use tokio::sync::watch;
use tracing::{error, warn};

use crate::api::{ApiClient, ApiError};
use crate::models::{Customer, CustomerPayload, FormattedCustomer};
use crate::utils::contains_ignore_case;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CustomerState {
    pub customers: Vec<Customer>,
    pub selected: Option<Customer>,
    pub is_loading: bool,
    pub error: Option<String>,
}

pub struct CustomerStore {
    api: ApiClient,
    state: watch::Sender<CustomerState>,
}

impl CustomerStore {
    pub fn new(api: ApiClient) -> Self {
        let (state, _) = watch::channel(CustomerState::default());
        Self { api, state }
    }

    pub fn state(&self) -> CustomerState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CustomerState> {
        self.state.subscribe()
    }

    /// Run `action` with the loading flag raised, recording any error.
    async fn track<T, F>(&self, label: &'static str, action: F) -> Result<T, ApiError>
    where
        F: Future<Output = Result<T, ApiError>>,
    {
        self.state.send_modify(|state| {
            state.is_loading = true;
            state.error = None;
        });

        let result = action.await;

        self.state.send_modify(|state| {
            state.is_loading = false;
            if let Err(e) = &result {
                state.error = Some(e.to_string());
            }
        });
        if let Err(e) = &result {
            error!(action = label, error = %e, "Customer action failed");
        }
        result
    }

    pub async fn load_customers(&self) -> Result<Vec<Customer>, ApiError> {
        let customers = self
            .track("load customers", self.api.customers().get_all())
            .await?;
        self.state.send_modify(|state| state.customers = customers.clone());
        Ok(customers)
    }

    pub async fn load_customer(&self, id: i64) -> Result<Customer, ApiError> {
        let customer = self
            .track("load customer", self.api.customers().get_by_id(id))
            .await?;
        self.state
            .send_modify(|state| state.selected = Some(customer.clone()));
        Ok(customer)
    }

    pub async fn create_customer(&self, payload: &CustomerPayload) -> Result<Customer, ApiError> {
        let created = self
            .track("create customer", self.api.customers().create(payload))
            .await?;
        self.state
            .send_modify(|state| state.customers.push(created.clone()));
        Ok(created)
    }

    /// Update a customer and merge the response into local copies.
    pub async fn update_customer(
        &self,
        id: i64,
        payload: &CustomerPayload,
    ) -> Result<serde_json::Value, ApiError> {
        let updated = self
            .track("update customer", self.api.customers().update(id, payload))
            .await?;

        let merge = |customer: &mut Customer| match customer.merged(&updated) {
            Some(merged) => *customer = merged,
            None => warn!(id, "Update response could not be merged into local customer"),
        };
        self.state.send_modify(|state| {
            if let Some(customer) = state.customers.iter_mut().find(|c| c.id == id) {
                merge(customer);
            }
            if let Some(selected) = state.selected.as_mut().filter(|c| c.id == id) {
                merge(selected);
            }
        });
        Ok(updated)
    }

    pub async fn delete_customer(&self, id: i64) -> Result<(), ApiError> {
        self.track("delete customer", self.api.customers().delete(id))
            .await?;
        self.state.send_modify(|state| {
            state.customers.retain(|c| c.id != id);
            if state.selected.as_ref().is_some_and(|c| c.id == id) {
                state.selected = None;
            }
        });
        Ok(())
    }

    /// Reset everything, e.g. after logout.
    pub fn clear(&self) {
        self.state.send_replace(CustomerState::default());
    }

    pub fn count(&self) -> usize {
        self.state.borrow().customers.len()
    }

    pub fn formatted(&self) -> Vec<FormattedCustomer> {
        self.state
            .borrow()
            .customers
            .iter()
            .map(Customer::formatted)
            .collect()
    }

    /// Filter the loaded customers.
    ///
    /// Name, address and sub-region match case-insensitively; id and
    /// WhatsApp number match as plain substrings. A blank term matches all.
    pub fn search(&self, term: &str) -> Vec<Customer> {
        let state = self.state.borrow();
        if term.trim().is_empty() {
            return state.customers.clone();
        }

        state
            .customers
            .iter()
            .filter(|c| {
                contains_ignore_case(&c.customer_name, term)
                    || c.id.to_string().contains(term)
                    || c.whatsapp_number.as_deref().is_some_and(|w| w.contains(term))
                    || contains_ignore_case(&c.address, term)
                    || c.sub_region_name
                        .as_deref()
                        .is_some_and(|r| contains_ignore_case(r, term))
            })
            .cloned()
            .collect()
    }
}

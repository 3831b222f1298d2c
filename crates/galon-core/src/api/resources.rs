//! Endpoint groups layered on the dispatcher.
//!
//! The groups are `Copy` views over `&ApiClient`; their futures borrow only
//! the client, so calls on separate views can be joined.
//!
//! Customer calls decode into [`Customer`]; the other resources are passed
//! through as JSON values for the UI to pick apart.

use serde::Serialize;
use serde_json::{json, Value};

use crate::models::{Customer, CustomerPayload, Envelope};

use super::client::ApiClient;
use super::error::ApiError;
use super::upload::FormData;

/// Form field the backend reads the customer photo from
const PHOTO_FIELD: &str = "customer_photo";

impl ApiClient {
    pub fn dashboard(&self) -> DashboardApi<'_> {
        DashboardApi { client: self }
    }

    pub fn customers(&self) -> CustomersApi<'_> {
        CustomersApi { client: self }
    }

    pub fn transactions(&self) -> TransactionsApi<'_> {
        TransactionsApi { client: self }
    }

    pub fn payments(&self) -> PaymentsApi<'_> {
        PaymentsApi { client: self }
    }

    /// Global search across customers and transactions
    pub async fn search(&self, query: &str) -> Result<Value, ApiError> {
        self.get_with_query("/search", &[("q", query)]).await
    }
}

#[derive(Clone, Copy)]
pub struct DashboardApi<'a> {
    client: &'a ApiClient,
}

impl DashboardApi<'_> {
    pub async fn summary(self) -> Result<Value, ApiError> {
        self.client.get("/dashboard/summary").await
    }

    pub async fn income_summary(self) -> Result<Value, ApiError> {
        self.client.get("/dashboard/income-summary").await
    }

    pub async fn gallon_summary(self) -> Result<Value, ApiError> {
        self.client.get("/dashboard/gallon-summary").await
    }

    pub async fn active_customers(self) -> Result<Value, ApiError> {
        self.client.get("/dashboard/active-customers").await
    }

    pub async fn debt_status(self) -> Result<Value, ApiError> {
        self.client.get("/dashboard/debt-status").await
    }

    pub async fn today_activity(self) -> Result<Value, ApiError> {
        self.client.get("/dashboard/today-activity").await
    }
}

#[derive(Clone, Copy)]
pub struct CustomersApi<'a> {
    client: &'a ApiClient,
}

impl CustomersApi<'_> {
    pub async fn get_all(self) -> Result<Vec<Customer>, ApiError> {
        let body: Envelope<Vec<Customer>> = self.client.get("/customers").await?;
        Ok(body.into_inner())
    }

    pub async fn get_by_id(self, id: i64) -> Result<Customer, ApiError> {
        let body: Envelope<Customer> = self.client.get(&format!("/customers/{}", id)).await?;
        Ok(body.into_inner())
    }

    pub async fn create(self, customer: &CustomerPayload) -> Result<Customer, ApiError> {
        let body: Envelope<Customer> = self.client.post("/customers", customer).await?;
        Ok(body.into_inner())
    }

    /// Returns the raw response body; the backend may answer with only the
    /// fields it changed.
    pub async fn update(self, id: i64, customer: &CustomerPayload) -> Result<Value, ApiError> {
        let body: Envelope<Value> = self.client.put(&format!("/customers/{}", id), customer).await?;
        Ok(body.into_inner())
    }

    pub async fn delete(self, id: i64) -> Result<Value, ApiError> {
        self.client.delete(&format!("/customers/{}", id)).await
    }

    /// Upload a customer photo as the `customer_photo` form field.
    pub async fn upload_photo(
        self,
        id: i64,
        file_name: &str,
        mime: &str,
        bytes: Vec<u8>,
    ) -> Result<Value, ApiError> {
        let form = FormData::new().file(PHOTO_FIELD, file_name, mime, bytes);
        let body: Envelope<Value> = self
            .client
            .upload(&format!("/customers/{}/photo", id), &form)
            .await?;
        Ok(body.into_inner())
    }
}

#[derive(Clone, Copy)]
pub struct TransactionsApi<'a> {
    client: &'a ApiClient,
}

impl TransactionsApi<'_> {
    pub async fn get_all(self) -> Result<Value, ApiError> {
        self.client.get("/transactions").await
    }

    pub async fn get_by_id(self, id: i64) -> Result<Value, ApiError> {
        self.client.get(&format!("/transactions/{}", id)).await
    }

    pub async fn get_by_customer_id(self, customer_id: i64) -> Result<Value, ApiError> {
        self.client
            .get(&format!("/transactions/customer/{}", customer_id))
            .await
    }

    pub async fn get_by_filter(self, filters: &[(&str, &str)]) -> Result<Value, ApiError> {
        self.client.get_with_query("/transactions/filter", filters).await
    }

    pub async fn create<B: Serialize + ?Sized>(self, transaction: &B) -> Result<Value, ApiError> {
        self.client.post("/transactions", transaction).await
    }

    pub async fn delete(self, id: i64) -> Result<Value, ApiError> {
        self.client.delete(&format!("/transactions/{}", id)).await
    }

    /// Undo a soft delete
    pub async fn restore(self, id: i64) -> Result<Value, ApiError> {
        self.client
            .put(&format!("/transactions/restore/{}", id), &json!({}))
            .await
    }
}

#[derive(Clone, Copy)]
pub struct PaymentsApi<'a> {
    client: &'a ApiClient,
}

impl PaymentsApi<'_> {
    pub async fn get_all(self) -> Result<Value, ApiError> {
        self.client.get("/paymentlogs").await
    }

    pub async fn get_by_id(self, id: i64) -> Result<Value, ApiError> {
        self.client.get(&format!("/paymentlogs/{}", id)).await
    }

    pub async fn get_by_transaction_id(self, transaction_id: i64) -> Result<Value, ApiError> {
        self.client
            .get(&format!("/paymentlogs/transaction/{}", transaction_id))
            .await
    }

    /// Outstanding debts, optionally filtered
    pub async fn get_debts(self, filters: &[(&str, &str)]) -> Result<Value, ApiError> {
        self.client.get_with_query("/paymentlogs/getdebts", filters).await
    }

    pub async fn create<B: Serialize + ?Sized>(self, payment: &B) -> Result<Value, ApiError> {
        self.client.post("/paymentlogs", payment).await
    }

    pub async fn pay_debt<B: Serialize + ?Sized>(self, payment: &B) -> Result<Value, ApiError> {
        self.client.post("/paymentlogs/paydebt", payment).await
    }
}

//! Mock payment provider for testing.
//!
//! Records every request it receives and hands out deterministic ids.
//! Supports error injection for failure-path tests.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::ports::{
    CheckoutSession, CreateCheckoutRequest, CreateCustomerRequest, Customer, PaymentError,
    PaymentProvider,
};

/// Mock payment provider for testing.
///
/// # Example
///
/// ```ignore
/// let mock = MockPaymentProvider::new();
/// let handler = CreateCheckoutHandler::new(store.clone(), store, Arc::new(mock), ...);
/// ```
#[derive(Default)]
pub struct MockPaymentProvider {
    inner: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    customers: Vec<CreateCustomerRequest>,
    checkouts: Vec<CreateCheckoutRequest>,
    error: Option<PaymentError>,
}

impl MockPaymentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// A provider whose every call fails with a retryable provider error.
    pub fn failing() -> Self {
        let mock = Self::new();
        mock.set_error(PaymentError::provider("Simulated Stripe outage"));
        mock
    }

    pub fn set_error(&self, error: PaymentError) {
        self.state().error = Some(error);
    }

    pub fn customer_count(&self) -> usize {
        self.state().customers.len()
    }

    pub fn checkout_requests(&self) -> Vec<CreateCheckoutRequest> {
        self.state().checkouts.clone()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<Customer, PaymentError> {
        let mut state = self.state();
        if let Some(error) = &state.error {
            return Err(error.clone());
        }
        state.customers.push(request);
        Ok(Customer {
            id: format!("cus_mock_{}", state.customers.len()),
        })
    }

    async fn create_checkout_session(
        &self,
        request: CreateCheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        let mut state = self.state();
        if let Some(error) = &state.error {
            return Err(error.clone());
        }
        state.checkouts.push(request);
        let id = format!("cs_mock_{}", state.checkouts.len());
        Ok(CheckoutSession {
            url: format!("https://checkout.stripe.com/c/pay/{}", id),
            id,
        })
    }
}

/*!
# Ferret: Billing Collaborator

Stripe-shaped checkout/portal/webhook endpoints are forwarded to this
trait, an ambient collaborator boundary kept separate from the core
encoding pipeline. [`UnconfiguredBilling`] answers every call with
`NotImplemented`, which the HTTP layer renders as 501.
*/

use serde_json::Value;

use crate::error::HttpError;

/// # Billing Collaborator.
pub trait BillingStore: Send + Sync {
	/// # Start a Checkout Session for a User.
	fn create_checkout_session(&self, user_id: &str, payload: &Value) -> Result<Value, HttpError>;

	/// # Open a Billing-Portal Session for a User.
	fn create_portal_session(&self, user_id: &str) -> Result<Value, HttpError>;

	/// # Handle an Inbound Webhook Event.
	fn handle_webhook(&self, payload: &[u8], signature: Option<&str>) -> Result<(), HttpError>;
}

#[derive(Debug, Default, Clone, Copy)]
/// # No Billing Backend Configured.
pub struct UnconfiguredBilling;

impl BillingStore for UnconfiguredBilling {
	fn create_checkout_session(&self, _user_id: &str, _payload: &Value) -> Result<Value, HttpError> {
		Err(HttpError::NotImplemented)
	}

	fn create_portal_session(&self, _user_id: &str) -> Result<Value, HttpError> {
		Err(HttpError::NotImplemented)
	}

	fn handle_webhook(&self, _payload: &[u8], _signature: Option<&str>) -> Result<(), HttpError> {
		Err(HttpError::NotImplemented)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn unconfigured_billing_is_always_not_implemented() {
		let billing = UnconfiguredBilling;
		let err = billing.create_checkout_session("user-1", &json!({})).unwrap_err();
		assert_eq!(err.status(), 501);
	}
}

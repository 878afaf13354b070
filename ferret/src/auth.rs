/*!
# Ferret: Auth Collaborator (§6)

`AuthStore` is the boundary between the core and whatever actually owns
user identity and subscription state. This crate treats tokens, user
ids, and audit payloads as opaque — it never decodes a JWT or touches a
cookie jar directly.

[`NullAuthStore`] is the dev-mode stand-in used whenever no real
collaborator is wired up: it recognizes nobody, which (per §4.7 step 1)
is exactly the behavior that still lets unauthenticated Expert requests
through when no env API keys are configured either.
*/

use serde_json::Value;

#[derive(Debug, Clone)]
/// # Authenticated User.
pub struct User {
	/// # Opaque User Id.
	pub id: String,
}

/// # Auth Collaborator.
pub trait AuthStore: Send + Sync {
	/// # Validate a Bearer/Cookie Access Token.
	fn validate_access(&self, token: &str) -> Option<User>;

	/// # Validate an API Key for a Given Scope.
	fn api_key_allowed(&self, token: &str, scope: &str) -> Option<User>;

	/// # Does This User Have an Active Subscription?
	///
	/// `active`, `trialing`, and `past_due` (with a future period end) all
	/// count as active per §4.7.
	fn has_active_subscription(&self, user_id: &str) -> bool;

	/// # Record an Audit Event. Side-effect only.
	fn record_audit(&self, user_id: &str, event: &str, metadata: &Value);
}

#[derive(Debug, Default, Clone, Copy)]
/// # Dev-Mode Stand-In.
///
/// Recognizes no token and grants no subscription; every call is a no-op.
/// Paired with an empty `expert_api_keys` set, this is what makes local
/// development "just work" without a real identity provider.
pub struct NullAuthStore;

impl AuthStore for NullAuthStore {
	fn validate_access(&self, _token: &str) -> Option<User> { None }
	fn api_key_allowed(&self, _token: &str, _scope: &str) -> Option<User> { None }
	fn has_active_subscription(&self, _user_id: &str) -> bool { false }
	fn record_audit(&self, _user_id: &str, _event: &str, _metadata: &Value) {}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn null_store_recognizes_nothing() {
		let store = NullAuthStore;
		assert!(store.validate_access("anything").is_none());
		assert!(store.api_key_allowed("anything", "expert").is_none());
		assert!(!store.has_active_subscription("user-1"));
	}
}

//! Advisory digest authentication of request `auth` assertions.

use serde::Deserialize;
use serde_json::Value;

/// A digest assertion carried in a frame's `auth` member.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct DigestAssertion {
    pub realm: String,
    pub username: String,
    pub nonce: String,
    pub cnonce: String,
    pub response: String,
}

impl DigestAssertion {
    /// Extract an assertion. Returns `None` unless all five members are strings.
    pub fn from_value(auth: &Value) -> Option<Self> {
        serde_json::from_value(auth.clone()).ok()
    }
}

impl std::fmt::Debug for DigestAssertion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DigestAssertion")
            .field("realm", &self.realm)
            .field("username", &self.username)
            .field("response", &format_args!("<redacted:{} bytes>", self.response.len()))
            .finish_non_exhaustive()
    }
}

/// Failure of the credential store itself, as opposed to a wrong password.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("credential store unavailable: {0}")]
    Unavailable(String),
}

/// Verifies digest assertions against stored credentials.
pub trait CredentialStore {
    /// `Ok(false)` means the assertion does not match.
    fn verify_digest(&self, assertion: &DigestAssertion) -> Result<bool, AuthError>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_complete_assertion() {
        let assertion = DigestAssertion::from_value(&json!({
            "realm": "linkrpc",
            "username": "admin",
            "nonce": "n",
            "cnonce": "c",
            "response": "r",
            "algorithm": "SHA-256"
        }))
        .unwrap();
        assert_eq!(assertion.username, "admin");
    }

    #[test]
    fn incomplete_assertion_is_none() {
        assert!(DigestAssertion::from_value(&json!({"realm": "linkrpc"})).is_none());
        assert!(DigestAssertion::from_value(&json!("token")).is_none());
    }

    #[test]
    fn debug_hides_response() {
        let assertion = DigestAssertion {
            realm: "linkrpc".into(),
            username: "admin".into(),
            nonce: "n".into(),
            cnonce: "c".into(),
            response: "0123456789abcdef".into(),
        };
        assert!(!format!("{assertion:?}").contains("0123456789abcdef"));
    }
}

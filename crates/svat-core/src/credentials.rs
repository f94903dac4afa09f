//! Login, registration and activation inputs.

use std::fmt;

/// Login credentials for the identity endpoint.
///
/// # Security
///
/// The secret is never exposed in Debug output to prevent accidental logging.
///
/// # Example
///
/// ```
/// use svat_core::Credentials;
///
/// let creds = Credentials::new("alice@example.com", "hunter2");
/// assert_eq!(creds.identifier(), "alice@example.com");
/// ```
#[derive(Clone)]
pub struct Credentials {
    identifier: String,
    secret: String,
}

impl Credentials {
    /// Create new credentials.
    ///
    /// # Arguments
    ///
    /// * `identifier` - The account e-mail address
    /// * `secret` - The account password
    pub fn new(identifier: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            secret: secret.into(),
        }
    }

    /// Returns the identifier.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Returns the secret.
    ///
    /// # Security
    ///
    /// Use this only when constructing authentication requests.
    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identifier", &self.identifier)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// A new account registration.
#[derive(Clone)]
pub struct Registration {
    pub identifier: String,
    pub display_name: String,
    secret: String,
    secret_confirmation: String,
}

impl Registration {
    pub fn new(
        identifier: impl Into<String>,
        display_name: impl Into<String>,
        secret: impl Into<String>,
        secret_confirmation: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            display_name: display_name.into(),
            secret: secret.into(),
            secret_confirmation: secret_confirmation.into(),
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn secret_confirmation(&self) -> &str {
        &self.secret_confirmation
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("identifier", &self.identifier)
            .field("display_name", &self.display_name)
            .field("secret", &"[REDACTED]")
            .field("secret_confirmation", &"[REDACTED]")
            .finish()
    }
}

/// An account activation link, as sent by e-mail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    pub user_id: String,
    pub token: String,
}

impl Activation {
    pub fn new(user_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            token: token.into(),
        }
    }
}

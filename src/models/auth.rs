//! Authentication results attached to each request

use serde::Serialize;

use super::User;

/// Display name given to requests authenticated with the shared secret
pub const SECRET_ADMIN_NAME: &str = "secret_admin";

/// Scopes a request may carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Authenticated,
    Admin,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Authenticated => "authenticated",
            Scope::Admin => "admin",
        }
    }
}

/// The principal behind an authenticated request
#[derive(Debug, Clone, Serialize)]
pub struct AuthUser {
    pub display_name: String,
    /// Stable identifier. The user id for database users, empty for the shared secret.
    pub identity: String,
    #[serde(skip)]
    pub user: Option<User>,
}

impl AuthUser {
    /// Wrap a database user. Display name and identity default to the
    /// username and id.
    pub fn from_user(user: User) -> Self {
        Self {
            display_name: user.username.clone(),
            identity: user.id.to_string(),
            user: Some(user),
        }
    }

    pub fn named(display_name: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            identity: identity.into(),
            user: None,
        }
    }

    /// The shared-secret administrator
    pub fn secret_admin() -> Self {
        Self::named(SECRET_ADMIN_NAME, "")
    }

    /// Database id behind this principal, if any.
    pub fn user_id(&self) -> Option<i64> {
        self.user
            .as_ref()
            .map(|u| u.id)
            .or_else(|| self.identity.parse().ok())
    }
}

/// Outcome of authenticating a request
#[derive(Debug, Clone, Default)]
pub struct Authentication {
    scopes: Vec<Scope>,
    user: Option<AuthUser>,
}

impl Authentication {
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// An authenticated principal, with the admin scope when `is_admin`.
    pub fn granted(user: AuthUser, is_admin: bool) -> Self {
        let mut scopes = vec![Scope::Authenticated];
        if is_admin {
            scopes.push(Scope::Admin);
        }
        Self {
            scopes,
            user: Some(user),
        }
    }

    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    pub fn has_scope(&self, scope: Scope) -> bool {
        self.scopes.contains(&scope)
    }

    pub fn is_authenticated(&self) -> bool {
        self.has_scope(Scope::Authenticated)
    }

    pub fn is_admin(&self) -> bool {
        self.has_scope(Scope::Admin)
    }

    pub fn user(&self) -> Option<&AuthUser> {
        self.user.as_ref()
    }
}

use crate::api::RemoteUser;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    fn parse(raw: Option<&str>) -> Self {
        match raw.map(|r| r.trim().to_ascii_lowercase()) {
            Some(r) if r == "admin" => Role::Admin,
            _ => Role::User,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub display_name: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub token: String,
    pub user: User,
}

impl Session {
    /// Build a session from a token response. When the server sends no user
    /// object, the entered username is used with the admin role.
    pub fn from_login(token: String, remote: Option<RemoteUser>, entered_username: &str) -> Self {
        let user = match remote {
            Some(remote) => {
                let display_name = remote
                    .full_name
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| remote.username.clone());
                User {
                    role: Role::parse(remote.role.as_deref()),
                    username: remote.username,
                    display_name,
                }
            }
            None => User {
                username: entered_username.to_string(),
                display_name: entered_username.to_string(),
                role: Role::Admin,
            },
        };
        Self { token, user }
    }

    /// Upload, index sync, hash backfill and delete are admin-only.
    pub fn is_admin(&self) -> bool {
        self.user.role == Role::Admin
    }
}

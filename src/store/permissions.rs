use serde::{Deserialize, Serialize};
use serenity::async_trait;
use serenity::model::guild::Member;
use std::path::PathBuf;

use super::JsonStore;
use crate::error::StoreError;

/// The parts of an invoking member an authorization decision needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Caller {
    pub user_id: u64,
    pub role_ids: Vec<u64>,
    pub administrator: bool,
}

impl Caller {
    pub fn new(user_id: u64) -> Self {
        Self {
            user_id,
            ..Default::default()
        }
    }

    /// Builds a caller from an interaction's member. Outside a guild only the
    /// user id is known.
    pub fn from_member(user_id: u64, member: Option<&Member>) -> Self {
        match member {
            Some(member) => Self {
                user_id,
                role_ids: member.roles.iter().map(|r| r.get()).collect(),
                administrator: member
                    .permissions
                    .map(|p| p.administrator())
                    .unwrap_or(false),
            },
            None => Self::new(user_id),
        }
    }
}

#[async_trait]
pub trait AuthPolicy: Send + Sync {
    async fn is_authorized(&self, caller: &Caller) -> bool;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    #[serde(default)]
    pub allowed_users: Vec<u64>,
    #[serde(default)]
    pub allowed_roles: Vec<u64>,
}

impl Permissions {
    pub fn allows(&self, caller: &Caller) -> bool {
        caller.administrator
            || self.allowed_users.contains(&caller.user_id)
            || caller.role_ids.iter().any(|r| self.allowed_roles.contains(r))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grant {
    User(u64),
    Role(u64),
}

/// `permissions.json`: the moderator allow-list.
pub struct PermissionStore {
    store: JsonStore<Permissions>,
}

impl PermissionStore {
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            store: JsonStore::open(path).await,
        }
    }

    pub async fn snapshot(&self) -> Permissions {
        self.store.read(Permissions::clone).await
    }

    /// Returns `false` when the grant was already present.
    pub async fn add(&self, grant: Grant) -> Result<bool, StoreError> {
        self.store
            .update(|perms| {
                let list = match grant {
                    Grant::User(_) => &mut perms.allowed_users,
                    Grant::Role(_) => &mut perms.allowed_roles,
                };
                let id = grant.id();
                if list.contains(&id) {
                    return Ok(false);
                }
                list.push(id);
                Ok(true)
            })
            .await
    }

    /// Returns `false` when there was nothing to remove.
    pub async fn remove(&self, grant: Grant) -> Result<bool, StoreError> {
        self.store
            .update(|perms| {
                let list = match grant {
                    Grant::User(_) => &mut perms.allowed_users,
                    Grant::Role(_) => &mut perms.allowed_roles,
                };
                let id = grant.id();
                let before = list.len();
                list.retain(|x| *x != id);
                Ok(list.len() != before)
            })
            .await
    }
}

impl Grant {
    fn id(self) -> u64 {
        match self {
            Grant::User(id) | Grant::Role(id) => id,
        }
    }
}

#[async_trait]
impl AuthPolicy for PermissionStore {
    async fn is_authorized(&self, caller: &Caller) -> bool {
        self.store.read(|perms| perms.allows(caller)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caller(user_id: u64, roles: &[u64], administrator: bool) -> Caller {
        Caller {
            user_id,
            role_ids: roles.to_vec(),
            administrator,
        }
    }

    #[test]
    fn administrator_always_allowed() {
        let perms = Permissions::default();
        assert!(perms.allows(&caller(1, &[], true)));
        assert!(!perms.allows(&caller(1, &[], false)));
    }

    #[test]
    fn allow_list_by_user_or_role() {
        let perms = Permissions {
            allowed_users: vec![10],
            allowed_roles: vec![500],
        };
        assert!(perms.allows(&caller(10, &[], false)));
        assert!(perms.allows(&caller(11, &[400, 500], false)));
        assert!(!perms.allows(&caller(11, &[400], false)));
    }

    #[tokio::test]
    async fn grants_persist_in_original_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("permissions.json");
        let store = PermissionStore::open(&path).await;

        assert!(store.add(Grant::User(10)).await.unwrap());
        assert!(!store.add(Grant::User(10)).await.unwrap());
        assert!(store.add(Grant::Role(500)).await.unwrap());
        assert!(store.is_authorized(&caller(10, &[], false)).await);

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["allowed_users"], serde_json::json!([10]));
        assert_eq!(raw["allowed_roles"], serde_json::json!([500]));

        assert!(store.remove(Grant::User(10)).await.unwrap());
        assert!(!store.remove(Grant::User(10)).await.unwrap());
        assert!(!store.is_authorized(&caller(10, &[], false)).await);
    }
}

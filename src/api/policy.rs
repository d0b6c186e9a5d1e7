//! Authorization policy consulted by the bearer-authenticated routes.

use crate::model::Role;

/// Answers whether `role` may perform `action` (an HTTP method) on `resource`
/// (a route template such as `/v1/users/{id}`).
pub trait Authorizer: Send + Sync {
    fn allowed(&self, role: Role, resource: &str, action: &str) -> bool;
}

/// Admins may do anything; standard accounts only manage themselves.
#[derive(Clone, Copy, Debug, Default)]
pub struct RolePolicy;

pub const SELF_RESOURCE: &str = "/v1/users/me";

impl Authorizer for RolePolicy {
    fn allowed(&self, role: Role, resource: &str, action: &str) -> bool {
        match role {
            Role::Admin => true,
            Role::Standard => {
                resource == SELF_RESOURCE && matches!(action, "GET" | "PUT" | "DELETE")
            }
        }
    }
}

//! Permission extractors.
//!
//! Handlers declare what they need in their signature:
//!
//! ```ignore
//! async fn report(_: RequiresPermission<resource::CostTracking, operation::ReadAll>) { ... }
//! ```
//!
//! Cost reports expose spend across every user and agent, so every permission is granted to
//! admins only.

use std::marker::PhantomData;

use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::debug;

use crate::{
    AppState,
    api::models::users::CurrentUser,
    errors::Error,
    types::{Operation, Permission, Resource},
};

pub mod resource {
    use crate::types::Resource;

    pub trait ResourceMarker: Send + Sync + 'static {
        const RESOURCE: Resource;
    }

    pub struct CostTracking;

    impl ResourceMarker for CostTracking {
        const RESOURCE: Resource = Resource::CostTracking;
    }
}

pub mod operation {
    use crate::types::Operation;

    pub trait OperationMarker: Send + Sync + 'static {
        const OPERATION: Operation;
    }

    pub struct ReadAll;

    impl OperationMarker for ReadAll {
        const OPERATION: Operation = Operation::ReadAll;
    }
}

use operation::OperationMarker;
use resource::ResourceMarker;

/// Whether `user` may perform `operation` on `resource`
pub fn has_permission(user: &CurrentUser, resource: Resource, operation: Operation) -> bool {
    match (resource, operation) {
        (Resource::CostTracking, Operation::ReadAll) => user.is_admin(),
    }
}

/// Extractor that authenticates the caller and checks a permission; yields the caller
pub struct RequiresPermission<R, O> {
    pub user: CurrentUser,
    _marker: PhantomData<(R, O)>,
}

impl<R, O> RequiresPermission<R, O>
where
    R: ResourceMarker,
    O: OperationMarker,
{
    pub fn check(user: CurrentUser) -> Result<Self, Error> {
        if !has_permission(&user, R::RESOURCE, O::OPERATION) {
            debug!(user = %user.id, resource = %R::RESOURCE, "Permission denied");
            return Err(Error::InsufficientPermissions {
                required: Permission::Allow(R::RESOURCE, O::OPERATION),
                action: O::OPERATION,
                resource: R::RESOURCE,
            });
        }
        Ok(Self {
            user,
            _marker: PhantomData,
        })
    }
}

impl<R, O> FromRequestParts<AppState> for RequiresPermission<R, O>
where
    R: ResourceMarker,
    O: OperationMarker,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        Self::check(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{admin_user, standard_user};
    use axum::http::StatusCode;

    type ReadCosts = RequiresPermission<resource::CostTracking, operation::ReadAll>;

    #[test]
    fn test_admin_may_read_costs() {
        let granted = ReadCosts::check(admin_user()).unwrap();
        assert_eq!(granted.user, admin_user());
    }

    #[test]
    fn test_standard_user_is_forbidden() {
        let Err(err) = ReadCosts::check(standard_user()) else {
            panic!("standard users must not read cost reports");
        };
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(err.user_message(), "Insufficient permissions to Read cost tracking reports");
    }
}

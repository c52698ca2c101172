//! Authentication and authorization.
//!
//! Callers authenticate with one of:
//!
//! - **JWT sessions** (`auth.native`): an HS256 token signed with `secret_key`, sent as
//!   `Authorization: Bearer <token>` or in the session cookie.
//! - **Proxy headers** (`auth.proxy_header`): identity and roles set by a trusted upstream proxy.
//!
//! [`current_user`] resolves the caller, and [`permissions::RequiresPermission`] gates handlers on
//! a role check. Cost reports require the admin role.

pub mod current_user;
pub mod permissions;
pub mod session;

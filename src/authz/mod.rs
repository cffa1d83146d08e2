//! Authorization: effective grants of the authenticated user.
//!
//! Roles carry permissions; users carry roles. Admin endpoints check a single
//! permission through [`Principal::require`], while menu resolution consumes the
//! raw role-id and permission sets.

mod principal;

pub use principal::Principal;

/// Well-known role names
pub mod roles {
    pub const SUPER_ADMIN: &str = "super_admin";
    pub const ADMIN: &str = "admin";
    /// Assigned on registration
    pub const USER: &str = "user";
}

/// Well-known permission names
pub mod permissions {
    pub const MENUS_MANAGE: &str = "menus.manage";
    pub const ROLES_MANAGE: &str = "roles.manage";
    pub const NOTIFICATIONS_SEND: &str = "notifications.send";
    pub const USERS_VIEW: &str = "users.view";
    pub const DASHBOARD_VIEW: &str = "dashboard.view";
}

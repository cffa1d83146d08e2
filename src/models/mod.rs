pub mod menu;
pub mod notification;
pub mod rbac;
pub mod user;

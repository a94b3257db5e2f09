pub mod auth_service;
pub mod org_service;

pub use auth_service::AuthService;
pub use org_service::OrganizationService;

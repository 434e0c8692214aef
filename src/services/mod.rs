pub mod auth_service;
pub mod export_service;
pub mod notification_service;
pub mod report_service;

pub use auth_service::AuthService;
pub use notification_service::NotificationService;
pub use report_service::ReportService;

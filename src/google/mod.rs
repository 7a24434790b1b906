//! Google Workspace integrations: service-account auth, Sheets, Forms and
//! Drive.

pub mod auth;
pub mod drive;
pub mod forms;
pub mod sheets;

pub use auth::{GoogleClient, authorize};
pub use drive::DriveClient;
pub use forms::{FormInfo, FormsClient};
pub use sheets::SheetsClient;

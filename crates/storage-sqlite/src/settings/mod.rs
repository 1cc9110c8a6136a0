//! SQLite storage for key/value application settings.

mod model;
mod repository;

pub use model::AppSettingDB;
pub use repository::SettingsRepository;

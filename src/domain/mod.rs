pub mod analog;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod models;
pub mod settings;

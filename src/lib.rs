pub mod app;
pub mod error;
pub mod models;
pub mod services;

pub use app::{App, AppCmd, AppMsg};
pub use error::RegistryError;

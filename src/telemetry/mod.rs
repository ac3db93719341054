pub mod models;
pub mod uploader;

pub use models::{selected_models, SelectedModels};
pub use uploader::{store_models, upload_telemetry};

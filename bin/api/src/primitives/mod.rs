pub use app_error::AppError;
pub use app_json::AppJson;
pub use app_state::AppState;

mod app_error;
mod app_json;
mod app_state;

pub mod app;

pub use app::{build_router, cors_layer, AppState};

mod app_router;

pub use app_router::{AppRouter, ServerState};

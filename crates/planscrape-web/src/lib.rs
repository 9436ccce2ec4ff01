mod routes;

pub use routes::{AppState, router};

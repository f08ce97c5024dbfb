use std::sync::Arc;

use phantom_engine::SharedState;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SharedState>,
    /// Expected X-API-Key value; None disables the check.
    pub api_key: Option<String>,
    pub data_dir: String,
}

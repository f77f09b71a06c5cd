use std::sync::Arc;

use axon_runtime::Gateway;

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
}

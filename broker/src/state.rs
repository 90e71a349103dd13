use std::sync::Arc;

use auth::Auth;
use common::trigger::TriggerClient;
use secretclient::SecretClient;
use store::Store;

pub struct AppState {
    pub store: Arc<dyn Store>,
    pub auth: Arc<Auth>,
    pub secrets: Arc<dyn SecretClient>,
    pub trigger: TriggerClient,
}

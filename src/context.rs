use std::sync::Arc;

use crate::auth::AuthManager;
use crate::config::Config;
use crate::db::Db;
use crate::service::TokenService;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppContext {
    pub db: Db,
    pub tokens: Arc<TokenService>,
    pub auth: Arc<AuthManager>,
    pub config: Arc<Config>,
}

//! Shared gateway state

use std::sync::Arc;

use crate::db::Database;
use crate::trading::TradingService;

pub struct AppState {
    pub trading: Arc<TradingService>,
    pub db: Arc<Database>,
}

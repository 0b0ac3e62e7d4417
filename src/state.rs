use std::sync::Arc;

use crate::database::Store;
use crate::face::FaceAnalyzer;
use crate::payment::PaymentGateway;

/// Shared handles passed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub faces: Arc<FaceAnalyzer>,
    pub session_ttl_hours: i64,
}

use axum::Json;

use crate::build_info::BuildInfo;

/// GET /version
pub async fn version() -> Json<BuildInfo> {
    Json(BuildInfo::current())
}

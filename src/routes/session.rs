use rocket::serde::json::Json;
use rocket_okapi::openapi;

use crate::guards::AuthGuard;
use crate::utils::ApiResponse;

/// Who the bearer token was issued to.
#[openapi(tag = "Session")]
#[get("/session")]
pub async fn get_session(auth: AuthGuard) -> Json<ApiResponse<serde_json::Value>> {
    Json(ApiResponse::success(serde_json::json!({
        "mobile": auth.mobile,
        "countryCode": auth.country_code,
    })))
}

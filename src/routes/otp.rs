use log::error;
use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use uuid::Uuid;

use crate::models::{
    BackspaceDto, Destination, DigitInputDto, FlowView, ResendResponse, StartFlowDto,
    VerifyResponse,
};
use crate::services::{FlowHandle, FlowRegistry, JwtService, RateLimiter};
use crate::utils::{
    clean_phone, format_display_phone, validate_country_code, validate_mobile, ApiError,
    ApiResponse, DEFAULT_COUNTRY_CODE,
};

fn parse_id(id: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(id).map_err(|_| ApiError::not_found("OTP flow not found"))
}

/// Snapshot of the flow plus every signal queued since the last response.
async fn render(id: Uuid, handle: &FlowHandle) -> FlowView {
    let mut flow = handle.lock().await;
    let destination = flow.destination();

    FlowView {
        id: id.to_string(),
        display_phone: format_display_phone(&destination.mobile, &destination.country_code),
        slots: flow.buffer().to_strings(),
        focus: flow.focus(),
        phase: flow.phase(),
        complete: flow.is_complete(),
        seconds_remaining: flow.timer().seconds_remaining(),
        can_resend: flow.timer().can_resend(),
        signals: flow.drain_signals(),
    }
}

/// --------------------
/// Start flow (send OTP)
/// --------------------
#[openapi(tag = "OTP")]
#[post("/otp/flows", data = "<dto>")]
pub async fn start_flow(
    registry: &State<FlowRegistry>,
    limiter: &State<RateLimiter>,
    dto: Json<StartFlowDto>,
) -> Result<Json<ApiResponse<FlowView>>, ApiError> {
    let mobile = clean_phone(&dto.mobile);
    if !validate_mobile(&mobile) {
        return Err(ApiError::bad_request(
            "Please enter a valid 10-digit phone number",
        ));
    }

    let country_code = dto
        .country_code
        .as_deref()
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .unwrap_or(DEFAULT_COUNTRY_CODE)
        .to_string();
    if !validate_country_code(&country_code) {
        return Err(ApiError::bad_request("Invalid country code"));
    }

    limiter.check(&format!("start_flow:{}", mobile))?;

    let destination = Destination::new(mobile, country_code);
    registry
        .issue_initial_code(&destination)
        .await
        .map_err(|e| {
            error!("Failed to send OTP to {}: {}", destination.mobile, e);
            ApiError::internal_error("Failed to send OTP")
        })?;

    let (id, handle) = registry.start(destination).await;
    Ok(Json(ApiResponse::success_with_message(
        "OTP sent successfully",
        render(id, &handle).await,
    )))
}

#[openapi(tag = "OTP")]
#[get("/otp/flows/<id>")]
pub async fn get_flow(
    registry: &State<FlowRegistry>,
    id: String,
) -> Result<Json<ApiResponse<FlowView>>, ApiError> {
    let id = parse_id(&id)?;
    let handle = registry.get(id).await?;

    Ok(Json(ApiResponse::success(render(id, &handle).await)))
}

/// --------------------
/// Typed or pasted digits
/// --------------------
#[openapi(tag = "OTP")]
#[post("/otp/flows/<id>/input", data = "<dto>")]
pub async fn digit_input(
    registry: &State<FlowRegistry>,
    id: String,
    dto: Json<DigitInputDto>,
) -> Result<Json<ApiResponse<FlowView>>, ApiError> {
    let id = parse_id(&id)?;
    let handle = registry.get(id).await?;
    handle.lock().await.on_digit_input(dto.slot, &dto.text)?;

    Ok(Json(ApiResponse::success(render(id, &handle).await)))
}

#[openapi(tag = "OTP")]
#[post("/otp/flows/<id>/backspace", data = "<dto>")]
pub async fn backspace(
    registry: &State<FlowRegistry>,
    id: String,
    dto: Json<BackspaceDto>,
) -> Result<Json<ApiResponse<FlowView>>, ApiError> {
    let id = parse_id(&id)?;
    let handle = registry.get(id).await?;
    handle.lock().await.on_backspace(dto.slot)?;

    Ok(Json(ApiResponse::success(render(id, &handle).await)))
}

/// --------------------
/// Verify OTP
/// --------------------
/// A wrong code is still a 200: the attempt and the queued signals tell the
/// client what to show.
#[openapi(tag = "OTP")]
#[post("/otp/flows/<id>/verify")]
pub async fn verify(
    registry: &State<FlowRegistry>,
    id: String,
) -> Result<Json<ApiResponse<VerifyResponse>>, ApiError> {
    let id = parse_id(&id)?;
    let (handle, attempt) = registry.verify(id).await?;

    let access_token = match &attempt {
        Some(attempt) if attempt.is_success() => {
            let destination = handle.lock().await.destination().clone();
            let token = JwtService::generate_access_token(&destination)
                .map_err(|e| ApiError::internal_error(e.to_string()))?;
            Some(token)
        }
        _ => None,
    };

    let flow = render(id, &handle).await;
    Ok(Json(ApiResponse::success(VerifyResponse {
        attempt,
        flow,
        access_token,
    })))
}

/// --------------------
/// Resend OTP
/// --------------------
#[openapi(tag = "OTP")]
#[post("/otp/flows/<id>/resend")]
pub async fn resend(
    registry: &State<FlowRegistry>,
    id: String,
) -> Result<Json<ApiResponse<ResendResponse>>, ApiError> {
    let id = parse_id(&id)?;
    let (handle, resent) = registry.resend(id).await?;

    let flow = render(id, &handle).await;
    Ok(Json(ApiResponse::success(ResendResponse { resent, flow })))
}

#[openapi(tag = "OTP")]
#[delete("/otp/flows/<id>")]
pub async fn close_flow(
    registry: &State<FlowRegistry>,
    id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let id = parse_id(&id)?;
    if !registry.teardown(id).await {
        return Err(ApiError::not_found("OTP flow not found"));
    }

    Ok(Json(ApiResponse::success(serde_json::json!({
        "message": "OTP flow closed"
    }))))
}

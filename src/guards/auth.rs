use rocket::request::{self, FromRequest, Request, Outcome};
use rocket::http::Status;

// === OpenAPI (compatible with rocket_okapi 0.8.0 / 0.8.1) ===
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};
use rocket_okapi::r#gen::OpenApiGenerator;

/// Session established by a completed OTP flow.
pub struct AuthGuard {
    pub mobile: String,
    pub country_code: String,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthGuard {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let Some(token) = req.headers().get_one("Authorization") else {
            return Outcome::Error((Status::Unauthorized, ()));
        };
        let token = token.trim_start_matches("Bearer ");

        match crate::services::JwtService::verify_token(token) {
            Ok(claims) => Outcome::Success(AuthGuard {
                mobile: claims.sub,
                country_code: claims.country_code,
            }),
            Err(_) => Outcome::Error((Status::Unauthorized, ())),
        }
    }
}

impl<'a> OpenApiFromRequest<'a> for AuthGuard {
    fn from_request_input(
        _gen: &mut OpenApiGenerator,
        _name: String,
        _required: bool,
    ) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }
}

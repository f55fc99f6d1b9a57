use crate::error::MaiError;
use rocket::http::{ContentType, Header, Status};
use rocket::response::Responder;
use rocket::{Request, Response};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Cursor;

/// Standard API response structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<HashMap<String, serde_json::Value>>,
}

/// API error response structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    pub success: bool,
    pub error_code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<HashMap<String, serde_json::Value>>,
}

impl<T> ApiResponse<T>
where
    T: Serialize,
{
    /// Create a successful response
    pub fn success(value: T) -> Self {
        Self {
            success: true,
            value: Some(value),
            error_code: None,
            extra: None,
        }
    }
}

impl<'r, T> Responder<'r, 'static> for ApiResponse<T>
where
    T: Serialize,
{
    fn respond_to(self, _: &'r Request<'_>) -> rocket::response::Result<'static> {
        let json = serde_json::to_string(&self).map_err(|_| Status::InternalServerError)?;

        Response::build()
            .status(Status::Ok)
            .header(ContentType::JSON)
            .sized_body(json.len(), Cursor::new(json))
            .ok()
    }
}

impl From<&MaiError> for ApiErrorResponse {
    fn from(err: &MaiError) -> Self {
        // Infrastructure failures are logged, not echoed to the caller
        let message = match err.status() {
            500 => "Internal server error".to_string(),
            _ => err.to_string(),
        };
        Self {
            success: false,
            error_code: err.error_code(),
            message,
            extra: err.extra_data(),
        }
    }
}

impl<'r> Responder<'r, 'static> for MaiError {
    fn respond_to(self, _: &'r Request<'_>) -> rocket::response::Result<'static> {
        let status = Status::from_code(self.status()).unwrap_or(Status::InternalServerError);
        if status.code >= 500 {
            log::error!("Request failed: {self}");
        }

        let json = serde_json::to_string(&ApiErrorResponse::from(&self))
            .map_err(|_| Status::InternalServerError)?;

        let mut response = Response::build();
        response
            .status(status)
            .header(ContentType::JSON)
            .sized_body(json.len(), Cursor::new(json));
        if let Some(secs) = self.retry_after() {
            response.header(Header::new("Retry-After", secs.to_string()));
        }
        response.ok()
    }
}

/// Helper function to create success response
pub fn success_return<T>(value: T) -> ApiResponse<T>
where
    T: Serialize,
{
    ApiResponse::success(value)
}

/// CORS fairing for handling cross-origin requests
use rocket::fairing::{Fairing, Info, Kind};

pub struct CORS;

#[rocket::async_trait]
impl Fairing for CORS {
    fn info(&self) -> Info {
        Info {
            name: "Add CORS headers to responses",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(
        &self,
        _request: &'r rocket::Request<'_>,
        response: &mut rocket::Response<'r>,
    ) {
        response.set_header(Header::new("Access-Control-Allow-Origin", "*"));
        response.set_header(Header::new("Access-Control-Allow-Methods", "POST, GET, OPTIONS"));
        response.set_header(Header::new("Access-Control-Allow-Headers", "*"));
        response.set_header(Header::new("Access-Control-Expose-Headers", "Retry-After"));
    }
}

/// Result type alias for route handlers
pub type RouteResult<T> = Result<ApiResponse<T>, MaiError>;

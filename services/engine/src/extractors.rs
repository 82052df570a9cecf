use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use serde_json::json;
use shared::errors::ErrorCategory;
use validator::{Validate, ValidationErrors};

/// JSON body extractor that also runs `validator` rules
///
/// Malformed bodies and failed field rules both come back as the standard
/// error envelope instead of axum's plain-text rejection.
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ValidationJsonRejection;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(ValidationJsonRejection::Json)?;
        value.validate().map_err(ValidationJsonRejection::Rules)?;
        Ok(ValidatedJson(value))
    }
}

pub enum ValidationJsonRejection {
    Json(JsonRejection),
    Rules(ValidationErrors),
}

fn field_summary(errors: &ValidationErrors) -> String {
    let mut fields: Vec<String> = errors
        .field_errors()
        .into_iter()
        .map(|(field, errs)| {
            let reason = errs
                .iter()
                .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
                .unwrap_or_else(|| errs.first().map(|e| e.code.to_string()).unwrap_or_default());
            format!("{}: {}", field, reason)
        })
        .collect();
    fields.sort();
    fields.join("; ")
}

impl IntoResponse for ValidationJsonRejection {
    fn into_response(self) -> Response {
        let (code, message, original) = match &self {
            ValidationJsonRejection::Json(rejection) => {
                let original = rejection.body_text();
                let missing = original
                    .split("missing field `")
                    .nth(1)
                    .and_then(|s| s.split('`').next())
                    .map(str::to_string);

                match missing {
                    Some(field) => (
                        "VALIDATION_MISSING_FIELD",
                        format!("Missing required field: {}", field),
                        original,
                    ),
                    None if original.contains("Failed to deserialize") => (
                        "VALIDATION_INVALID_INPUT",
                        "Invalid request body: failed to parse JSON".to_string(),
                        original,
                    ),
                    None => ("VALIDATION_INVALID_INPUT", "Invalid request body".to_string(), original),
                }
            }
            ValidationJsonRejection::Rules(errors) => {
                let summary = field_summary(errors);
                ("VALIDATION_INVALID_INPUT", format!("Invalid request: {}", summary), summary)
            }
        };

        respond(code, message, &original)
    }
}

fn respond(code: &'static str, message: String, original: &str) -> Response {
    tracing::warn!(
        error_code = code,
        error_message = %message,
        original_error = %original,
        "Request validation failed"
    );

    metrics::counter!("errors_total", "category" => "Validation", "code" => code).increment(1);

    let body = Json(json!({
        "error": {
            "code": code,
            "message": message,
            "category": ErrorCategory::Validation,
        }
    }));

    (StatusCode::BAD_REQUEST, body).into_response()
}

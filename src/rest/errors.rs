use std::fmt;
use std::fmt::Formatter;

use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;

#[derive(Debug)]
pub enum ApiError {
    Generic(codes::ResultCode, &'static str, Option<String>),
    Validation(String, Option<String>),
    NotFound,
}

impl std::error::Error for ApiError {}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::convert::From<ApiError> for HttpResponse {
    fn from(error: ApiError) -> Self {
        ApiErrorData::from(error).into()
    }
}

impl std::convert::From<ApiError> for ApiErrorData {
    fn from(error: ApiError) -> Self {
        match error {
            ApiError::NotFound => ApiErrorData {
                code: codes::ResultCode::NotFound,
                message: codes::NOT_FOUND.to_string(),
                reason: Some("resource not found".to_string()),
            },
            ApiError::Generic(code, msg, ctx) => ApiErrorData {
                code,
                message: msg.to_string(),
                reason: ctx,
            },
            ApiError::Validation(msg, ctx) => ApiErrorData {
                code: codes::ResultCode::BadRequest,
                message: msg,
                reason: ctx,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiErrorData {
    pub code: codes::ResultCode,
    pub message: String,
    pub reason: Option<String>,
}

impl std::fmt::Display for ApiErrorData {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}: {}; {:?})", self.code, self.message, self.reason)
    }
}

impl std::error::Error for ApiErrorData {}

impl ResponseError for ApiErrorData {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::from(self.clone())
    }
}

impl std::convert::From<ApiErrorData> for HttpResponse {
    fn from(error: ApiErrorData) -> Self {
        #[derive(Serialize)]
        struct Response {
            pub error: ApiErrorData,
        }

        let mut resp = HttpResponse::build(error.code.clone().into());
        resp.json(&Response { error })
    }
}

pub fn bad_request(msg: &str, reason: Option<String>) -> HttpResponse {
    ApiError::Validation(msg.to_string(), reason).into()
}

pub fn internal_error(description: &str) -> HttpResponse {
    ApiError::Generic(
        codes::ResultCode::ServerError,
        codes::INTERNAL_ERROR,
        Some(description.to_string()),
    )
    .into()
}

pub mod codes {
    use actix_web::http::StatusCode;
    use serde::{Serialize, Serializer};

    pub const INTERNAL_ERROR: &str = "INTERNAL_SERVER_ERROR";
    pub const NOT_FOUND: &str = "NOT_FOUND";

    #[derive(Clone, Debug)]
    pub enum ResultCode {
        BadRequest,
        NotFound,
        ServerError,
    }

    impl std::fmt::Display for ResultCode {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            let status_code: StatusCode = self.into();
            status_code.fmt(f)
        }
    }

    impl std::convert::From<ResultCode> for StatusCode {
        fn from(code: ResultCode) -> StatusCode {
            StatusCode::from_u16(code.into()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }

    impl std::convert::From<&ResultCode> for StatusCode {
        fn from(code: &ResultCode) -> StatusCode {
            StatusCode::from_u16(code.into()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }

    impl std::convert::From<ResultCode> for u16 {
        fn from(code: ResultCode) -> u16 {
            u16::from(&code)
        }
    }

    impl std::convert::From<&ResultCode> for u16 {
        fn from(code: &ResultCode) -> u16 {
            match code {
                ResultCode::BadRequest => 400,
                ResultCode::NotFound => 404,
                ResultCode::ServerError => 500,
            }
        }
    }

    impl Serialize for ResultCode {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.serialize_u16(self.into())
        }
    }
}

//! Value-based response produced by handlers and adjusted by interceptors.

use http::{HeaderMap, StatusCode};

#[derive(Clone, Debug)]
pub struct WebResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl WebResponse {
    pub fn ok<B: Into<String>>(body: B) -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn with_status(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: String::new(),
        }
    }
}

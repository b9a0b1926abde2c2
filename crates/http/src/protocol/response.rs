use http::{Response, StatusCode};

/// Response head before the body is attached.
pub type ResponseHead = Response<()>;

/// Statuses whose responses never carry a body or framing headers.
#[inline]
pub fn is_bodiless_status(status: StatusCode) -> bool {
    status.is_informational() || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED
}

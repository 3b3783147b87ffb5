mod headers;
mod label;

pub use headers::parse_custom_headers;
pub use label::{SessionLabel, is_session_label};

//! Response assembly: the external API response (C10) and the downstream
//! backend payload (spec §6.2/§6.3).

pub mod backend_payload;
pub mod formatter;

pub use backend_payload::{build_backend_payload, extract_db_identifiers, BackendPayload, BackendPayloadInput, DbIdentifiers};
pub use formatter::{format_error, format_success, FormatterInput};

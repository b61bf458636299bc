//! CMP subsystem names and their API path prefixes.

pub const AUTH: &str = "auth";
pub const EVENT: &str = "event";
pub const RESOURCE: &str = "resource";
pub const SERVICE: &str = "service";
pub const SSH: &str = "ssh";

/// Every known subsystem.
pub const ALL: [&str; 5] = [AUTH, EVENT, RESOURCE, SERVICE, SSH];

/// Versioned path prefix of a subsystem's API.
pub fn api_prefix(subsystem: &str) -> Option<&'static str> {
    match subsystem {
        AUTH => Some("/v1.0/nas"),
        EVENT => Some("/v1.0/nes"),
        RESOURCE => Some("/v1.0/nrs"),
        SERVICE => Some("/v1.0/nws"),
        SSH => Some("/v1.0/gas"),
        _ => None,
    }
}

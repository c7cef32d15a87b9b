//! FFI interface for C++ interop
//!
//! Provides C-compatible functions for organizing rendered pages.
//! Requests and results cross the boundary as JSON strings.

use std::ffi::{c_char, CStr, CString};
use std::ptr;

use serde::Serialize;

use crate::extractors::SelectorMapBuilder;
use crate::logging::{init_logging, LoggingConfig};
use crate::organizer::{organize_request, OrganizeRequest};

/// Result struct returned to C++
/// Both pointers are owned by Rust and must be freed via free_organize_result
#[repr(C)]
pub struct OrganizeResultFFI {
    /// JSON-serialized result (null-terminated)
    pub json_ptr: *mut c_char,
    /// Error message if organizing failed (null-terminated), or null on success
    pub error_ptr: *mut c_char,
}

/// Organize pages according to a group schema.
///
/// # Arguments
/// * `request_json` - JSON-serialized OrganizeRequest (null-terminated):
///   `{"pages": [...], "groups": {...}, "url"?: "...", "debug_selector_map"?: "path"}`
///
/// # Returns
/// OrganizeResultFFI with either json_ptr set (success) or error_ptr set (failure)
///
/// # Safety
/// - `request_json` must be a valid null-terminated C string
/// - Caller must free the result via `free_organize_result`
#[no_mangle]
pub unsafe extern "C" fn organize_from_json(request_json: *const c_char) -> OrganizeResultFFI {
    if request_json.is_null() {
        return make_error_result("Request JSON is null");
    }
    let request_str = match CStr::from_ptr(request_json).to_str() {
        Ok(s) => s,
        Err(_) => return make_error_result("Invalid UTF-8 in request JSON"),
    };

    let request: OrganizeRequest = match serde_json::from_str(request_str) {
        Ok(r) => r,
        Err(e) => return make_error_result(&format!("Failed to parse request JSON: {}", e)),
    };

    match organize_request(&request) {
        Ok(result) => json_result(&result),
        Err(e) => make_error_result(&e.to_string()),
    }
}

/// Structural selector map of a single page (debugging aid)
///
/// # Safety
/// - `html_ptr` must point to valid memory of at least `html_len` bytes
/// - Caller must free the result via `free_organize_result`
#[no_mangle]
pub unsafe extern "C" fn selector_map_from_html(
    html_ptr: *const c_char,
    html_len: usize,
) -> OrganizeResultFFI {
    let html = match read_html(html_ptr, html_len) {
        Ok(html) => html,
        Err(msg) => return make_error_result(msg),
    };

    let map = SelectorMapBuilder::new().build_page(html);
    json_result(&map)
}

/// Free an OrganizeResultFFI returned by this module
///
/// # Safety
/// - `result` must have been returned by `organize_from_json` or `selector_map_from_html`
/// - Must only be called once per result
#[no_mangle]
pub unsafe extern "C" fn free_organize_result(result: OrganizeResultFFI) {
    if !result.json_ptr.is_null() {
        drop(CString::from_raw(result.json_ptr));
    }
    if !result.error_ptr.is_null() {
        drop(CString::from_raw(result.error_ptr));
    }
}

/// Install stderr logging at `level` (null means "info").
/// Returns false if logging was already initialized.
///
/// # Safety
/// `level` must be null or a valid null-terminated C string
#[no_mangle]
pub unsafe extern "C" fn init_logging_ffi(level: *const c_char) -> bool {
    let config = if level.is_null() {
        LoggingConfig::default()
    } else {
        match CStr::from_ptr(level).to_str() {
            Ok(level) => LoggingConfig::with_level(level),
            Err(_) => return false,
        }
    };
    init_logging(&config).is_ok()
}

// Borrow HTML bytes; null or empty input is an empty page
unsafe fn read_html<'a>(html_ptr: *const c_char, html_len: usize) -> Result<&'a str, &'static str> {
    if html_ptr.is_null() || html_len == 0 {
        return Ok("");
    }
    let slice = std::slice::from_raw_parts(html_ptr as *const u8, html_len);
    std::str::from_utf8(slice).map_err(|_| "Invalid UTF-8 in HTML content")
}

fn json_result<T: Serialize>(value: &T) -> OrganizeResultFFI {
    match serde_json::to_string(value) {
        Ok(json) => match CString::new(json) {
            Ok(cstr) => OrganizeResultFFI {
                json_ptr: cstr.into_raw(),
                error_ptr: ptr::null_mut(),
            },
            Err(_) => make_error_result("Result JSON contains null bytes"),
        },
        Err(e) => make_error_result(&format!("Failed to serialize result: {}", e)),
    }
}

// Helper to create error result
fn make_error_result(msg: &str) -> OrganizeResultFFI {
    let error_cstr = CString::new(msg).unwrap_or_else(|_| CString::from(c"Unknown error"));
    OrganizeResultFFI {
        json_ptr: ptr::null_mut(),
        error_ptr: error_cstr.into_raw(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe fn take(result: OrganizeResultFFI) -> (Option<String>, Option<String>) {
        let json = (!result.json_ptr.is_null())
            .then(|| CStr::from_ptr(result.json_ptr).to_string_lossy().into_owned());
        let error = (!result.error_ptr.is_null())
            .then(|| CStr::from_ptr(result.error_ptr).to_string_lossy().into_owned());
        free_organize_result(result);
        (json, error)
    }

    #[test]
    fn test_organize_from_json() {
        let request = serde_json::json!({
            "pages": [r#"<html><body><p class="n">1</p><p class="n">2</p></body></html>"#],
            "groups": {"rows": {"type": "single", "members": {".n": {}}}}
        })
        .to_string();
        let request = CString::new(request).unwrap();

        let (json, error) = unsafe { take(organize_from_json(request.as_ptr())) };
        assert!(error.is_none());
        let value: serde_json::Value = serde_json::from_str(&json.unwrap()).unwrap();
        assert_eq!(value, serde_json::json!({"rows": [{".n": "1"}, {".n": "2"}]}));
    }

    #[test]
    fn test_organize_from_json_errors() {
        let (json, error) = unsafe { take(organize_from_json(ptr::null())) };
        assert!(json.is_none());
        assert_eq!(error.as_deref(), Some("Request JSON is null"));

        let bad = CString::new("{not json").unwrap();
        let (_, error) = unsafe { take(organize_from_json(bad.as_ptr())) };
        assert!(error.unwrap().starts_with("Failed to parse request JSON"));

        let dangling = CString::new(r#"{"pages": [], "groups": {"a": {"parent": "b"}}}"#).unwrap();
        let (json, error) = unsafe { take(organize_from_json(dangling.as_ptr())) };
        assert!(json.is_none());
        assert!(error.unwrap().contains("unknown parent 'b'"));
    }

    #[test]
    fn test_selector_map_from_html() {
        let html = r#"<div id="root"><p class="x">t</p></div>"#;
        let result = unsafe { selector_map_from_html(html.as_ptr() as *const c_char, html.len()) };
        let (json, error) = unsafe { take(result) };
        assert!(error.is_none());

        let value: serde_json::Value = serde_json::from_str(&json.unwrap()).unwrap();
        assert_eq!(value["#root .x"], serde_json::json!(["t"]));

        let (json, _) = unsafe { take(selector_map_from_html(ptr::null(), 0)) };
        assert_eq!(json.as_deref(), Some("{}"));
    }

    #[test]
    fn test_selector_map_invalid_utf8() {
        let bytes = [0xffu8, 0xfe];
        let ptr = bytes.as_ptr() as *const c_char;
        let result = unsafe { selector_map_from_html(ptr, bytes.len()) };
        let (json, error) = unsafe { take(result) };
        assert!(json.is_none());
        assert!(error.is_some());
    }
}

//! FFI bindings for Synheart Cards
//!
//! C-compatible entry points for building cards from other languages.
//! Requests and rows go in as JSON C strings; envelopes come back as
//! newly allocated JSON strings that must be freed with `cards_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::builder::CardBuilder;
use crate::config::KernelConfig;
use crate::connector::MemoryRowSource;
use crate::error::CardError;
use crate::presets;
use crate::request::CardRequestParams;

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

fn into_c_result(result: Result<String, CardError>) -> *mut c_char {
    match result {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Build one envelope from a JSON request and a JSON array of rows
pub fn build_envelope_json(request_json: &str, rows_json: &str) -> Result<String, CardError> {
    let config = KernelConfig::from_env();
    let request = CardRequestParams::from_json(request_json)?.validate(config.default_timezone.name())?;
    let source = MemoryRowSource::from_json_array(rows_json)?;

    let envelope = CardBuilder::new(&source)
        .with_intraday_today(config.intraday_today)
        .build(&request)?;
    Ok(serde_json::to_string(&envelope)?)
}

/// Run a preset and return a JSON array of envelopes
pub fn run_preset_json(preset_id: &str, request_json: &str, rows_json: &str) -> Result<String, CardError> {
    let config = KernelConfig::from_env();
    let request = CardRequestParams::from_json(request_json)?.validate(config.default_timezone.name())?;
    let source = MemoryRowSource::from_json_array(rows_json)?;

    let builder = CardBuilder::new(&source).with_intraday_today(config.intraday_today);
    let envelopes = presets::run(&builder, preset_id, &request)?;
    Ok(serde_json::to_string(&envelopes)?)
}

// ============================================================================
// Card API
// ============================================================================

/// Build a card envelope.
///
/// `request_json` is `{"card_type", "from", "to"?, "timezone"?, "device_id"?}`;
/// `rows_json` is an array of `{"device_id", "date", "payload"}` rows.
///
/// # Safety
/// - Both arguments must be valid null-terminated C strings.
/// - Returns a newly allocated string that must be freed with `cards_free_string`.
/// - Returns NULL on error; call `cards_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn cards_build_envelope(
    request_json: *const c_char,
    rows_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let Some(request) = cstr_to_string(request_json) else {
        set_last_error("Invalid request string pointer");
        return ptr::null_mut();
    };
    let Some(rows) = cstr_to_string(rows_json) else {
        set_last_error("Invalid rows string pointer");
        return ptr::null_mut();
    };

    into_c_result(build_envelope_json(&request, &rows))
}

/// Run a named preset and return a JSON array of envelopes.
///
/// # Safety
/// - All arguments must be valid null-terminated C strings.
/// - Returns a newly allocated string that must be freed with `cards_free_string`.
/// - Returns NULL on error; call `cards_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn cards_run_preset(
    preset_id: *const c_char,
    request_json: *const c_char,
    rows_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let Some(preset) = cstr_to_string(preset_id) else {
        set_last_error("Invalid preset id pointer");
        return ptr::null_mut();
    };
    let Some(request) = cstr_to_string(request_json) else {
        set_last_error("Invalid request string pointer");
        return ptr::null_mut();
    };
    let Some(rows) = cstr_to_string(rows_json) else {
        set_last_error("Invalid rows string pointer");
        return ptr::null_mut();
    };

    into_c_result(run_preset_json(&preset, &request, &rows))
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by a cards function.
///
/// # Safety
/// - `ptr` must be a pointer returned by a cards function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn cards_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string, valid until the next
///   cards call on this thread. Do NOT free it.
/// - Returns NULL if the last call succeeded.
#[no_mangle]
pub unsafe extern "C" fn cards_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn cards_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

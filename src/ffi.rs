//! C-compatible Foreign Function Interface (FFI) for parafetch
//!
//! Lets C, C++, Python (via ctypes) and other languages with a C ABI run
//! parallel downloads.
//!
//! # Memory Management
//!
//! - All string parameters are null-terminated C strings (char*)
//! - Returned strings are allocated by Rust and must be freed with `parafetch_free_string()`
//!
//! # Error Handling
//!
//! All functions return a ParafetchResult code:
//! - 0: Success
//! - 1: Invalid parameter
//! - 2: Transport error
//! - 3: I/O error
//! - 4: Unknown error
//! - 5: Unexpected remote status
//! - 6: Cancelled

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use once_cell::sync::Lazy;
use tokio::runtime::Runtime;

use crate::{DownloadSummary, Error, Result};

/// Global async runtime for C FFI calls
static RUNTIME: Lazy<Runtime> = Lazy::new(|| Runtime::new().expect("Failed to create tokio runtime for FFI"));

/// Result codes for C FFI
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParafetchResult {
    Success = 0,
    InvalidParameter = 1,
    TransportError = 2,
    IoError = 3,
    UnknownError = 4,
    RemoteStatusError = 5,
    Cancelled = 6,
}

/// Progress callback function type for C
pub type ProgressCallback = extern "C" fn(downloaded: u64, total: u64, user_data: *mut std::ffi::c_void);

/// Convert Rust Result to C result code
fn convert_error(result: Result<DownloadSummary>) -> ParafetchResult {
    match result {
        Ok(_) => ParafetchResult::Success,
        Err(Error::InvalidInput(_)) => ParafetchResult::InvalidParameter,
        Err(Error::TransportError(_)) | Err(Error::RangeNotHonored { .. }) => ParafetchResult::TransportError,
        Err(Error::RemoteStatusError(_)) => ParafetchResult::RemoteStatusError,
        Err(Error::IoError(_)) => ParafetchResult::IoError,
        Err(Error::Cancelled) => ParafetchResult::Cancelled,
    }
}

/// Borrow a required string argument
fn required_str<'a>(value: *const c_char) -> Option<&'a str> {
    if value.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(value) }.to_str().ok()
}

/// Borrow an optional string argument; `Err` when present but not UTF-8
fn optional_str<'a>(value: *const c_char) -> std::result::Result<Option<&'a str>, ()> {
    if value.is_null() {
        return Ok(None);
    }
    unsafe { CStr::from_ptr(value) }.to_str().map(Some).map_err(|_| ())
}

/// Download a URL (simple version)
///
/// # Parameters
/// - `url`: http(s) URL (null-terminated string)
/// - `dest_path`: Destination file path (null-terminated string, or NULL to derive it from the URL)
///
/// # Returns
/// ParafetchResult code
#[no_mangle]
pub extern "C" fn parafetch_download(url: *const c_char, dest_path: *const c_char) -> ParafetchResult {
    let Some(url) = required_str(url) else {
        return ParafetchResult::InvalidParameter;
    };
    let Ok(dest) = optional_str(dest_path) else {
        return ParafetchResult::InvalidParameter;
    };

    convert_error(RUNTIME.block_on(crate::download(url, dest)))
}

/// Download a URL with progress callback
///
/// # Parameters
/// - `url`: http(s) URL (null-terminated string)
/// - `dest_path`: Destination file path (null-terminated string, or NULL to derive it from the URL)
/// - `progress_callback`: Optional progress callback; `total` is 0 when the size is unknown
/// - `user_data`: User data pointer passed to progress callback
///
/// # Returns
/// ParafetchResult code
#[no_mangle]
pub extern "C" fn parafetch_download_with_progress(
    url: *const c_char,
    dest_path: *const c_char,
    progress_callback: Option<ProgressCallback>,
    user_data: *mut std::ffi::c_void,
) -> ParafetchResult {
    let Some(url) = required_str(url) else {
        return ParafetchResult::InvalidParameter;
    };
    let Ok(dest) = optional_str(dest_path) else {
        return ParafetchResult::InvalidParameter;
    };

    let result = match progress_callback {
        Some(callback) => {
            // Carried as an address so the closure is Send + Sync; the C
            // caller keeps user_data alive for the duration of the call
            let user_data_addr = user_data as usize;
            RUNTIME.block_on(crate::download_with_progress(url, dest, move |downloaded, total| {
                callback(downloaded, total, user_data_addr as *mut std::ffi::c_void);
            }))
        }
        None => RUNTIME.block_on(crate::download(url, dest)),
    };

    convert_error(result)
}

/// Get the default output filename for a URL
///
/// # Returns
/// Allocated string that must be freed with `parafetch_free_string()`, or NULL on error
#[no_mangle]
pub extern "C" fn parafetch_default_filename(url: *const c_char) -> *mut c_char {
    let Some(url) = required_str(url) else {
        return ptr::null_mut();
    };

    match CString::new(crate::resolve_output_filename(url)) {
        Ok(c_string) => c_string.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Free a string allocated by the library
#[no_mangle]
pub extern "C" fn parafetch_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        unsafe {
            drop(CString::from_raw(ptr));
        }
    }
}

/// Get library version string
///
/// # Returns
/// Static string with version information (does not need to be freed)
#[no_mangle]
pub extern "C" fn parafetch_version() -> *const c_char {
    use std::sync::OnceLock;
    static VERSION_STRING: OnceLock<CString> = OnceLock::new();

    VERSION_STRING
        .get_or_init(|| {
            CString::new(format!("parafetch {}", env!("PARAFETCH_VERSION")))
                .expect("Version string contains null byte")
        })
        .as_ptr()
}

/// Initialize the library (optional, called automatically)
///
/// Creates the async runtime early.
#[no_mangle]
pub extern "C" fn parafetch_init() -> ParafetchResult {
    Lazy::force(&RUNTIME);
    ParafetchResult::Success
}

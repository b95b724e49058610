//! C-ABI Foreign Function Interface for redocx.
//!
//! # Memory Management
//!
//! All strings returned by this library must be freed using `redocx_free_string`.
//!
//! # Error Handling
//!
//! Functions that can fail return a null pointer (or -1) on error. Use
//! `redocx_last_error` to retrieve the error message.
//!
//! # Example (C)
//!
//! ```c
//! #include <stdio.h>
//! #include "redocx.h"
//!
//! int main() {
//!     char* summary = redocx_repair_file("broken.docx", NULL);
//!     if (!summary) {
//!         fprintf(stderr, "Error: %s\n", redocx_last_error());
//!         return 1;
//!     }
//!     printf("%s\n", summary);
//!     redocx_free_string(summary);
//!     return 0;
//! }
//! ```

use std::cell::RefCell;
use std::ffi::{c_char, c_int, CStr, CString};
use std::panic::catch_unwind;
use std::path::Path;
use std::ptr;

use crate::options::{Capabilities, RepairOptions};
use crate::repair::Repairer;

// Thread-local storage for the last error message.
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

fn into_raw_string(s: String) -> *mut c_char {
    match CString::new(s) {
        Ok(s) => s.into_raw(),
        Err(_) => {
            set_last_error("output contains null byte");
            ptr::null_mut()
        }
    }
}

/// Get the version of the library.
///
/// # Safety
///
/// Returns a static string that must not be freed.
#[no_mangle]
pub extern "C" fn redocx_version() -> *const c_char {
    concat!(env!("CARGO_PKG_VERSION"), "\0").as_ptr() as *const c_char
}

/// Get the last error message.
///
/// # Safety
///
/// Returns a pointer to a thread-local error string. The pointer is valid until
/// the next call to any redocx function on the same thread.
#[no_mangle]
pub extern "C" fn redocx_last_error() -> *const c_char {
    LAST_ERROR.with(|e| {
        e.borrow()
            .as_ref()
            .map(|s| s.as_ptr())
            .unwrap_or(ptr::null())
    })
}

/// Repair a package and return the JSON run summary.
///
/// # Safety
///
/// - `input` must be a valid null-terminated UTF-8 string.
/// - `output` may be null (write `<stem>.repaired.docx` next to the input)
///   or a valid null-terminated UTF-8 string.
/// - Returns null on error. Use `redocx_last_error` to get the error message.
/// - The returned string must be freed with `redocx_free_string`.
#[no_mangle]
pub unsafe extern "C" fn redocx_repair_file(
    input: *const c_char,
    output: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if input.is_null() {
        set_last_error("input path is null");
        return ptr::null_mut();
    }

    let result = catch_unwind(|| {
        let input = CStr::from_ptr(input).to_str().map_err(|e| e.to_string())?;
        let mut options = RepairOptions::default();
        if !output.is_null() {
            let output = CStr::from_ptr(output).to_str().map_err(|e| e.to_string())?;
            options = options.with_output(output);
        }

        let report = Repairer::new(options, Capabilities::detect()).repair(Path::new(input));
        report.summary().to_json().map_err(|e| e.to_string())
    });

    match result {
        Ok(Ok(json)) => into_raw_string(json),
        Ok(Err(e)) => {
            set_last_error(&e);
            ptr::null_mut()
        }
        Err(_) => {
            set_last_error("panic occurred during repair");
            ptr::null_mut()
        }
    }
}

/// Check whether a package opens cleanly.
///
/// # Safety
///
/// - `path` must be a valid null-terminated UTF-8 string.
/// - Returns 1 if valid, 0 if not (the reason is available from
///   `redocx_last_error`), -1 on invalid arguments.
#[no_mangle]
pub unsafe extern "C" fn redocx_validate(path: *const c_char) -> c_int {
    clear_last_error();

    if path.is_null() {
        set_last_error("path is null");
        return -1;
    }

    let result = catch_unwind(|| {
        let path = CStr::from_ptr(path).to_str().map_err(|e| e.to_string())?;
        Ok::<_, String>(crate::validate::load(path).map(|_| ()).map_err(|e| e.to_string()))
    });

    match result {
        Ok(Ok(Ok(()))) => 1,
        Ok(Ok(Err(reason))) => {
            set_last_error(&reason);
            0
        }
        Ok(Err(e)) => {
            set_last_error(&e);
            -1
        }
        Err(_) => {
            set_last_error("panic occurred during validation");
            -1
        }
    }
}

/// Free a string returned by redocx.
///
/// # Safety
///
/// - `s` must be a pointer returned by a redocx function, or null.
/// - After calling this function, the pointer is invalid and must not be used.
#[no_mangle]
pub unsafe extern "C" fn redocx_free_string(s: *mut c_char) {
    if !s.is_null() {
        let _ = CString::from_raw(s);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let version = redocx_version();
        let s = unsafe { CStr::from_ptr(version) }.to_str().unwrap();
        assert_eq!(s, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_null_arguments() {
        let summary = unsafe { redocx_repair_file(ptr::null(), ptr::null()) };
        assert!(summary.is_null());
        assert!(!redocx_last_error().is_null());

        assert_eq!(unsafe { redocx_validate(ptr::null()) }, -1);
    }

    #[test]
    fn test_validate_invalid_path() {
        let path = CString::new("/nonexistent/file.docx").unwrap();
        assert_eq!(unsafe { redocx_validate(path.as_ptr()) }, 0);
        assert!(!redocx_last_error().is_null());
    }

    #[test]
    fn test_repair_missing_file_returns_summary() {
        let path = CString::new("/nonexistent/file.docx").unwrap();
        let summary = unsafe { redocx_repair_file(path.as_ptr(), ptr::null()) };
        assert!(!summary.is_null());

        let json = unsafe { CStr::from_ptr(summary) }.to_str().unwrap().to_string();
        unsafe { redocx_free_string(summary) };

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["input"], "/nonexistent/file.docx");
        assert_eq!(value["errors"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_free_null() {
        unsafe { redocx_free_string(ptr::null_mut()) };
    }
}

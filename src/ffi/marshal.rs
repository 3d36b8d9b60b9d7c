//! Host <-> engine value conversion.
//!
//! Strings cross the boundary as NUL-terminated buffers owned by a
//! [`CString`]. The owning value must outlive the native call that reads the
//! pointer; holding it in a local for the whole call is enough, since a
//! `CString`'s heap buffer never moves.

use std::ffi::{CStr, CString};
use std::path::Path;
use std::ptr;

use libc::c_char;

use crate::error::{Error, Result};

/// Convert a host string into an engine string.
///
/// `what` names the argument in the error raised for interior NUL bytes.
pub fn to_c_string(value: &str, what: &str) -> Result<CString> {
    CString::new(value)
        .map_err(|_| Error::InvalidArgument(format!("{} contains an interior NUL byte", what)))
}

/// Convert an optional host string; `None` becomes a null pointer on use.
pub fn to_opt_c_string(value: Option<&str>, what: &str) -> Result<Option<CString>> {
    value.map(|v| to_c_string(v, what)).transpose()
}

/// Convert a filesystem path. The engine expects UTF-8.
pub fn path_to_c_string(path: &Path, what: &str) -> Result<CString> {
    let s = path
        .to_str()
        .ok_or_else(|| Error::InvalidArgument(format!("{} is not valid UTF-8", what)))?;
    to_c_string(s, what)
}

/// Pointer for an optional engine string.
pub fn opt_ptr(value: &Option<CString>) -> *const c_char {
    value.as_ref().map_or(ptr::null(), |s| s.as_ptr())
}

/// Join a list into one comma-separated engine string, or `None` when empty.
pub fn join_list(items: &[String], what: &str) -> Result<Option<CString>> {
    if items.is_empty() {
        return Ok(None);
    }
    to_c_string(&items.join(","), what).map(Some)
}

/// A contiguous `const char* const*` array with its backing strings.
///
/// The pointer array borrows from `owned`; both live and die together.
pub struct CStringArray {
    owned: Vec<CString>,
    ptrs: Vec<*const c_char>,
}

impl CStringArray {
    pub fn new<S: AsRef<str>>(items: &[S], what: &str) -> Result<Self> {
        let owned = items
            .iter()
            .map(|s| to_c_string(s.as_ref(), what))
            .collect::<Result<Vec<_>>>()?;
        let ptrs = owned.iter().map(|s| s.as_ptr()).collect();
        Ok(Self { owned, ptrs })
    }

    /// Base pointer, or null for an empty array.
    pub fn as_ptr(&self) -> *const *const c_char {
        if self.ptrs.is_empty() {
            ptr::null()
        } else {
            self.ptrs.as_ptr()
        }
    }

    pub fn len(&self) -> usize {
        self.owned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owned.is_empty()
    }
}

/// Copy an engine string into host memory. Null yields `None`.
///
/// Invalid UTF-8 is replaced rather than rejected.
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string that stays valid
/// for the duration of this call.
pub unsafe fn copy_c_str(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
}

/// Copy `len` records starting at `base`. Null or zero-length yields empty.
///
/// # Safety
///
/// `base` must be null or point to `len` initialised, properly aligned `T`.
pub unsafe fn copy_records<T: Copy>(base: *const T, len: usize) -> Vec<T> {
    if base.is_null() || len == 0 {
        return Vec::new();
    }
    std::slice::from_raw_parts(base, len).to_vec()
}

pub fn bool_to_int(value: bool) -> i32 {
    if value {
        1
    } else {
        0
    }
}

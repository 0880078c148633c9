//! LibXML2 FFI Wrapper Module
//!
//! Safe wrapper around the handful of libxml2 calls needed for lenient repair:
//! parse a broken document in recovery mode and serialize whatever tree libxml2
//! managed to build back to UTF-8 text.
//!
//! ## Why libxml2
//!
//! The pure Rust parsers (roxmltree, quick-xml, xml-rs) are strict: they stop at
//! the first well-formedness error. libxml2's `XML_PARSE_RECOVER` mode keeps going
//! and closes what it can, which is exactly the "lenient re-parse" step of the
//! repair chain. Strict parsing stays in pure Rust (see `parser`).
//!
//! ## Hardening
//!
//! Recovery parsing never substitutes entities (`XML_PARSE_NOENT` is not set),
//! never loads an external DTD (`XML_PARSE_DTDLOAD` is not set) and never touches
//! the network (`XML_PARSE_NONET`). The recovered text is re-checked by the strict
//! parser, which rejects any DOCTYPE, before it is accepted.
//!
//! ## Resource management
//!
//! Every libxml2 allocation is owned by a small RAII guard (`XmlDocPtr`,
//! `XmlBufferPtr`) so the document and buffer are freed on every exit path.

use std::ffi::CStr;
use std::marker::PhantomData;
use std::sync::Once;

use libc::{c_char, c_int, c_long};

use crate::error::{LibXml2Error, LibXml2Result};

/// libxml2's initialization functions are not thread-safe; run them exactly once.
static LIBXML2_INIT: Once = Once::new();

/// Parser option flags (`xmlParserOption`)
pub const XML_PARSE_RECOVER: c_int = 1 << 0;
pub const XML_PARSE_NOERROR: c_int = 1 << 5;
pub const XML_PARSE_NOWARNING: c_int = 1 << 6;
pub const XML_PARSE_NONET: c_int = 1 << 11;

/// Options used for lenient repair parsing
pub const RECOVER_OPTIONS: c_int =
    XML_PARSE_RECOVER | XML_PARSE_NOERROR | XML_PARSE_NOWARNING | XML_PARSE_NONET;

/// ## Opaque libxml2 structures
#[repr(C)]
pub struct XmlDoc {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlNode {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlBuffer {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlSaveCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct xmlError {
    pub domain: c_int,
    pub code: c_int,
    pub message: *const c_char,
    pub level: c_int,
    pub file: *const c_char,
    pub line: c_int,
    pub str1: *const c_char,
    pub str2: *const c_char,
    pub str3: *const c_char,
    pub int1: c_int,
    pub int2: c_int,
    pub ctxt: *mut libc::c_void,
    pub node: *mut libc::c_void,
}

// External libxml2 FFI declarations
#[cfg_attr(target_os = "windows", link(name = "libxml2"))]
#[cfg_attr(not(target_os = "windows"), link(name = "xml2"))]
unsafe extern "C" {
    pub fn xmlInitParser();

    // Document parsing
    pub fn xmlReadMemory(
        buffer: *const c_char,
        size: c_int,
        url: *const c_char,
        encoding: *const c_char,
        options: c_int,
    ) -> *mut XmlDoc;
    pub fn xmlFreeDoc(doc: *mut XmlDoc);
    pub fn xmlDocGetRootElement(doc: *const XmlDoc) -> *mut XmlNode;

    // Error state (thread-local in libxml2)
    pub fn xmlResetLastError();
    pub fn xmlGetLastError() -> *const xmlError;

    // Serialization
    pub fn xmlBufferCreate() -> *mut XmlBuffer;
    pub fn xmlBufferFree(buf: *mut XmlBuffer);
    pub fn xmlBufferContent(buf: *const XmlBuffer) -> *const u8;
    pub fn xmlBufferLength(buf: *const XmlBuffer) -> c_int;
    pub fn xmlSaveToBuffer(
        buffer: *mut XmlBuffer,
        encoding: *const c_char,
        options: c_int,
    ) -> *mut XmlSaveCtxt;
    pub fn xmlSaveDoc(ctxt: *mut XmlSaveCtxt, doc: *mut XmlDoc) -> c_long;
    pub fn xmlSaveClose(ctxt: *mut XmlSaveCtxt) -> c_int;
}

/// Owned libxml2 document, freed on drop
struct XmlDocPtr {
    ptr: *mut XmlDoc,
    _phantom: PhantomData<XmlDoc>,
}

impl XmlDocPtr {
    fn from_raw(ptr: *mut XmlDoc) -> Option<Self> {
        (!ptr.is_null()).then_some(Self {
            ptr,
            _phantom: PhantomData,
        })
    }

    fn has_root(&self) -> bool {
        unsafe { !xmlDocGetRootElement(self.ptr).is_null() }
    }
}

impl Drop for XmlDocPtr {
    fn drop(&mut self) {
        unsafe { xmlFreeDoc(self.ptr) }
    }
}

/// Owned libxml2 output buffer, freed on drop
struct XmlBufferPtr {
    ptr: *mut XmlBuffer,
}

impl XmlBufferPtr {
    fn new() -> LibXml2Result<Self> {
        let ptr = unsafe { xmlBufferCreate() };
        if ptr.is_null() {
            return Err(LibXml2Error::MemoryAllocation);
        }
        Ok(Self { ptr })
    }

    fn to_vec(&self) -> Vec<u8> {
        unsafe {
            let content = xmlBufferContent(self.ptr);
            let len = xmlBufferLength(self.ptr);
            if content.is_null() || len <= 0 {
                return Vec::new();
            }
            std::slice::from_raw_parts(content, len as usize).to_vec()
        }
    }
}

impl Drop for XmlBufferPtr {
    fn drop(&mut self) {
        unsafe { xmlBufferFree(self.ptr) }
    }
}

/// Read the message of the last libxml2 error recorded on this thread
fn last_error_message() -> Option<String> {
    unsafe {
        let error = xmlGetLastError();
        if error.is_null() || (*error).message.is_null() {
            return None;
        }
        CStr::from_ptr((*error).message)
            .to_str()
            .ok()
            .map(|s| s.trim().to_string())
    }
}

/// LibXML2 wrapper providing lenient (recovering) parsing
///
/// Each call builds and frees its own document, so calls on different threads do
/// not share any libxml2 state beyond the one-time initialization.
pub struct LibXml2Wrapper {
    _phantom: PhantomData<()>,
}

impl LibXml2Wrapper {
    /// Create a new wrapper, initializing libxml2 on first use
    pub fn new() -> Self {
        LIBXML2_INIT.call_once(|| unsafe {
            xmlInitParser();
        });

        LibXml2Wrapper {
            _phantom: PhantomData,
        }
    }

    /// Parse `data` in recovery mode and serialize the recovered tree as UTF-8.
    ///
    /// # Errors
    ///
    /// Returns `LibXml2Error::NoDocument` when libxml2 could not build any tree,
    /// `LibXml2Error::NoRootElement` when the tree has no root element, and
    /// `LibXml2Error::SerializationFailed` when the tree cannot be written back.
    pub fn recover_to_string(&self, data: &[u8]) -> LibXml2Result<String> {
        let size = c_int::try_from(data.len())
            .map_err(|_| LibXml2Error::InputTooLarge { size: data.len() })?;

        let doc = unsafe {
            xmlResetLastError();
            let raw = xmlReadMemory(
                data.as_ptr() as *const c_char,
                size,
                std::ptr::null(),
                std::ptr::null(),
                RECOVER_OPTIONS,
            );
            XmlDocPtr::from_raw(raw).ok_or_else(|| LibXml2Error::NoDocument {
                details: last_error_message(),
            })?
        };

        if !doc.has_root() {
            return Err(LibXml2Error::NoRootElement);
        }

        let buffer = XmlBufferPtr::new()?;
        unsafe {
            let ctxt = xmlSaveToBuffer(buffer.ptr, c"UTF-8".as_ptr(), 0);
            if ctxt.is_null() {
                return Err(LibXml2Error::MemoryAllocation);
            }
            let written = xmlSaveDoc(ctxt, doc.ptr);
            // Close flushes the buffer and must run even when saving failed
            let closed = xmlSaveClose(ctxt);
            if written < 0 {
                return Err(LibXml2Error::SerializationFailed {
                    code: written as i32,
                });
            }
            if closed < 0 {
                return Err(LibXml2Error::SerializationFailed { code: closed });
            }
        }

        String::from_utf8(buffer.to_vec()).map_err(|_| LibXml2Error::SerializationFailed { code: -1 })
    }
}

impl Default for LibXml2Wrapper {
    fn default() -> Self {
        Self::new()
    }
}

//! The provider-API contract (spec §6): the external, platform-specific
//! boundary this crate depends on and nothing else.
//!
//! On Windows with the `etw` feature this is backed by ETW/TDH through raw
//! FFI, following the style of the teacher's own `native.rs`. Everywhere
//! else -- and on Windows without the feature -- [`provider::windows`]
//! exposes a stub that reports every call unsupported, so the crate still
//! builds and can be driven by the in-memory [`crate::testing`] mock.

use crate::error::PipelineError;
use crate::guid::Guid;
use std::path::Path;

pub mod windows;

/// Opaque handle to an open trace, returned by [`EventProviderApi::open_trace`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceHandle(pub u64);

/// The `(in_type, out_type)` pair from the provider schema that the scalar
/// decoder dispatches on (spec §4.4, GLOSSARY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InType {
    UnicodeString,
    AnsiString,
    UnicodeChar,
    AnsiChar,
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Int64,
    Uint64,
    Boolean,
    Guid,
    Pointer,
    SizeT,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutType {
    /// No explicit out-type was given; the decoder falls back to the
    /// signedness-implied default for the in-type.
    Default,
    HexInt8,
    HexInt16,
    HexInt32,
    HexInt64,
    Byte,
    UnsignedByte,
    Short,
    UnsignedShort,
    Int,
    UnsignedInt,
    String,
}

/// One property of an event's schema, as returned by the provider helper's
/// event-info call.
#[derive(Debug, Clone)]
pub struct PropertyInfo {
    pub name: String,
    pub in_type: InType,
    pub out_type: OutType,
    /// Number of elements; `> 1` means an array.
    pub count: u16,
    /// Non-zero marks a struct / parametric-count / parametric-length
    /// property -- refused per spec §9's Open Question.
    pub flags: u32,
}

/// Where a property's schema came from. Only `Wbem` and `XmlFile` are
/// accepted (spec §4.5); anything else is a decode failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodingSource {
    Wbem,
    XmlFile,
    Other,
}

/// The parsed schema of one event, as returned by
/// [`EventProviderApi::get_event_info`].
#[derive(Debug, Clone)]
pub struct EventInfo {
    pub event_guid: Guid,
    pub opcode: u8,
    pub version: u8,
    pub event_id: u16,
    pub opcode_name: String,
    pub decoding_source: DecodingSource,
    pub properties: Vec<PropertyInfo>,
}

/// Result of [`EventProviderApi::get_event_info`]. `InsufficientBuffer`
/// carries the required size in bytes; the caller resizes its scratch
/// buffer to that size and retries exactly once (spec §4.5, §7).
pub enum GetEventInfoResult {
    Success(EventInfo),
    InsufficientBuffer { required_size: usize },
    Error,
}

/// A two-element property path: a property name plus an array element
/// index, used to query the size/value of one element of a (possibly
/// scalar) property (spec §4.5).
#[derive(Debug, Clone)]
pub struct PropertyPath<'a> {
    pub name: &'a str,
    pub index: u32,
}

/// One record delivered by the provider API's per-event callback: the
/// header/descriptor/context fields encoded verbatim into the event's fixed
/// context block (spec §4.3), plus the opaque payload.
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub timestamp: u64,
    pub provider_id: Guid,
    pub activity_id: Guid,
    pub event_id: u16,
    pub version: u8,
    pub channel: u8,
    pub level: u8,
    pub opcode: u8,
    pub task: u16,
    pub keyword: u64,
    pub process_id: u32,
    pub thread_id: u32,
    pub processor_id: u8,
    pub logger_id: u16,
    pub header_type: u16,
    pub header_flags: u16,
    pub header_properties: u16,
    /// `EVENT_HEADER_FLAG_STRING_ONLY` (spec §4.5 pre-step).
    pub is_string_only: bool,
    pub payload: Vec<u8>,
}

/// The reserved provider UUID and opcode identifying "trace events / info"
/// records, which the event encoder drops unconditionally (spec §4.3 step 1).
pub const TRACE_EVENT_INFO_PROVIDER: Guid = Guid::from_fields(
    0x68FDD900,
    0x4A3E,
    0x11D1,
    [0x84, 0xF4, 0x00, 0x00, 0xF8, 0x04, 0x64, 0xE3],
);
pub const TRACE_EVENT_INFO_OPCODE: u8 = 0;

/// Callbacks the provider API invokes while driving `process_trace`.
pub trait EventCallbacks {
    /// Invoked once per input buffer, before any of its events. `read_count`
    /// is the buffer's ordinal among buffers read so far, used by
    /// `--split-buffer` to name a new stream file.
    fn on_buffer(&mut self, read_count: u64);

    /// Invoked once per event, in stream order. `provider` is the same
    /// provider driving `process_trace`, handed back in so the callback can
    /// query the event's schema without the caller needing to hold two
    /// live borrows of the same provider at once.
    fn on_event(&mut self, record: &EventRecord, provider: &dyn EventProviderApi);
}

/// The external provider-API contract the core pipeline depends on (spec
/// §6). Implementations open and iterate trace files and answer schema
/// queries about individual events; they never see the CTF output.
pub trait EventProviderApi {
    fn open_trace(&mut self, path: &Path) -> Result<TraceHandle, PipelineError>;

    fn process_trace(
        &mut self,
        handles: &[TraceHandle],
        callbacks: &mut dyn EventCallbacks,
    ) -> Result<(), PipelineError>;

    fn close_trace(&mut self, handle: TraceHandle);

    /// Resolves the full schema of `record`'s event. `out_buf` is a
    /// caller-owned scratch buffer reused across calls; on
    /// `InsufficientBuffer` the caller resizes it and retries exactly once.
    fn get_event_info(&self, record: &EventRecord, out_buf: &mut Vec<u8>) -> GetEventInfoResult;

    /// Returns the byte size of one property element, or `None` if it could
    /// not be determined.
    fn get_property_size(&self, record: &EventRecord, path: &PropertyPath) -> Option<u32>;

    /// Fetches one property element's raw bytes into `out_buf`, which the
    /// caller has already sized via `get_property_size`. Returns `false` on
    /// failure.
    fn get_property(&self, record: &EventRecord, path: &PropertyPath, out_buf: &mut [u8]) -> bool;
}

// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Decodes ETW (Event Tracing for Windows) traces into [Common Trace
//! Format](https://diamon.org/ctf/) (CTF) traces, so they can be opened with
//! standard CTF tooling instead of Windows-only trace viewers.
//!
//! The entry point is [`pipeline::PipelineDriver`], which decodes every event
//! from a set of input traces through a provider-API implementation
//! ([`provider::EventProviderApi`]) into a dictionary of deduplicated event
//! layouts, batches the encoded events into fixed-size CTF packets, and
//! writes both the packets and the trailing metadata document to a
//! [`pipeline::StreamSink`]. Payload decoding falls back through an ordered
//! [`dissector::DissectorRegistry`] before giving up to a raw byte dump, and
//! an [`observer::ObserverRegistry`] of pluggable lifecycle hooks can inspect
//! -- and, via [`observer::PacketSink`], augment -- the event stream as it is
//! encoded.

pub mod assembler;
pub mod dissector;
pub mod encoder;
pub mod error;
pub mod guid;
pub mod layout;
pub mod metadata;
pub mod observer;
pub mod packet;
pub mod payload;
pub mod pipeline;
pub mod provider;
pub mod scalar;
pub mod testing;

pub use error::{DecodeError, PipelineError};
pub use guid::Guid;
pub use layout::{EventLayout, Field, FieldType, LayoutDictionary};
pub use pipeline::{PipelineDriver, StreamSink};

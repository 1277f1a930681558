//! # Kernel Image Introspection and Hardening
//!
//! The kernel is a PE32+ image. Once the kernel address space is live, the
//! image's own section table drives a final hardening pass
//! ([`harden_image`]):
//!
//! - discardable sections (relocations, init-only data) are zero-filled;
//! - sections not marked writable lose the writable bit on every page they
//!   cover, with a translation invalidation after each change;
//! - writable sections are left alone.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

#[cfg(any(test, feature = "testing"))]
extern crate alloc;

mod error;
mod hardening;
mod loaded;
pub mod pe;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use crate::error::ImageError;
pub use crate::hardening::{HardeningReport, harden_image};
pub use crate::loaded::LoadedImage;
pub use crate::pe::{PeHeaders, SectionCharacteristics, SectionHeader, SectionName};

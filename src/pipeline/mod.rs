//! Stages that turn an upload into recognized page texts.
//!
//! ## Data Flow
//!
//! ```text
//! input/<name>.pdf ──▶ splitter ──▶ N × page-ready ──▶ processor ──▶ document-ready
//!                      (pdfium)                        (classify,    (completion
//!                                                      recognize)    tracker)
//! ```
//!
//! 1. [`input`]: read a local path or download a URL for upload
//! 2. [`splitter`]: cut the upload into single-page PDFs; all-or-nothing
//! 3. [`processor`]: route each page through the recognizer by its label
//!    and persist its text
//! 4. [`completion`]: decide, once, that every page has text
//!
//! [`render`] and [`encode`] hold the pdfium and image plumbing used by the
//! splitter and the vision recognizer; [`postprocess`] cleans oracle
//! answers.

pub mod completion;
pub mod encode;
pub mod input;
pub mod postprocess;
pub mod processor;
pub mod render;
pub mod splitter;

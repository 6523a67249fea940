//! Storage key layout shared by every stage.
//!
//! ```text
//! input/<name>.pdf                   raw upload (deleted after split)
//! output/pdf/<name>_page_<n>.pdf     one split page, 1-based n
//! output/txt/<name>_page_<n>.txt     recognized text for page n
//! temp/<name>_<section>.json         one section output, pending aggregation
//! output/final/<name>.json           newline-concatenated section outputs
//! state/<name>_completion.json       countdown state for completion tracking
//! ```
//!
//! A document has no record of its own: it is the set of keys sharing the
//! `<name>` stem. The document-ready event carries the text prefix
//! `output/txt/<name>`.

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;

pub const INPUT_DIR: &str = "input/";
pub const PDF_DIR: &str = "output/pdf/";
pub const TXT_DIR: &str = "output/txt/";
pub const TEMP_DIR: &str = "temp/";
pub const FINAL_DIR: &str = "output/final/";
pub const STATE_DIR: &str = "state/";

static PAGE_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"_page_(\d+)\.(?:pdf|txt)$").expect("valid regex"));

/// Document name for an upload key, if the key is a PDF under `input/`.
pub fn document_name(input_key: &str) -> Option<&str> {
    let rest = input_key.strip_prefix(INPUT_DIR)?;
    let name = rest.strip_suffix(".pdf")?;
    let name = name.rsplit('/').next().unwrap_or(name);
    (!name.is_empty()).then_some(name)
}

pub fn input_key(name: &str) -> String {
    format!("{INPUT_DIR}{name}.pdf")
}

pub fn page_pdf_key(name: &str, page: u32) -> String {
    format!("{PDF_DIR}{name}_page_{page}.pdf")
}

pub fn page_text_key(name: &str, page: u32) -> String {
    format!("{TXT_DIR}{name}_page_{page}.txt")
}

/// `output/pdf/x_page_3.pdf` → `output/txt/x_page_3.txt`.
pub fn text_key_for_pdf(pdf_key: &str) -> String {
    pdf_key.replace(PDF_DIR, TXT_DIR).replace(".pdf", ".txt")
}

/// `output/txt/x_page_3.txt` → `output/pdf/x_page_3.pdf`.
pub fn pdf_key_for_text(text_key: &str) -> String {
    text_key.replace(TXT_DIR, PDF_DIR).replace(".txt", ".pdf")
}

/// The document-ready prefix, `output/txt/<name>`.
pub fn text_prefix(name: &str) -> String {
    format!("{TXT_DIR}{name}")
}

/// Listing prefix for this document's page texts.
///
/// The trailing `_page_` keeps `acme` from matching `acme2`, but not
/// `acme_page_2`; filter listed keys with [`is_page_of`].
pub fn page_text_listing(name: &str) -> String {
    format!("{TXT_DIR}{name}_page_")
}

/// Listing prefix for this document's split pages. Same caveat as
/// [`page_text_listing`].
pub fn page_pdf_listing(name: &str) -> String {
    format!("{PDF_DIR}{name}_page_")
}

/// Whether `key` is a numbered page (`.pdf` or `.txt`) of exactly `name`.
pub fn is_page_of(key: &str, name: &str) -> bool {
    page_index(key).is_some() && document_name_from_page_key(key).as_deref() == Some(name)
}

/// Document name for a document-ready prefix.
pub fn document_name_from_prefix(prefix: &str) -> Option<&str> {
    let name = prefix.strip_prefix(TXT_DIR)?;
    (!name.is_empty()).then_some(name)
}

/// Document name for a page key (`.pdf` or `.txt`).
pub fn document_name_from_page_key(key: &str) -> Option<String> {
    let file = key.rsplit('/').next()?;
    let m = PAGE_SUFFIX.find(file)?;
    let name = &file[..m.start()];
    (!name.is_empty()).then(|| name.to_string())
}

/// 1-based page index embedded in a page key's numeric suffix.
pub fn page_index(key: &str) -> Option<u32> {
    PAGE_SUFFIX
        .captures(key)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .filter(|&n| n >= 1)
}

pub fn section_key(name: &str, section: &str) -> String {
    format!("{TEMP_DIR}{name}_{section}.json")
}

pub fn temp_listing(name: &str) -> String {
    format!("{TEMP_DIR}{name}_")
}

pub fn final_key(name: &str) -> String {
    format!("{FINAL_DIR}{name}.json")
}

pub fn completion_key(name: &str) -> String {
    format!("{STATE_DIR}{name}_completion.json")
}

/// Public link to the split page PDF behind a text key.
///
/// Each path segment is percent-encoded; `base` is typically
/// `https://storage.cloud.google.com`.
pub fn provenance_url(base: &str, bucket: &str, text_key: &str) -> Option<String> {
    let pdf_key = pdf_key_for_text(text_key);
    let mut url = Url::parse(base).ok()?;
    {
        let mut segments = url.path_segments_mut().ok()?;
        segments.pop_if_empty();
        segments.push(bucket);
        segments.extend(pdf_key.split('/'));
    }
    Some(url.to_string())
}

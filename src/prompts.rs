//! Instructions sent to the recognition and extraction oracles.
//!
//! Every prompt lives here so wording can change without touching parser
//! logic, and so tests can check the sentinel each prompt promises.

// ── Recognition ──────────────────────────────────────────────────────────

/// Page classification. The answer is a JSON array of `{label, confidence}`.
pub const CLASSIFY_PAGE: &str = r#"You classify scanned pages of a corporate minute book.

Return a JSON array of candidate classes for the page image, most likely first:
[{"label": "<label>", "confidence": <0.0-1.0>}]

Labels:
- "dense-ocr"   : typed or printed prose (by-laws, resolutions, minutes)
- "form-parser" : registers, ledgers, forms or any page dominated by a table
- "certificate" : share certificates and certificates of incorporation
- "other"       : any other page with readable text
- "blank"       : empty pages, covers and tab dividers with no content

Output ONLY the JSON array."#;

/// Full-page transcription.
pub const TRANSCRIBE_PAGE: &str = r#"Transcribe all text on this scanned page exactly as written.

- Preserve the reading order a human would follow
- Keep names, dates, addresses and numbers verbatim
- Do not summarise, translate or add commentary
- Output plain text only"#;

/// Transcription that also returns tables. The answer is a JSON object.
pub const TRANSCRIBE_FORM: &str = r#"Transcribe this scanned register or form.

Return a JSON object:
{"text": "<all text outside tables, in reading order>",
 "tables": [{"rows": [["cell", "cell"], ["cell", "cell"]]}]}

- One entry in "tables" per table on the page, header row first
- Keep names, dates and addresses verbatim
- Output ONLY the JSON object"#;

// ── Directors ────────────────────────────────────────────────────────────

pub const MINIMUM_DIRECTORS: &str = r#"What is the minimum number of directors who can sit on the board of directors?
If this passage is about quorum rules, answer Not Found.
If the passage does not say, answer Not Found.
Format the answer as a number."#;

pub const MAXIMUM_DIRECTORS: &str = r#"What is the maximum number of directors who can sit on the board of directors?
If this passage is about quorum rules, answer Not Found.
If the passage does not say, answer Not Found.
Format the answer as a number."#;

/// Election register extraction. Sentinel: `[]`.
pub const ELECTION_OF_DIRECTORS: &str = r#"List the directors of the corporation named in the passage, the date each was elected, and the date each retired (if no longer a director).

Answer with a JSON array; one object per director:
[{
  "director_name": string,        // name of the director
  "date_elected": string | null,  // YYYY-MM-DD
  "date_retired": string | null,  // YYYY-MM-DD
  "address": string | null        // address of the director, if given
}]

If the passage does not name any directors, answer []."#;

/// Mailing-address lookup for one person. Sentinel: `Not Found`.
pub fn address_of(person: &str, alias: Option<&str>) -> String {
    let alias = alias
        .map(|a| format!(" (also written as {a})"))
        .unwrap_or_default();
    format!(
        "Extract the mailing address of {person}{alias} from the passage. \
The address for {person} appears close to their name; an address that is not \
next to their name belongs to someone else, so answer Not Found. \
A mailing address contains street, city, state or province, and zip or postal code. \
Do not include the name in the answer. \
If the passage has no mailing address for {person}, answer Not Found."
    )
}

// ── Quorum ───────────────────────────────────────────────────────────────

pub const DIRECTORS_QUORUM: &str = r#"What constitutes quorum for meetings of directors when only one director is present? When two or more directors are present? Is a majority of directors required?
Explain in one concise paragraph. Describe only meetings of directors, never meetings of shareholders.
If the passage does not describe quorum for directors, answer Not Found."#;

pub const SHAREHOLDERS_QUORUM: &str = r#"What constitutes quorum for meetings of shareholders according to the passage?
Describe only meetings of shareholders, never meetings of directors.
If the passage does not describe quorum for shareholders, answer Not Found."#;

// ── Restrictions & provisions ────────────────────────────────────────────

pub const TRANSFER_RESTRICTIONS: &str = r#"If this passage from corporate by-laws or articles sets out share transfer restrictions, describe them concisely.
Include only share transfer restrictions. Do not mention the minimum or maximum number of directors.
Format the answer as a single line. If there are none, answer Not Found."#;

pub const OTHER_RESTRICTIONS: &str = r#"If this passage from corporate by-laws or articles sets out other restrictions on the corporation's activities, describe them concisely.
Do not include share transfer restrictions. Do not mention the minimum or maximum number of directors.
Format the answer as a single line. If there are none, answer Not Found."#;

pub const OTHER_PROVISIONS: &str = r#"If this passage from corporate by-laws or articles sets out other provisions, describe them.
Do not mention the minimum or maximum number of directors.
Format the answer as a single line. If there are none, answer Not Found."#;

//! Header classification for assessment exports.
//!
//! Export headers are free text (`"Q 3 /40.00"`, `"Grade/10.00"`,
//! `"Time taken"`). [`HeaderClassifier`] maps each one onto a canonical column
//! name, the role that name plays downstream, and the maximum score declared
//! in the header when there is one. Classification never fails: the last rule
//! accepts any header.

use std::{
    collections::{BTreeMap, HashSet},
    sync::OnceLock,
};

use log::debug;
use regex::Regex;

pub const STATE_COLUMN: &str = "state";
pub const TIME_TAKEN_COLUMN: &str = "timetaken";
pub const SCORE_COLUMN: &str = "score";

const TIME_TAKEN_KEYS: &[&str] = &["timetaken", "timetakenminutes", "timetakenmins", "timetakenmin"];

/// Identity keywords in priority order; the first keyword contained in any
/// column name decides the identity column.
pub const IDENTITY_KEYWORDS: &[&str] = &[
    "studentid",
    "student",
    "researcherid",
    "researcher",
    "researchid",
    "candidateid",
    "candidate",
    "learnerid",
    "learner",
    "userid",
    "user",
    "id",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    Identity,
    Question(u64),
    Score,
    TimeTaken,
    State,
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldClassification {
    pub canonical_name: String,
    pub declared_max: Option<f64>,
    pub role: FieldRole,
}

/// Declared maxima keyed by canonical column name.
pub type MaxMap = BTreeMap<String, f64>;

fn question_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^Q\s*(\d+)(?:\s*/\s*(\d+))?.*$").expect("valid question regex")
    })
}

fn grade_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^Grades?\s*/\s*(\d+).*$").expect("valid grade regex"))
}

fn legacy_grades_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^Grades\d+$").expect("valid grades regex"))
}

fn canonical_question_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^Q(\d+)$").expect("valid canonical question regex"))
}

/// Parses the number of a canonical question column (`Q12` -> 12).
pub fn question_number(name: &str) -> Option<u64> {
    canonical_question_regex()
        .captures(name)
        .map(|caps| parse_digits(&caps[1]))
}

pub fn is_question_column(name: &str) -> bool {
    canonical_question_regex().is_match(name)
}

pub fn is_legacy_grades_column(name: &str) -> bool {
    legacy_grades_regex().is_match(name)
}

/// Lowercases and strips spaces, underscores, and hyphens for keyword matching.
pub fn identity_fragment(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .filter(|c| !matches!(c, ' ' | '_' | '-'))
        .collect()
}

/// Returns the highest-priority identity keyword found in `name`, if any.
pub fn identity_keyword_rank(name: &str) -> Option<usize> {
    let fragment = identity_fragment(name);
    IDENTITY_KEYWORDS
        .iter()
        .position(|keyword| fragment.contains(keyword))
}

fn parse_digits(digits: &str) -> u64 {
    digits.parse().unwrap_or(u64::MAX)
}

fn strip_leading_zeros(digits: &str) -> &str {
    let stripped = digits.trim_start_matches('0');
    if stripped.is_empty() { "0" } else { stripped }
}

/// Classifies one header without collision tracking.
pub fn classify_header(raw: &str) -> FieldClassification {
    let trimmed = raw.trim();
    let compact = trimmed
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();

    if compact == STATE_COLUMN {
        return FieldClassification {
            canonical_name: STATE_COLUMN.to_string(),
            declared_max: None,
            role: FieldRole::State,
        };
    }
    if TIME_TAKEN_KEYS.contains(&compact.as_str()) {
        return FieldClassification {
            canonical_name: TIME_TAKEN_COLUMN.to_string(),
            declared_max: None,
            role: FieldRole::TimeTaken,
        };
    }
    if let Some(caps) = question_regex().captures(trimmed) {
        let digits = strip_leading_zeros(&caps[1]);
        return FieldClassification {
            canonical_name: format!("Q{digits}"),
            declared_max: caps.get(2).and_then(|m| m.as_str().parse::<f64>().ok()),
            role: FieldRole::Question(parse_digits(digits)),
        };
    }
    if let Some(caps) = grade_regex().captures(trimmed) {
        return FieldClassification {
            canonical_name: SCORE_COLUMN.to_string(),
            declared_max: caps[1].parse::<f64>().ok(),
            role: FieldRole::Score,
        };
    }

    let name = trimmed
        .chars()
        .filter(|c| !matches!(c, ' ' | '/' | '?' | '-'))
        .collect::<String>();
    let role = if name == SCORE_COLUMN || is_legacy_grades_column(&name) {
        FieldRole::Score
    } else if identity_keyword_rank(&name).is_some() {
        FieldRole::Identity
    } else {
        FieldRole::Other
    };
    FieldClassification {
        canonical_name: name,
        declared_max: None,
        role,
    }
}

/// Classifies the headers of one ingestion run, disambiguating collisions and
/// collecting declared maxima.
#[derive(Debug, Default)]
pub struct HeaderClassifier {
    assigned: HashSet<String>,
    max_map: MaxMap,
}

impl HeaderClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classifies `raw`; a canonical name already handed out gets the lowest
    /// free `_<n>` suffix, starting at 2. Free means not yet handed out in this
    /// pass, so a raw header that already reads `score_2` pushes a later
    /// repeated `score` on to `score_3` rather than sharing the name.
    pub fn classify(&mut self, raw: &str) -> FieldClassification {
        let mut field = classify_header(raw);
        let base = field.canonical_name.clone();
        let mut suffix = 1;
        while self.assigned.contains(&field.canonical_name) {
            suffix += 1;
            field.canonical_name = format!("{base}_{suffix}");
        }
        self.assigned.insert(field.canonical_name.clone());
        if let Some(max) = field.declared_max {
            self.max_map.insert(field.canonical_name.clone(), max);
        }
        debug!(
            "Classified header '{raw}' as '{}' ({:?}, max {:?})",
            field.canonical_name, field.role, field.declared_max
        );
        field
    }

    pub fn max_map(&self) -> &MaxMap {
        &self.max_map
    }

    pub fn into_max_map(self) -> MaxMap {
        self.max_map
    }
}

/// Classifies a full header row with a fresh classifier.
pub fn classify_headers<S: AsRef<str>>(headers: &[S]) -> (Vec<FieldClassification>, MaxMap) {
    let mut classifier = HeaderClassifier::new();
    let fields = headers
        .iter()
        .map(|header| classifier.classify(header.as_ref()))
        .collect();
    (fields, classifier.into_max_map())
}

//! Key generation and parsing for the single-table course layout.
//!
//! Builders are pure functions. Parsing goes through [`SortKey`] and
//! [`SectionPartition`] so that no caller slices composite keys by hand.

// ============================================================================
// Attribute names
// ============================================================================

pub const PK: &str = "PK";
pub const SK: &str = "SK";
pub const GSI1: &str = "GSI1";
pub const GSI1_PK: &str = "GSI1PK";
pub const GSI1_SK: &str = "GSI1SK";

// ============================================================================
// Key prefixes
// ============================================================================

pub const USER_PREFIX: &str = "USER#";
pub const COURSE_PREFIX: &str = "COURSE#";
pub const UNIT_PREFIX: &str = "UNIT#";
pub const SECTION_PREFIX: &str = "SECTION#";
pub const ASSISTANT_PREFIX: &str = "ASSISTANT#";
pub const METADATA: &str = "METADATA";
pub const ALL_COURSES: &str = "ALLCOURSES";

// ============================================================================
// Course keys
// ============================================================================

/// Partition holding the courses a teacher owns.
///
/// Pattern: `USER#<email>`
pub fn user_pk(email: &str) -> String {
    format!("{USER_PREFIX}{email}")
}

/// Pattern: `COURSE#<code>`
pub fn course_pk(code: &str) -> String {
    format!("{COURSE_PREFIX}{code}")
}

/// Sort key of the user→course pointer, also used as its GSI1 sort key.
///
/// Pattern: `COURSE#<code>`
pub fn course_link_sk(code: &str) -> String {
    format!("{COURSE_PREFIX}{code}")
}

pub fn metadata_sk() -> &'static str {
    METADATA
}

pub fn all_courses_gsi1_pk() -> &'static str {
    ALL_COURSES
}

// ============================================================================
// Unit keys
// ============================================================================

/// Pattern: `UNIT#<unit_id>`
pub fn unit_sk(unit_id: &str) -> String {
    format!("{UNIT_PREFIX}{unit_id}")
}

// ============================================================================
// Section keys
// ============================================================================

/// Partition holding the sections of one unit.
///
/// Pattern: `COURSE#<code>#UNIT#<unit_id>`
pub fn section_pk(code: &str, unit_id: &str) -> String {
    format!("{COURSE_PREFIX}{code}#{UNIT_PREFIX}{unit_id}")
}

/// Pattern: `SECTION#<section_id>`
pub fn section_sk(section_id: &str) -> String {
    format!("{SECTION_PREFIX}{section_id}")
}

/// GSI1 partition key used for deep-link lookups by section id alone.
///
/// Pattern: `SECTION#<section_id>`
pub fn section_gsi1_pk(section_id: &str) -> String {
    format!("{SECTION_PREFIX}{section_id}")
}

pub fn section_gsi1_sk() -> &'static str {
    METADATA
}

// ============================================================================
// Assistant keys
// ============================================================================

/// Pattern: `ASSISTANT#<assistant_id>`
pub fn assistant_sk(assistant_id: &str) -> String {
    format!("{ASSISTANT_PREFIX}{assistant_id}")
}

// ============================================================================
// Object store keys
// ============================================================================

/// Pattern: `<code>/`
pub fn course_object_prefix(code: &str) -> String {
    format!("{code}/")
}

/// Pattern: `<code>/<file_name>`
pub fn course_object_key(code: &str, file_name: &str) -> String {
    format!("{code}/{file_name}")
}

/// Pattern: `<section_id>.pdf`
pub fn section_file_name(section_id: &str) -> String {
    format!("{section_id}.pdf")
}

// ============================================================================
// Parsing
// ============================================================================

/// The kind of row a sort key addresses, with its bare id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortKey {
    Metadata,
    Course(String),
    Unit(String),
    Section(String),
    Assistant(String),
}

impl SortKey {
    pub fn parse(sk: &str) -> Option<Self> {
        if sk == METADATA {
            return Some(Self::Metadata);
        }
        let (variant, rest): (fn(String) -> Self, &str) =
            if let Some(rest) = sk.strip_prefix(COURSE_PREFIX) {
                (Self::Course, rest)
            } else if let Some(rest) = sk.strip_prefix(UNIT_PREFIX) {
                (Self::Unit, rest)
            } else if let Some(rest) = sk.strip_prefix(SECTION_PREFIX) {
                (Self::Section, rest)
            } else if let Some(rest) = sk.strip_prefix(ASSISTANT_PREFIX) {
                (Self::Assistant, rest)
            } else {
                return None;
            };
        if rest.is_empty() {
            return None;
        }
        Some(variant(rest.to_string()))
    }

    pub fn into_id(self) -> Option<String> {
        match self {
            Self::Metadata => None,
            Self::Course(id) | Self::Unit(id) | Self::Section(id) | Self::Assistant(id) => {
                Some(id)
            }
        }
    }
}

/// The owning course and unit of a section row, parsed from its partition key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionPartition {
    pub course_code: String,
    pub unit_id: String,
}

impl SectionPartition {
    /// Parses `COURSE#<code>#UNIT#<unit_id>`.
    ///
    /// Course codes cannot contain `#`, so the first `#UNIT#` after the course
    /// prefix splits the two ids.
    pub fn parse(pk: &str) -> Option<Self> {
        let rest = pk.strip_prefix(COURSE_PREFIX)?;
        let (course_code, unit_id) = rest.split_once(&format!("#{UNIT_PREFIX}"))?;
        if course_code.is_empty() || unit_id.is_empty() || unit_id.contains('#') {
            return None;
        }
        Some(Self {
            course_code: course_code.to_string(),
            unit_id: unit_id.to_string(),
        })
    }
}

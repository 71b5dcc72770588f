//! Entity types for courses, units, sections and assistants.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{RepositoryError, Result};

/// Highest accepted grade level (13 stands for post-secondary).
pub const MAX_GRADE_LEVEL: u8 = 13;

/// Grade shown for rows written before the grade was recorded.
pub const DEFAULT_GRADE_LEVEL: u8 = 6;

static COURSE_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z][a-z0-9-]{2,19}$").expect("course code pattern is valid")
});

// ============================================================================
// Enumerations
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionType {
    #[default]
    Content,
    File,
}

impl SectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::File => "file",
        }
    }
}

impl fmt::Display for SectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who may enter a course. Rows without the attribute require a code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    #[default]
    RequiresCode,
    OpenToAll,
}

impl Availability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequiresCode => "requires_code",
            Self::OpenToAll => "open_to_all",
        }
    }
}

/// The assistant attached to a section.
///
/// Stored as the `assistant_id` attribute: the sentinels `"None"` and
/// `"Default"`, or the id of a custom assistant of the same course.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssistantSelector {
    None,
    Default,
    Custom(String),
}

impl AssistantSelector {
    pub const NONE: &'static str = "None";
    pub const DEFAULT: &'static str = "Default";

    /// Interprets a stored `assistant_id`.
    ///
    /// A missing attribute means the default assistant, and any value
    /// containing "default" in any case is treated as the default sentinel.
    pub fn from_stored(value: Option<&str>) -> Self {
        match value {
            None => Self::Default,
            Some(Self::NONE) => Self::None,
            Some(value) if value.to_lowercase().contains("default") => Self::Default,
            Some(id) => Self::Custom(id.to_string()),
        }
    }

    pub fn as_stored(&self) -> &str {
        match self {
            Self::None => Self::NONE,
            Self::Default => Self::DEFAULT,
            Self::Custom(id) => id,
        }
    }
}

/// Outcome of checking a proposed course code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeStatus {
    Invalid,
    InUse,
    Good,
}

impl fmt::Display for CodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Invalid => "Invalid",
            Self::InUse => "In Use",
            Self::Good => "Good to Go",
        })
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Checks the `^[a-z][a-z0-9-]{2,19}$` course-code format.
pub fn is_valid_course_code(code: &str) -> bool {
    COURSE_CODE.is_match(code)
}

pub fn validate_course_code(code: &str) -> Result<()> {
    if is_valid_course_code(code) {
        Ok(())
    } else {
        Err(RepositoryError::InvalidCourseCode(code.to_string()))
    }
}

pub fn validate_grade_level(grade_level: u8) -> Result<()> {
    if grade_level <= MAX_GRADE_LEVEL {
        Ok(())
    } else {
        Err(RepositoryError::InvalidGradeLevel(grade_level))
    }
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(RepositoryError::InvalidData(format!("{field} is required")));
    }
    Ok(())
}

// ============================================================================
// Records
// ============================================================================

/// Editable course fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseDraft {
    pub name: String,
    pub description: String,
    pub grade_level: u8,
    pub availability: Availability,
}

impl CourseDraft {
    pub fn new(name: impl Into<String>, description: impl Into<String>, grade_level: u8) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            grade_level,
            availability: Availability::default(),
        }
    }

    pub fn with_availability(mut self, availability: Availability) -> Self {
        self.availability = availability;
        self
    }

    pub fn validate(&self) -> Result<()> {
        require("Course name", &self.name)?;
        validate_grade_level(self.grade_level)
    }
}

/// A course as listed under its owner (`USER#<email>` / `COURSE#<code>`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseLink {
    pub code: String,
    pub name: String,
    pub description: String,
    pub grade_level: u8,
    pub availability: Availability,
    pub created_at: String,
}

/// The canonical course row (`COURSE#<code>` / `METADATA`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseMetadata {
    pub code: String,
    pub name: String,
    pub description: String,
    pub grade_level: u8,
    pub availability: Availability,
    pub created_by: String,
    pub created_at: String,
}

/// Every row stored in a course's own partition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CourseDetails {
    pub metadata: Option<CourseMetadata>,
    pub units: Vec<UnitRecord>,
    pub assistants: Vec<Assistant>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitRecord {
    pub id: String,
    pub title: String,
    pub description: String,
    pub order: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionRecord {
    pub id: String,
    pub course_code: String,
    pub unit_id: String,
    pub title: String,
    pub overview: String,
    pub order: u32,
    pub section_type: SectionType,
    pub content: Option<String>,
    pub file_path: Option<String>,
    pub assistant_id: Option<String>,
}

impl SectionRecord {
    pub fn assistant(&self) -> AssistantSelector {
        AssistantSelector::from_stored(self.assistant_id.as_deref())
    }
}

/// A custom assistant persona of one course.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assistant {
    pub id: String,
    pub name: String,
    pub instructions: String,
    pub created_at: String,
}

/// Display name and system prompt of the assistant a section uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAssistant {
    pub name: String,
    pub instructions: String,
}

/// Section payload: markdown text or the object key of an uploaded PDF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionBody {
    Content(String),
    File(String),
}

impl SectionBody {
    pub fn section_type(&self) -> SectionType {
        match self {
            Self::Content(_) => SectionType::Content,
            Self::File(_) => SectionType::File,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSection {
    pub id: String,
    pub title: String,
    pub overview: String,
    pub body: SectionBody,
    pub assistant: Option<AssistantSelector>,
}

impl NewSection {
    /// A section with a freshly generated id.
    pub fn new(title: impl Into<String>, overview: impl Into<String>, body: SectionBody) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            overview: overview.into(),
            body,
            assistant: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_assistant(mut self, assistant: AssistantSelector) -> Self {
        self.assistant = Some(assistant);
        self
    }

    pub fn validate(&self) -> Result<()> {
        require("Section id", &self.id)?;
        require("Section title", &self.title)?;
        if self.id.contains('#') {
            return Err(RepositoryError::InvalidData(format!(
                "Section id '{}' contains '#'",
                self.id
            )));
        }
        if let SectionBody::File(path) = &self.body {
            require("File path", path)?;
        }
        Ok(())
    }
}

/// Partial section update. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionUpdate {
    pub title: Option<String>,
    pub overview: Option<String>,
    pub section_type: Option<SectionType>,
    pub content: Option<String>,
    pub file_path: Option<String>,
}

impl SectionUpdate {
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn overview(mut self, overview: impl Into<String>) -> Self {
        self.overview = Some(overview.into());
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn file_path(mut self, file_path: impl Into<String>) -> Self {
        self.file_path = Some(file_path.into());
        self
    }

    pub fn section_type(mut self, section_type: SectionType) -> Self {
        self.section_type = Some(section_type);
        self
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// What a course copy produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopySummary {
    pub units: usize,
    pub sections: usize,
    pub assistants: usize,
    /// File sections whose file could not be copied and were turned into
    /// content sections carrying the error.
    pub degraded_sections: usize,
}

// ============================================================================
// Course graph
// ============================================================================

/// A course hydrated with its units and section summaries, ordered for
/// display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Course {
    pub code: String,
    pub name: String,
    pub description: String,
    pub grade_level: u8,
    pub availability: Availability,
    pub units: Vec<Unit>,
}

impl Course {
    pub fn unit(&self, unit_id: &str) -> Option<&Unit> {
        self.units.iter().find(|unit| unit.id == unit_id)
    }

    pub fn section_count(&self) -> usize {
        self.units.iter().map(|unit| unit.sections.len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    pub id: String,
    pub title: String,
    pub description: String,
    pub order: u32,
    pub sections: Vec<SectionSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionSummary {
    pub id: String,
    pub unit_id: String,
    pub title: String,
    pub overview: String,
    pub order: u32,
    pub section_type: SectionType,
}

/// A single section with its assistant resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub id: String,
    pub title: String,
    pub overview: String,
    pub content: Option<String>,
    pub file_path: Option<String>,
    pub section_type: SectionType,
    pub order: u32,
    pub unit_id: String,
    pub unit_title: String,
    pub assistant_id: Option<String>,
    pub assistant_name: Option<String>,
    pub assistant_instructions: Option<String>,
}

//! Course/Session Facade.
//!
//! Turns repository rows into the [`Course`]/[`Unit`]/[`Section`] graph the
//! UI renders, and holds the caller's working context: the resident course,
//! the resident section and the bytes of its PDF when it is a file section.
//!
//! Nothing here returns a raw error. Failures are logged and surface as
//! `None`, `false` or an empty list.

use tracing::{info, warn};

use crate::cache::CacheKey;
use crate::error::Result;
use crate::model::{Availability, Course, Section, SectionSummary, SectionType, Unit};
use crate::repository::CourseRepository;

#[derive(Debug, Clone)]
pub struct CourseSession {
    repo: CourseRepository,
    course: Option<Course>,
    section: Option<Section>,
    pdf: Option<Vec<u8>>,
}

impl CourseSession {
    pub fn new(repo: CourseRepository) -> Self {
        Self {
            repo,
            course: None,
            section: None,
            pdf: None,
        }
    }

    pub fn repository(&self) -> &CourseRepository {
        &self.repo
    }

    /// The resident course, if one has been initialized.
    pub fn course(&self) -> Option<&Course> {
        self.course.as_ref()
    }

    pub fn section(&self) -> Option<&Section> {
        self.section.as_ref()
    }

    /// PDF bytes of the resident section when it is a file section.
    pub fn pdf_bytes(&self) -> Option<&[u8]> {
        self.pdf.as_deref()
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// The full course graph, units and sections in display order.
    pub async fn get_course(&self, code: &str) -> Option<Course> {
        let result = self
            .repo
            .cache()
            .get_or_load(CacheKey::CourseGraph(code.to_string()), || {
                self.load_course(code)
            })
            .await;
        settle("loading course", result).flatten()
    }

    async fn load_course(&self, code: &str) -> Result<Option<Course>> {
        let details = self.repo.get_course_details(code).await?;
        let Some(metadata) = details.metadata else {
            return Ok(None);
        };

        let mut units = Vec::with_capacity(details.units.len());
        for record in details.units {
            let mut sections: Vec<SectionSummary> = self
                .repo
                .get_unit_sections(code, &record.id)
                .await?
                .into_iter()
                .map(|s| SectionSummary {
                    id: s.id,
                    unit_id: s.unit_id,
                    title: s.title,
                    overview: s.overview,
                    order: s.order,
                    section_type: s.section_type,
                })
                .collect();
            sections.sort_by_key(|s| s.order);
            units.push(Unit {
                id: record.id,
                title: record.title,
                description: record.description,
                order: record.order,
                sections,
            });
        }
        units.sort_by_key(|u| u.order);

        Ok(Some(Course {
            code: metadata.code,
            name: metadata.name,
            description: metadata.description,
            grade_level: metadata.grade_level,
            availability: metadata.availability,
            units,
        }))
    }

    /// One section with its assistant resolved.
    ///
    /// `unit_title` comes from the resident course and is empty when that
    /// course is not resident.
    pub async fn get_section(&self, code: &str, unit_id: &str, section_id: &str) -> Option<Section> {
        let result = self.load_section(code, unit_id, section_id).await;
        settle("loading section", result).flatten()
    }

    async fn load_section(
        &self,
        code: &str,
        unit_id: &str,
        section_id: &str,
    ) -> Result<Option<Section>> {
        let Some(record) = self
            .repo
            .get_section_record(code, unit_id, section_id)
            .await?
        else {
            return Ok(None);
        };
        let assistant = self.repo.resolve_assistant(code, &record.assistant()).await?;
        let unit_title = self
            .course
            .as_ref()
            .filter(|course| course.code == code)
            .and_then(|course| course.unit(unit_id))
            .map(|unit| unit.title.clone())
            .unwrap_or_default();

        Ok(Some(Section {
            id: record.id,
            title: record.title,
            overview: record.overview,
            content: record.content,
            file_path: record.file_path,
            section_type: record.section_type,
            order: record.order,
            unit_id: record.unit_id,
            unit_title,
            assistant_id: record.assistant_id,
            assistant_name: assistant.as_ref().map(|a| a.name.clone()),
            assistant_instructions: assistant.map(|a| a.instructions),
        }))
    }

    /// Every course open to all students, hydrated.
    pub async fn get_open_courses(&self) -> Vec<Course> {
        let result = self
            .repo
            .cache()
            .get_or_load(CacheKey::OpenCourses, || self.load_open_courses())
            .await;
        settle("loading open courses", result).unwrap_or_default()
    }

    async fn load_open_courses(&self) -> Result<Vec<Course>> {
        let codes: Vec<String> = self
            .repo
            .get_all_courses()
            .await?
            .into_iter()
            .filter(|link| link.availability == Availability::OpenToAll)
            .map(|link| link.code)
            .collect();
        Ok(self.hydrate(&codes).await)
    }

    /// Every course owned by `email`, hydrated.
    pub async fn get_user_courses(&self, email: &str) -> Vec<Course> {
        match self.repo.get_user_courses(email).await {
            Ok(links) => {
                let codes: Vec<String> = links.into_iter().map(|link| link.code).collect();
                self.hydrate(&codes).await
            }
            Err(e) => {
                warn!("Failed loading courses for {email}: {e}");
                Vec::new()
            }
        }
    }

    async fn hydrate(&self, codes: &[String]) -> Vec<Course> {
        let mut courses = Vec::with_capacity(codes.len());
        for code in codes {
            match self.get_course(code).await {
                Some(course) => courses.push(course),
                None => warn!("Course '{code}' is listed but could not be loaded"),
            }
        }
        courses
    }

    // ========================================================================
    // Working context
    // ========================================================================

    /// Makes `code` the resident course. Switching courses drops the
    /// resident section.
    pub async fn initialize_course(&mut self, code: &str) -> bool {
        let Some(course) = self.get_course(code).await else {
            return false;
        };
        if self.course.as_ref().map(|c| c.code.as_str()) != Some(code) {
            self.clear_section_context();
        }
        self.course = Some(course);
        true
    }

    /// Makes a section of the resident course the resident section.
    pub async fn initialize_section(&mut self, unit_id: &str, section_id: &str) -> bool {
        let Some(code) = self.course.as_ref().map(|c| c.code.clone()) else {
            warn!("No resident course to load section '{section_id}' from");
            return false;
        };
        self.enter_section(&code, unit_id, section_id).await
    }

    /// Deep link: locates the section, then makes its course and the section
    /// resident.
    pub async fn initialize_section_from_id(&mut self, section_id: &str) -> bool {
        let location = match self.repo.get_section_location(section_id).await {
            Ok(Some(location)) => location,
            Ok(None) => {
                info!("No section with id '{section_id}'");
                return false;
            }
            Err(e) => {
                warn!("Failed locating section '{section_id}': {e}");
                return false;
            }
        };
        let (code, unit_id) = location;
        if !self.initialize_course(&code).await {
            return false;
        }
        self.enter_section(&code, &unit_id, section_id).await
    }

    async fn enter_section(&mut self, code: &str, unit_id: &str, section_id: &str) -> bool {
        let Some(section) = self.get_section(code, unit_id, section_id).await else {
            return false;
        };

        self.pdf = None;
        if section.section_type == SectionType::File {
            if let Some(path) = section.file_path.as_deref() {
                match self.repo.get_file_content(path).await {
                    Ok(Some(bytes)) => self.pdf = Some(bytes),
                    Ok(None) => warn!("File '{path}' of section '{section_id}' is missing"),
                    Err(e) => warn!("Failed downloading '{path}': {e}"),
                }
            }
        }
        self.section = Some(section);
        true
    }

    pub fn clear_section_context(&mut self) {
        self.section = None;
        self.pdf = None;
    }

    pub fn clear_course_context(&mut self) {
        self.course = None;
        self.clear_section_context();
    }

    /// Flushes the shared read cache.
    pub async fn clear_cache(&self) {
        self.repo.cache().invalidate_all().await;
    }
}

fn settle<T>(context: &str, result: Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Failed {context}: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AssistantSelector, CourseDraft, NewSection, SectionBody};
    use crate::repository::testing::{fixture, fixture_with_course, Fixture, TEACHER};
    use crate::repository::DEFAULT_ASSISTANT_NAME;

    async fn course_with_sections() -> (Fixture, String) {
        let f = fixture_with_course("astro-12").await;
        let unit = f.repo.create_unit("astro-12", "Stars", "Fusion").await.unwrap();
        f.repo
            .create_section(
                "astro-12",
                &unit,
                NewSection::new("Intro", "Overview", SectionBody::Content("# Stars".into()))
                    .with_id("intro"),
            )
            .await
            .unwrap();
        let key = f
            .repo
            .upload_section_file("astro-12", "reading", b"%PDF-1.7".to_vec())
            .await
            .unwrap();
        f.repo
            .create_section(
                "astro-12",
                &unit,
                NewSection::new("Reading", "", SectionBody::File(key))
                    .with_id("reading")
                    .with_assistant(AssistantSelector::None),
            )
            .await
            .unwrap();
        (f, unit)
    }

    #[tokio::test]
    async fn test_create_then_get_course() {
        let (f, unit) = course_with_sections().await;
        let session = CourseSession::new(f.repo.clone());

        let course = session.get_course("astro-12").await.unwrap();
        assert_eq!(course.name, "Astronomy");
        assert_eq!(course.grade_level, 9);
        assert_eq!(course.units.len(), 1);
        assert_eq!(course.units[0].id, unit);

        let titles: Vec<_> = course.units[0].sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Intro", "Reading"]);
        assert_eq!(course.section_count(), 2);
    }

    #[tokio::test]
    async fn test_missing_course_is_none() {
        let f = fixture();
        let session = CourseSession::new(f.repo.clone());
        assert!(session.get_course("nope-1").await.is_none());
    }

    #[tokio::test]
    async fn test_get_course_reflects_writes() {
        let f = fixture_with_course("astro-12").await;
        let session = CourseSession::new(f.repo.clone());
        assert_eq!(session.get_course("astro-12").await.unwrap().name, "Astronomy");

        f.repo
            .update_course(TEACHER, "astro-12", &CourseDraft::new("Astrophysics", "desc", 10))
            .await
            .unwrap();

        let course = session.get_course("astro-12").await.unwrap();
        assert_eq!(course.name, "Astrophysics");
        assert_eq!(course.grade_level, 10);
    }

    #[tokio::test]
    async fn test_get_course_is_cached() {
        let f = fixture_with_course("astro-12").await;
        let session = CourseSession::new(f.repo.clone());
        session.get_course("astro-12").await.unwrap();

        let reads = f.store.read_count();
        session.get_course("astro-12").await.unwrap();
        assert_eq!(f.store.read_count(), reads);
    }

    #[tokio::test]
    async fn test_store_failure_becomes_none() {
        let f = fixture_with_course("astro-12").await;
        let session = CourseSession::new(f.repo.clone());
        f.store.set_unavailable(true);

        assert!(session.get_course("astro-12").await.is_none());
        assert!(session.get_open_courses().await.is_empty());
        assert!(session.get_user_courses(TEACHER).await.is_empty());
    }

    #[tokio::test]
    async fn test_get_section_resolves_assistant() {
        let (f, unit) = course_with_sections().await;
        let mut session = CourseSession::new(f.repo.clone());

        let intro = session.get_section("astro-12", &unit, "intro").await.unwrap();
        assert_eq!(intro.unit_title, "");
        assert_eq!(intro.assistant_name.as_deref(), Some(DEFAULT_ASSISTANT_NAME));

        let reading = session.get_section("astro-12", &unit, "reading").await.unwrap();
        assert_eq!(reading.assistant_name, None);
        assert_eq!(reading.assistant_instructions, None);

        assert!(session.initialize_course("astro-12").await);
        let intro = session.get_section("astro-12", &unit, "intro").await.unwrap();
        assert_eq!(intro.unit_title, "Stars");

        assert!(session.get_section("astro-12", &unit, "ghost").await.is_none());
    }

    #[tokio::test]
    async fn test_initialize_section_needs_a_resident_course() {
        let (f, unit) = course_with_sections().await;
        let mut session = CourseSession::new(f.repo.clone());
        assert!(!session.initialize_section(&unit, "intro").await);

        assert!(session.initialize_course("astro-12").await);
        assert!(session.initialize_section(&unit, "intro").await);
        assert_eq!(session.section().unwrap().title, "Intro");
        assert!(session.pdf_bytes().is_none());
    }

    #[tokio::test]
    async fn test_deep_link_loads_course_section_and_pdf() {
        let (f, unit) = course_with_sections().await;
        let mut session = CourseSession::new(f.repo.clone());

        assert!(session.initialize_section_from_id("reading").await);
        assert_eq!(session.course().unwrap().code, "astro-12");
        let section = session.section().unwrap();
        assert_eq!(section.unit_id, unit);
        assert_eq!(section.unit_title, "Stars");
        assert_eq!(session.pdf_bytes(), Some(&b"%PDF-1.7"[..]));

        assert!(!session.initialize_section_from_id("ghost").await);
    }

    #[tokio::test]
    async fn test_clearing_context() {
        let (f, _) = course_with_sections().await;
        let mut session = CourseSession::new(f.repo.clone());
        assert!(session.initialize_section_from_id("reading").await);

        session.clear_section_context();
        assert!(session.section().is_none());
        assert!(session.pdf_bytes().is_none());
        assert!(session.course().is_some());

        session.clear_course_context();
        assert!(session.course().is_none());
    }

    #[tokio::test]
    async fn test_open_and_user_courses() {
        let f = fixture_with_course("astro-12").await;
        f.repo
            .create_course(
                "other@example.com",
                "bio-101",
                &CourseDraft::new("Biology", "", 7).with_availability(Availability::OpenToAll),
            )
            .await
            .unwrap();
        let session = CourseSession::new(f.repo.clone());

        let open: Vec<_> = session
            .get_open_courses()
            .await
            .into_iter()
            .map(|c| c.code)
            .collect();
        assert_eq!(open, vec!["bio-101".to_string()]);

        f.repo
            .set_course_availability(TEACHER, "astro-12", Availability::OpenToAll)
            .await
            .unwrap();
        assert_eq!(session.get_open_courses().await.len(), 2);

        let mine = session.get_user_courses(TEACHER).await;
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].name, "Astronomy");
    }

    #[tokio::test]
    async fn test_clear_cache_drops_entries() {
        let f = fixture_with_course("astro-12").await;
        let session = CourseSession::new(f.repo.clone());
        session.get_course("astro-12").await.unwrap();
        assert!(!f.repo.cache().is_empty().await);

        session.clear_cache().await;
        assert!(f.repo.cache().is_empty().await);
    }
}

use anyhow::{anyhow, Result};
use course_store::dynamodb::{DynamoDb, Table};
use course_store::keys;
use course_store::model::{
    AssistantSelector, Availability, Course, CourseDraft, NewSection, SectionBody,
    DEFAULT_GRADE_LEVEL,
};
use course_store::CourseSession;
use std::io::{self, Write};
use tracing::info;
use uuid::Uuid;

const COMMANDS: &str = "info/validate/create_course/update_course/delete_course/my_courses/\
open_courses/show/add_unit/delete_unit/add_section/add_file_section/delete_section/locate/\
open_link/copy/assistants/add_assistant/delete_assistant/set_assistant/exit";

/// Runs the course administration prompt.
///
/// Asks once for the teacher's email, then loops over commands until `exit`.
/// Course writes act on behalf of that teacher. A failed command prints its
/// error and the loop continues.
///
/// # Arguments
///
/// * `ddb` - The DynamoDB client, used for table information
/// * `table` - The course table configuration
/// * `session` - The course session wrapping the repository
pub async fn run(ddb: &DynamoDb, table: &Table, session: &mut CourseSession) -> Result<()> {
    let email = prompt("Teacher email", Some("teacher@example.com"))?;
    if email.is_empty() {
        return Err(anyhow!("A teacher email is required"));
    }

    loop {
        let command = prompt(&format!("Enter command ({COMMANDS})"), None)?;
        let result = match command.as_str() {
            "info" => print_info(ddb, table, session).await,
            "validate" => validate_code(session).await,
            "create_course" => create_course(session, &email).await,
            "update_course" => update_course(session, &email).await,
            "delete_course" => delete_course(session, &email).await,
            "my_courses" => my_courses(session, &email).await,
            "open_courses" => open_courses(session).await,
            "show" => show_course(session).await,
            "add_unit" => add_unit(session).await,
            "delete_unit" => delete_unit(session).await,
            "add_section" => add_section(session).await,
            "add_file_section" => add_file_section(session).await,
            "delete_section" => delete_section(session).await,
            "locate" => locate_section(session).await,
            "open_link" => open_link(session).await,
            "copy" => copy_course(session, &email).await,
            "assistants" => list_assistants(session).await,
            "add_assistant" => add_assistant(session).await,
            "delete_assistant" => delete_assistant(session).await,
            "set_assistant" => set_assistant(session).await,
            "exit" => break,
            _ => {
                println!("Unknown command. Please try again.");
                Ok(())
            }
        };
        if let Err(e) = result {
            println!("Error: {e}");
        }
    }
    Ok(())
}

/// Prints the course table's status, item count and indexes.
async fn print_info(ddb: &DynamoDb, table: &Table, session: &CourseSession) -> Result<()> {
    let table_info = ddb.describe_table(table.name()).await?;
    let description = table_info
        .table()
        .ok_or_else(|| anyhow!("Table '{}' has no description", table.name()))?;
    let courses = session.repository().get_all_courses().await?;

    println!("\n--- Table Information ---");
    println!("Table Name: {}", table.name());
    println!("Partition Key: {}", table.partition_key());
    if let Some(key) = table.sort_key() {
        println!("Sort Key: {}", key);
    }
    for index in table.indexes() {
        println!(
            "Index: {} ({} / {})",
            index.name(),
            index.partition_key(),
            index.sort_key().unwrap_or("-")
        );
    }
    println!("Item Count: {}", description.item_count().unwrap_or(0));
    println!("Table Size (bytes): {}", description.table_size_bytes().unwrap_or(0));
    println!("Table Status: {:?}", description.table_status());
    println!("Courses: {}", courses.len());
    println!(
        "Cache TTL: {:?}, cached entries: {}",
        session.repository().cache().ttl(),
        session.repository().cache().len().await
    );
    println!("-------------------------\n");
    Ok(())
}

async fn validate_code(session: &CourseSession) -> Result<()> {
    let code = prompt("Course code", Some("astro-12"))?;
    let status = session.repository().validate_course_code(&code).await?;
    println!("{code}: {status}");
    Ok(())
}

async fn create_course(session: &CourseSession, email: &str) -> Result<()> {
    let code = prompt("Course code", Some("astro-12"))?;
    let draft = prompt_draft(None)?;
    session
        .repository()
        .create_course(email, &code, &draft)
        .await?;
    info!("Course '{code}' created");
    Ok(())
}

/// Prompts for every editable field, offering the current values when
/// updating.
async fn update_course(session: &CourseSession, email: &str) -> Result<()> {
    let code = prompt("Course code", None)?;
    let current = session
        .repository()
        .get_course_metadata(&code)
        .await?
        .ok_or_else(|| anyhow!("Course '{code}' not found"))?;
    let current = CourseDraft::new(current.name, current.description, current.grade_level)
        .with_availability(current.availability);

    let draft = prompt_draft(Some(&current))?;
    session
        .repository()
        .update_course(email, &code, &draft)
        .await?;
    println!("Course '{code}' updated.");
    Ok(())
}

fn prompt_draft(current: Option<&CourseDraft>) -> Result<CourseDraft> {
    let name = prompt_or(
        "Course name",
        current.map(|c| c.name.as_str()).unwrap_or("Astronomy"),
    )?;
    let description = prompt_or(
        "Description",
        current.map(|c| c.description.as_str()).unwrap_or(""),
    )?;
    let grade = current
        .map(|c| c.grade_level)
        .unwrap_or(DEFAULT_GRADE_LEVEL)
        .to_string();
    let grade_level = prompt_or("Grade level (0-13)", &grade)?.parse::<u8>()?;
    let open = prompt_bool(
        "Open to all students?",
        current.is_some_and(|c| c.availability == Availability::OpenToAll),
    )?;
    let availability = if open {
        Availability::OpenToAll
    } else {
        Availability::RequiresCode
    };
    Ok(CourseDraft::new(name, description, grade_level).with_availability(availability))
}

async fn delete_course(session: &mut CourseSession, email: &str) -> Result<()> {
    let code = prompt("Course code", None)?;
    let confirmed = prompt_bool(
        &format!(
            "Are you sure you want to delete '{code}' with all units, sections and files? This action cannot be undone."
        ),
        false,
    )?;
    if !confirmed {
        println!("Course deletion cancelled.");
        return Ok(());
    }

    session.repository().delete_course(email, &code).await?;
    if session.course().is_some_and(|c| c.code == code) {
        session.clear_course_context();
    }
    println!("Course '{code}' has been deleted.");
    Ok(())
}

async fn my_courses(session: &CourseSession, email: &str) -> Result<()> {
    print_courses(&format!("Courses of {email}"), &session.get_user_courses(email).await);
    Ok(())
}

async fn open_courses(session: &CourseSession) -> Result<()> {
    print_courses("Open Courses", &session.get_open_courses().await);
    Ok(())
}

/// Loads a course as the resident course and prints its outline.
async fn show_course(session: &mut CourseSession) -> Result<()> {
    let code = prompt("Course code", None)?;
    if !session.initialize_course(&code).await {
        return Err(anyhow!("Course '{code}' not found"));
    }
    if let Some(course) = session.course() {
        print_outline(course);
    }
    Ok(())
}

async fn add_unit(session: &CourseSession) -> Result<()> {
    let code = prompt("Course code", None)?;
    let title = prompt("Unit title", Some("Stars"))?;
    let description = prompt("Unit description", None)?;
    let id = session
        .repository()
        .create_unit(&code, &title, &description)
        .await?;
    println!("Unit created with id {id}");
    Ok(())
}

async fn delete_unit(session: &CourseSession) -> Result<()> {
    let code = prompt("Course code", None)?;
    let unit_id = prompt("Unit id", None)?;
    if prompt_bool("Delete the unit with all its sections?", false)? {
        session.repository().delete_unit(&code, &unit_id).await?;
        println!("Unit '{unit_id}' has been deleted.");
    }
    Ok(())
}

async fn add_section(session: &CourseSession) -> Result<()> {
    let code = prompt("Course code", None)?;
    let unit_id = prompt("Unit id", None)?;
    let title = prompt("Section title", Some("Introduction"))?;
    let overview = prompt("Overview", None)?;
    let content = prompt("Content (markdown)", Some("# Welcome"))?;

    let section = NewSection::new(title, overview, SectionBody::Content(content))
        .with_assistant(prompt_assistant()?);
    let id = session
        .repository()
        .create_section(&code, &unit_id, section)
        .await?;
    println!("Section created with id {id}");
    Ok(())
}

/// Uploads a local PDF and creates a file section pointing at it.
async fn add_file_section(session: &CourseSession) -> Result<()> {
    let code = prompt("Course code", None)?;
    let unit_id = prompt("Unit id", None)?;
    let title = prompt("Section title", Some("Reading"))?;
    let overview = prompt("Overview", None)?;
    let path = prompt("Path to PDF", Some("./reading.pdf"))?;

    let bytes = tokio::fs::read(&path).await?;
    let id = Uuid::new_v4().to_string();
    let repo = session.repository();
    let key = repo.upload_section_file(&code, &id, bytes).await?;

    let section = NewSection::new(title, overview, SectionBody::File(key.clone()))
        .with_id(id.as_str())
        .with_assistant(prompt_assistant()?);
    if let Err(e) = repo.create_section(&code, &unit_id, section).await {
        repo.delete_content_file(&code, &keys::section_file_name(&id))
            .await
            .ok();
        return Err(e.into());
    }
    println!("File section created with id {id} ({key})");
    Ok(())
}

async fn delete_section(session: &CourseSession) -> Result<()> {
    let code = prompt("Course code", None)?;
    let unit_id = prompt("Unit id", None)?;
    let section_id = prompt("Section id", None)?;
    session
        .repository()
        .delete_section(&code, &unit_id, &section_id)
        .await?;
    println!("Section '{section_id}' has been deleted.");
    Ok(())
}

async fn locate_section(session: &CourseSession) -> Result<()> {
    let section_id = prompt("Section id", None)?;
    match session
        .repository()
        .get_section_location(&section_id)
        .await?
    {
        Some((code, unit_id)) => println!("Course: {code}, unit: {unit_id}"),
        None => println!("Section not found"),
    }
    Ok(())
}

/// Follows a section deep link the way a student's browser would.
async fn open_link(session: &mut CourseSession) -> Result<()> {
    let section_id = prompt("Section id", None)?;
    if !session.initialize_section_from_id(&section_id).await {
        return Err(anyhow!("Could not open section '{section_id}'"));
    }

    if let (Some(course), Some(section)) = (session.course(), session.section()) {
        println!("\n--- {} / {} / {} ---", course.name, section.unit_title, section.title);
        println!("Type: {}", section.section_type);
        if !section.overview.is_empty() {
            println!("Overview: {}", section.overview);
        }
        match &section.assistant_name {
            Some(name) => println!("Assistant: {name}"),
            None => println!("Assistant: none"),
        }
        if let Some(content) = &section.content {
            println!("{content}");
        }
    }
    if let Some(pdf) = session.pdf_bytes() {
        println!("PDF loaded ({} bytes)", pdf.len());
    }
    Ok(())
}

async fn copy_course(session: &CourseSession, email: &str) -> Result<()> {
    let source = prompt("Source course code", None)?;
    let target = prompt("New course code", Some(&format!("{source}-copy")))?;
    let repo = session.repository();
    let metadata = repo
        .get_course_metadata(&source)
        .await?
        .ok_or_else(|| anyhow!("Course '{source}' not found"))?;
    let name = prompt_or("New course name", &format!("{} (Copy)", metadata.name))?;

    let summary = repo.duplicate_course(email, &source, &target, &name).await?;
    println!(
        "Copied {} units, {} sections and {} assistants into '{target}'",
        summary.units, summary.sections, summary.assistants
    );
    if summary.degraded_sections > 0 {
        println!(
            "{} file sections could not be copied and now hold an error message",
            summary.degraded_sections
        );
    }
    Ok(())
}

async fn list_assistants(session: &CourseSession) -> Result<()> {
    let code = prompt("Course code", None)?;
    let assistants = session.repository().get_custom_assistants(&code).await?;
    println!("\n--- Assistants of {code} ---");
    println!("Default (built in)");
    for assistant in assistants {
        println!("{}  {}  ({})", assistant.id, assistant.name, assistant.created_at);
    }
    println!("----------------------------");
    Ok(())
}

async fn add_assistant(session: &CourseSession) -> Result<()> {
    let code = prompt("Course code", None)?;
    let name = prompt("Assistant name", Some("Lab Helper"))?;
    let instructions = prompt("Instructions", Some("Guide students through the lab"))?;
    let id = session
        .repository()
        .create_custom_assistant(&code, &name, &instructions)
        .await?;
    println!("Assistant created with id {id}");
    Ok(())
}

async fn delete_assistant(session: &CourseSession) -> Result<()> {
    let code = prompt("Course code", None)?;
    let assistant_id = prompt("Assistant id", None)?;
    session
        .repository()
        .delete_custom_assistant(&code, &assistant_id)
        .await?;
    println!("Assistant '{assistant_id}' has been deleted.");
    Ok(())
}

async fn set_assistant(session: &CourseSession) -> Result<()> {
    let code = prompt("Course code", None)?;
    let unit_id = prompt("Unit id", None)?;
    let section_id = prompt("Section id", None)?;
    let selector = prompt_assistant()?;
    session
        .repository()
        .update_section_assistant(&code, &unit_id, &section_id, &selector)
        .await?;
    println!("Section '{section_id}' now uses {}", selector.as_stored());
    Ok(())
}

fn print_courses(title: &str, courses: &[Course]) {
    println!("\n--- {} ---", title);
    for course in courses {
        println!(
            "{}  {}  (grade {}, {} units, {} sections, {})",
            course.code,
            course.name,
            course.grade_level,
            course.units.len(),
            course.section_count(),
            course.availability.as_str()
        );
    }
    println!("{}", "-".repeat(title.len() + 8));
}

fn print_outline(course: &Course) {
    println!("\n--- {} ({}) ---", course.name, course.code);
    if !course.description.is_empty() {
        println!("{}", course.description);
    }
    for unit in &course.units {
        println!("{}. {}  [{}]", unit.order, unit.title, unit.id);
        for section in &unit.sections {
            println!(
                "   {}.{} {} ({})  [{}]",
                unit.order, section.order, section.title, section.section_type, section.id
            );
        }
    }
    println!("{}", "-".repeat(course.name.len() + course.code.len() + 11));
}

fn prompt(message: &str, example: Option<&str>) -> Result<String> {
    let full_message = if let Some(ex) = example {
        format!("{} (e.g., {}): ", message, ex)
    } else {
        format!("{}: ", message)
    };
    print!("{}", full_message);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

/// Prompts with `default` shown; an empty answer keeps it.
fn prompt_or(message: &str, default: &str) -> Result<String> {
    let input = prompt_optional(&format!("{message} [{default}]"), None)?;
    Ok(input.unwrap_or_else(|| default.to_string()))
}

fn prompt_optional(message: &str, example: Option<&str>) -> Result<Option<String>> {
    let input = prompt(message, example)?;
    Ok(if input.is_empty() { None } else { Some(input) })
}

fn prompt_bool(message: &str, default: bool) -> Result<bool> {
    let input = prompt(
        &format!("{} (y/n)", message),
        Some(if default { "y" } else { "n" }),
    )?;
    Ok(input.to_lowercase().starts_with('y') || (input.is_empty() && default))
}

fn prompt_assistant() -> Result<AssistantSelector> {
    let input = prompt("Assistant (none/default/<assistant id>)", Some("default"))?;
    Ok(match input.to_lowercase().as_str() {
        "" | "default" => AssistantSelector::Default,
        "none" => AssistantSelector::None,
        _ => AssistantSelector::Custom(input),
    })
}

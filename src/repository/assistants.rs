use tracing::info;
use uuid::Uuid;

use crate::cache::CacheKey;
use crate::dynamodb::{AttributeUpdate, Item};
use crate::error::{RepositoryError, Result};
use crate::keys;
use crate::model::{Assistant, AssistantSelector, ResolvedAssistant};
use crate::repository::rows::AssistantRow;
use crate::repository::{as_entity, log_failure, now, CourseRepository, DEFAULT_ASSISTANT_NAME};

impl CourseRepository {
    /// Creates a custom assistant and returns its id. Names are unique within
    /// a course.
    pub async fn create_custom_assistant(
        &self,
        code: &str,
        name: &str,
        instructions: &str,
    ) -> Result<String> {
        let result = self.insert_assistant(code, name, instructions).await;
        self.finish_write("creating custom assistant", result).await
    }

    async fn insert_assistant(&self, code: &str, name: &str, instructions: &str) -> Result<String> {
        if name.trim().is_empty() {
            return Err(RepositoryError::InvalidData("Assistant name is required".to_string()));
        }
        if instructions.trim().is_empty() {
            return Err(RepositoryError::InvalidData(
                "Assistant instructions are required".to_string(),
            ));
        }
        if self
            .load_custom_assistants(code)
            .await?
            .iter()
            .any(|a| a.name == name)
        {
            return Err(RepositoryError::already_exists("Assistant", name));
        }

        let assistant = Assistant {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            instructions: instructions.to_string(),
            created_at: now(),
        };
        self.store
            .put_if_absent(Item::from_serde(&AssistantRow::new(code, &assistant))?)
            .await
            .map_err(|e| as_entity(e, "Assistant"))?;

        info!("Assistant '{name}' created in course '{code}'");
        Ok(assistant.id)
    }

    pub async fn get_custom_assistants(&self, code: &str) -> Result<Vec<Assistant>> {
        let result = self
            .cache
            .get_or_load(CacheKey::CustomAssistants(code.to_string()), || {
                self.load_custom_assistants(code)
            })
            .await;
        log_failure("getting custom assistants", result)
    }

    /// Assistants in creation order.
    pub(super) async fn load_custom_assistants(&self, code: &str) -> Result<Vec<Assistant>> {
        let items = self
            .store
            .query(&keys::course_pk(code), Some(keys::ASSISTANT_PREFIX))
            .await?;
        let mut assistants = items
            .iter()
            .map(AssistantRow::from_item)
            .collect::<Result<Vec<_>>>()?;
        assistants.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(assistants)
    }

    /// Sections that still reference the assistant fall back to the default
    /// when read.
    pub async fn delete_custom_assistant(&self, code: &str, assistant_id: &str) -> Result<()> {
        let result = self
            .store
            .delete(&keys::course_pk(code), &keys::assistant_sk(assistant_id))
            .await;
        if result.is_ok() {
            info!("Assistant '{assistant_id}' deleted from course '{code}'");
        }
        self.finish_write("deleting custom assistant", result).await
    }

    pub async fn update_section_assistant(
        &self,
        code: &str,
        unit_id: &str,
        section_id: &str,
        assistant: &AssistantSelector,
    ) -> Result<()> {
        let result = self
            .store
            .update(
                &keys::section_pk(code, unit_id),
                &keys::section_sk(section_id),
                vec![AttributeUpdate::set_string("assistant_id", assistant.as_stored())],
            )
            .await
            .map_err(|e| as_entity(e, "Section"));
        self.finish_write("updating section assistant", result).await
    }

    /// Name and instructions for a selector.
    ///
    /// `None` means no assistant. A custom id that no longer exists resolves
    /// to the default assistant.
    pub async fn resolve_assistant(
        &self,
        code: &str,
        selector: &AssistantSelector,
    ) -> Result<Option<ResolvedAssistant>> {
        let default = || ResolvedAssistant {
            name: DEFAULT_ASSISTANT_NAME.to_string(),
            instructions: self.default_prompt.clone(),
        };
        match selector {
            AssistantSelector::None => Ok(None),
            AssistantSelector::Default => Ok(Some(default())),
            AssistantSelector::Custom(id) => {
                let assistants = self.get_custom_assistants(code).await?;
                Ok(Some(
                    assistants
                        .into_iter()
                        .find(|a| &a.id == id)
                        .map(|a| ResolvedAssistant {
                            name: a.name,
                            instructions: a.instructions,
                        })
                        .unwrap_or_else(default),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::error::RepositoryError;
    use crate::model::{AssistantSelector, NewSection, SectionBody};
    use crate::repository::testing::fixture_with_course;
    use crate::repository::{DEFAULT_ASSISTANT_NAME, DEFAULT_ASSISTANT_PROMPT};

    #[tokio::test]
    async fn test_create_and_list_assistants() {
        let f = fixture_with_course("astro-12").await;
        let id = f
            .repo
            .create_custom_assistant("astro-12", "Lab Helper", "Guide the lab")
            .await
            .unwrap();

        let assistants = f.repo.get_custom_assistants("astro-12").await.unwrap();
        assert_eq!(assistants.len(), 1);
        assert_eq!(assistants[0].id, id);
        assert_eq!(assistants[0].instructions, "Guide the lab");
    }

    #[tokio::test]
    async fn test_assistant_names_are_unique_per_course() {
        let f = fixture_with_course("astro-12").await;
        f.repo
            .create_custom_assistant("astro-12", "Lab Helper", "one")
            .await
            .unwrap();

        let result = f.repo.create_custom_assistant("astro-12", "Lab Helper", "two").await;
        assert!(matches!(
            result,
            Err(RepositoryError::AlreadyExists { entity_type: "Assistant", .. })
        ));

        assert!(matches!(
            f.repo.create_custom_assistant("astro-12", "", "x").await,
            Err(RepositoryError::InvalidData(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_assistant() {
        let f = fixture_with_course("astro-12").await;
        let id = f
            .repo
            .create_custom_assistant("astro-12", "Lab Helper", "Guide the lab")
            .await
            .unwrap();

        assert_eq!(
            f.repo.resolve_assistant("astro-12", &AssistantSelector::None).await.unwrap(),
            None
        );

        let default = f
            .repo
            .resolve_assistant("astro-12", &AssistantSelector::Default)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(default.name, DEFAULT_ASSISTANT_NAME);
        assert_eq!(default.instructions, DEFAULT_ASSISTANT_PROMPT);

        let custom = f
            .repo
            .resolve_assistant("astro-12", &AssistantSelector::Custom(id.clone()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(custom.name, "Lab Helper");

        f.repo.delete_custom_assistant("astro-12", &id).await.unwrap();
        let fallback = f
            .repo
            .resolve_assistant("astro-12", &AssistantSelector::Custom(id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fallback.name, DEFAULT_ASSISTANT_NAME);
    }

    #[tokio::test]
    async fn test_update_section_assistant() {
        let f = fixture_with_course("astro-12").await;
        let unit = f.repo.create_unit("astro-12", "Stars", "").await.unwrap();
        let section = f
            .repo
            .create_section(
                "astro-12",
                &unit,
                NewSection::new("A", "", SectionBody::Content("x".into())),
            )
            .await
            .unwrap();

        let selector = AssistantSelector::Custom("abc".into());
        f.repo
            .update_section_assistant("astro-12", &unit, &section, &selector)
            .await
            .unwrap();

        let record = f
            .repo
            .get_section_record("astro-12", &unit, &section)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.assistant(), selector);

        let missing = f
            .repo
            .update_section_assistant("astro-12", &unit, "ghost", &selector)
            .await;
        assert!(matches!(missing, Err(RepositoryError::NotFound { .. })));
    }
}

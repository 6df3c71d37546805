//! The player's dossier: the persona the narrative is written around.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a dossier was refused at intake.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DossierError {
    #[error("dossier field `{0}` must not be empty")]
    MissingField(&'static str),
}

/// How strict intake is about the dossier before the briefing opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntakePolicy {
    /// Only the name is required.
    #[default]
    NameOnly,
    /// Every field must be filled in.
    AllFields,
}

/// User-authored persona. All fields are free text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dossier {
    pub name: String,
    pub age: String,
    pub appearance: String,
    pub personality: String,
    pub role: String,
}

impl Dossier {
    /// Create a dossier with just a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_age(mut self, age: impl Into<String>) -> Self {
        self.age = age.into();
        self
    }

    pub fn with_appearance(mut self, appearance: impl Into<String>) -> Self {
        self.appearance = appearance.into();
        self
    }

    pub fn with_personality(mut self, personality: impl Into<String>) -> Self {
        self.personality = personality.into();
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    /// Field names paired with their values, in form order.
    pub fn fields(&self) -> [(&'static str, &str); 5] {
        [
            ("name", &self.name),
            ("age", &self.age),
            ("appearance", &self.appearance),
            ("personality", &self.personality),
            ("role", &self.role),
        ]
    }

    /// Check the dossier against an intake policy.
    pub fn validate(&self, policy: IntakePolicy) -> Result<(), DossierError> {
        match policy {
            IntakePolicy::NameOnly => {
                if self.name.trim().is_empty() {
                    return Err(DossierError::MissingField("name"));
                }
            }
            IntakePolicy::AllFields => {
                if let Some((field, _)) = self
                    .fields()
                    .into_iter()
                    .find(|(_, value)| value.trim().is_empty())
                {
                    return Err(DossierError::MissingField(field));
                }
            }
        }
        Ok(())
    }

    /// Set a field by its form name. Returns false for unknown fields.
    pub fn set_field(&mut self, field: &str, value: impl Into<String>) -> bool {
        let slot = match field {
            "name" => &mut self.name,
            "age" => &mut self.age,
            "appearance" => &mut self.appearance,
            "personality" => &mut self.personality,
            "role" => &mut self.role,
            _ => return false,
        };
        *slot = value.into();
        true
    }
}

//! Key personnel of the Volchya Staya.
//!
//! A static catalog shown during the briefing and summarized into the
//! system instruction. Nothing here changes at runtime.

use serde::Serialize;

/// One non-player character in the roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RosterEntry {
    pub name: String,
    pub alias: Option<String>,
    pub role: String,
    pub age: String,
    pub height: String,
    pub description: String,
    pub image_ref: String,
}

impl RosterEntry {
    fn new(name: &str, role: &str, age: &str, height: &str) -> Self {
        Self {
            name: name.to_string(),
            alias: None,
            role: role.to_string(),
            age: age.to_string(),
            height: height.to_string(),
            description: String::new(),
            image_ref: String::new(),
        }
    }

    fn with_alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.to_string());
        self
    }

    fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    fn with_image(mut self, image_ref: &str) -> Self {
        self.image_ref = image_ref.to_string();
        self
    }

    /// `Name "Alias"` when an alias exists, otherwise just the name.
    pub fn display_name(&self) -> String {
        match &self.alias {
            Some(alias) => format!("{} \"{}\"", self.name, alias),
            None => self.name.clone(),
        }
    }
}

/// The whole roster, in briefing order.
pub fn roster() -> &'static [RosterEntry] {
    KEY_PERSONNEL.as_slice()
}

/// Find a roster entry by name or alias, case-insensitively.
///
/// Partial matches on either field are accepted so `"volk"` finds
/// `"Volk"` and `"pakhan"` finds him by his title.
pub fn find_member(query: &str) -> Option<&'static RosterEntry> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return None;
    }
    KEY_PERSONNEL.iter().find(|entry| {
        entry.name.to_lowercase().contains(&query)
            || entry
                .alias
                .as_ref()
                .is_some_and(|alias| alias.to_lowercase().contains(&query))
    })
}

lazy_static::lazy_static! {
    static ref KEY_PERSONNEL: Vec<RosterEntry> = vec![
        RosterEntry::new("Volk", "Supreme leader", "35", "190cm")
            .with_alias("Pakhan")
            .with_description(
                "Ash-grey hair and grey eyes. Born in the slums, became the youngest \
                 Pakhan at 28. A cold ruler who enjoys silence and vodka and despises excuses.",
            )
            .with_image("https://picsum.photos/id/64/400/600"),
        RosterEntry::new("Igor Dmitrievich", "Advisor and strategist", "45", "180cm")
            .with_alias("Sovetnik")
            .with_description(
                "The only man Volk trusts. A cold analyst and a chess master who hides \
                 ruthless logic behind an easygoing smile.",
            )
            .with_image("https://picsum.photos/id/65/400/600"),
        RosterEntry::new("Nikolai Petrovich", "Head of combat", "34", "195cm")
            .with_alias("Vor")
            .with_description(
                "A huge, muscular hound. His scars and tattoos tell his career. Obeys Volk \
                 absolutely and carries out the executions of traitors.",
            )
            .with_image("https://picsum.photos/id/66/400/600"),
        RosterEntry::new("Takamiya Leon", "Leader of a rival organization", "32", "185cm")
            .with_alias("Head of the Black Eagles")
            .with_description(
                "Half Japanese, half Russian. As cold as Volk and crueler still. Locked in \
                 a bitter fight with the Volchya Staya over the arms market.",
            )
            .with_image("https://picsum.photos/id/67/400/600"),
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roster_is_stable() {
        let entries = roster();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].name, "Volk");
        assert!(entries.iter().all(|e| !e.description.is_empty()));
        assert!(std::ptr::eq(roster(), roster()));
    }

    #[test]
    fn test_find_by_name_or_alias() {
        assert_eq!(find_member("volk").map(|e| e.name.as_str()), Some("Volk"));
        assert_eq!(
            find_member("Sovetnik").map(|e| e.name.as_str()),
            Some("Igor Dmitrievich")
        );
        assert_eq!(
            find_member("black eagles").map(|e| e.name.as_str()),
            Some("Takamiya Leon")
        );
        assert!(find_member("Rasputin").is_none());
        assert!(find_member("  ").is_none());
    }

    #[test]
    fn test_display_name() {
        assert_eq!(roster()[0].display_name(), "Volk \"Pakhan\"");
    }
}

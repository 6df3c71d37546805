//! Prompt compiler.
//!
//! Turns a dossier into the system instruction sent with every dispatch.
//! Compilation is pure: the same dossier always yields the same text.

use crate::dossier::Dossier;
use crate::format::{DIALOGUE_TEMPLATE, HEADER_TEMPLATE, MONOLOGUE_TEMPLATE};
use crate::roster::roster;

/// The turn sent when a session is deployed. Not user-authored.
pub const OPENING_TURN: &str = "Start a new session. Describe the first scene in which the \
Pakhan receives the protagonist in his office. Emphasize the cold air, the smell of vodka, \
and the Pakhan's overwhelming presence.";

/// Compile the system instruction for a dossier.
pub fn compile(dossier: &Dossier) -> String {
    let mut prompt = String::new();

    prompt.push_str(include_str!("prompts/world.txt"));

    prompt.push_str("\n## Key Personnel\n");
    for member in roster() {
        prompt.push_str(&format!(
            "- {} ({}, {}, {}): {}\n",
            member.display_name(),
            member.role,
            member.age,
            member.height,
            member.description
        ));
    }

    prompt.push_str("\n## User Profile\n");
    prompt.push_str(&format!("Name: {}\n", dossier.name));
    prompt.push_str(&format!("Age: {}\n", dossier.age));
    prompt.push_str(&format!("Appearance: {}\n", dossier.appearance));
    prompt.push_str(&format!("Personality: {}\n", dossier.personality));
    prompt.push_str(&format!("Role: {}\n", dossier.role));

    prompt.push('\n');
    push_output_rules(&mut prompt);

    prompt.push('\n');
    prompt.push_str(include_str!("prompts/style.txt"));

    prompt.push('\n');
    prompt.push_str(include_str!("prompts/story_goal.txt"));

    prompt.push_str("\n## Starting Mission\n");
    prompt.push_str(&format!(
        "Initialize the narrative once the profile is confirmed. Open the story by placing {} \
         in a high-tension situation inside the Bratva headquarters, in the factory cellar.\n",
        dossier.name
    ));

    prompt
}

fn push_output_rules(prompt: &mut String) {
    prompt.push_str("## Strict Output Rules\n");
    prompt.push_str(
        "1. NEVER write the user's actions, thoughts, or dialogue. The user speaks for themselves.\n",
    );
    prompt.push_str("2. Balance: narration and description 70%, dialogue 30%.\n");
    prompt.push_str(&format!(
        "3. Every turn MUST start with this header on its own line: `{HEADER_TEMPLATE}`\n"
    ));
    prompt.push_str(&format!(
        "4. Dialogue format, one speaker per line: {DIALOGUE_TEMPLATE}\n"
    ));
    prompt.push_str(&format!(
        "5. Internal monologue goes on its own line after dialogue or narration, as {MONOLOGUE_TEMPLATE}\n"
    ));
    prompt.push_str(
        "6. Slow burn: time flows logically. Never skip travel or jump ahead in time.\n",
    );
}

//! Output format contract between the prompt compiler and the parser.
//!
//! The compiler tells the model to emit these markers and the narrative
//! parser recognizes them. Bump [`FORMAT_VERSION`] whenever either side
//! changes what it writes or accepts.

pub const FORMAT_VERSION: u32 = 1;

/// Separator between header fields (U+FF5C FULLWIDTH VERTICAL LINE).
pub const HEADER_SEPARATOR: char = '｜';

/// Leading character of the turn tag, as in `T12`.
pub const TURN_TAG: char = 'T';

/// Optional wrapper around the whole header line.
pub const HEADER_FENCE: char = '`';

/// Separator between speaker and spoken line.
pub const DIALOGUE_SEPARATOR: char = '|';

/// Delimiters that mark a whole line as internal monologue.
pub const MONOLOGUE_DELIMITERS: &[(&str, &str)] = &[("[", "]"), ("*", "*"), ("_", "_")];

/// The header template as shown to the model.
pub const HEADER_TEMPLATE: &str =
    "T<turn>｜YYYY/MM/DD/Weekday｜HH:mm｜Season｜Weather(Emoji)｜Location(Emoji)";

/// The dialogue template as shown to the model.
pub const DIALOGUE_TEMPLATE: &str = "**Name |** \"Russian line\" (translation)";

/// The monologue template as shown to the model.
pub const MONOLOGUE_TEMPLATE: &str = "[inner thought]";

// Schema migrator - additive column changes only
//
// A migration is a list of typed column additions. The remote service gets it
// rendered as one `ADD COLUMN IF NOT EXISTS` script through the SQL executor
// procedure; the local mirror applies it column by column. Nothing here ever
// drops or alters an existing column.

use crate::error::ClientError;

// ============================================================================
// CORE TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Boolean { default: bool },
    Text,
    /// Array of text, defaults to empty
    TextArray,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Sqlite,
}

impl ColumnType {
    /// Type name plus DEFAULT clause, if any
    pub fn definition(&self, dialect: Dialect) -> String {
        match (self, dialect) {
            (ColumnType::Boolean { default }, Dialect::Postgres) => {
                format!("BOOLEAN DEFAULT {}", if *default { "TRUE" } else { "FALSE" })
            }
            (ColumnType::Boolean { default }, Dialect::Sqlite) => {
                format!("BOOLEAN DEFAULT {}", if *default { 1 } else { 0 })
            }
            (ColumnType::Text, _) => "TEXT".to_string(),
            (ColumnType::TextArray, Dialect::Postgres) => "TEXT[] DEFAULT '{}'::TEXT[]".to_string(),
            // SQLite has no arrays; store a JSON array
            (ColumnType::TextArray, Dialect::Sqlite) => "TEXT DEFAULT '[]'".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnAddition {
    pub table: &'static str,
    pub name: &'static str,
    pub column_type: ColumnType,
}

impl ColumnAddition {
    pub const fn new(table: &'static str, name: &'static str, column_type: ColumnType) -> Self {
        ColumnAddition {
            table,
            name,
            column_type,
        }
    }

    /// One statement, terminated with `;`
    pub fn render(&self, dialect: Dialect) -> String {
        let guard = match dialect {
            Dialect::Postgres => "IF NOT EXISTS ",
            Dialect::Sqlite => "",
        };
        format!(
            "ALTER TABLE {} ADD COLUMN {}{} {};",
            self.table,
            guard,
            self.name,
            self.column_type.definition(dialect)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    pub name: &'static str,
    pub columns: Vec<ColumnAddition>,
}

const NO: ColumnType = ColumnType::Boolean { default: false };

/// Shooting-guide and video-brief fields on `campaigns`
const CAMPAIGN_GUIDE_COLUMNS: [ColumnAddition; 19] = [
    ColumnAddition::new("campaigns", "shooting_scenes_ba_photo", NO),
    ColumnAddition::new("campaigns", "shooting_scenes_no_makeup", NO),
    ColumnAddition::new("campaigns", "shooting_scenes_closeup", NO),
    ColumnAddition::new("campaigns", "shooting_scenes_product_closeup", NO),
    ColumnAddition::new("campaigns", "shooting_scenes_product_texture", NO),
    ColumnAddition::new("campaigns", "shooting_scenes_outdoor", NO),
    ColumnAddition::new("campaigns", "shooting_scenes_couple", NO),
    ColumnAddition::new("campaigns", "shooting_scenes_child", NO),
    ColumnAddition::new("campaigns", "shooting_scenes_troubled_skin", NO),
    ColumnAddition::new("campaigns", "shooting_scenes_wrinkles", NO),
    ColumnAddition::new("campaigns", "additional_shooting_requests", ColumnType::Text),
    ColumnAddition::new("campaigns", "meta_ad_code_requested", NO),
    ColumnAddition::new("campaigns", "required_dialogues", ColumnType::TextArray),
    ColumnAddition::new("campaigns", "required_scenes", ColumnType::TextArray),
    ColumnAddition::new("campaigns", "required_hashtags", ColumnType::TextArray),
    ColumnAddition::new("campaigns", "video_duration", ColumnType::Text),
    ColumnAddition::new("campaigns", "video_tempo", ColumnType::Text),
    ColumnAddition::new("campaigns", "video_tone", ColumnType::Text),
    ColumnAddition::new("campaigns", "additional_details", ColumnType::Text),
];

impl Migration {
    pub fn campaign_guide() -> Self {
        Migration {
            name: "campaign_guide_fields",
            columns: CAMPAIGN_GUIDE_COLUMNS.to_vec(),
        }
    }

    /// Whole migration as one script, one statement per line
    pub fn render(&self, dialect: Dialect) -> String {
        let mut script = String::new();
        for column in &self.columns {
            script.push_str(&column.render(dialect));
            script.push('\n');
        }
        script
    }
}

// ============================================================================
// TARGETS
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum MigrationOutcome {
    /// Script handed to the remote executor; its response as returned
    Submitted { response: serde_json::Value },
    /// Applied locally, column by column
    Applied {
        added: Vec<String>,
        already_present: Vec<String>,
    },
}

impl MigrationOutcome {
    pub fn summary(&self) -> String {
        match self {
            MigrationOutcome::Submitted { response } => {
                format!("submitted to remote executor, response: {}", response)
            }
            MigrationOutcome::Applied {
                added,
                already_present,
            } => format!(
                "{} columns added, {} already present",
                added.len(),
                already_present.len()
            ),
        }
    }
}

/// Something a migration can be applied to
pub trait MigrationTarget {
    fn apply(&mut self, migration: &Migration) -> Result<MigrationOutcome, ClientError>;
}

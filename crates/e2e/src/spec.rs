//! Declarative YAML scenario specification

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{E2eError, E2eResult};
use crate::replay::SaveButton;

/// A complete scenario parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSpec {
    /// Unique name for this scenario
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Tags for filtering scenarios
    #[serde(default)]
    pub tags: Vec<String>,

    /// Project the scenario works in
    pub project: ProjectRef,

    /// Record and form used by data-entry steps
    #[serde(default)]
    pub record: Option<RecordRef>,

    /// Steps to execute in order
    pub steps: Vec<ScenarioStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectRef {
    pub pid: u32,

    /// Expected to appear in the project page title
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordRef {
    /// Existing record whose values are replayed
    pub source_record: u32,

    pub event_id: u32,

    /// Display name of the form, e.g. "My First Instrument"
    pub form_name: String,

    #[serde(default = "default_record_id_field")]
    pub record_id_field: String,

    #[serde(default)]
    pub save_button: SaveButton,
}

fn default_record_id_field() -> String {
    "record_id".to_string()
}

/// Where a form is opened from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormSource {
    /// Event grid of a longitudinal project
    #[default]
    Grid,
    Sidebar,
}

/// A single step in a scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScenarioStep {
    /// Open the base URL and check the page title
    LandingPage {
        #[serde(default = "default_landing_title")]
        expected_title: String,
    },

    /// Log in; configured credentials when omitted
    Login {
        #[serde(default)]
        username: Option<String>,
        #[serde(default)]
        password: Option<String>,
    },

    Logout,

    /// Open the project page and check its title
    ProjectPage,

    /// Create a record and check the form page opened
    AddNewRecord,

    /// Open an existing record from a record dropdown
    SelectExistingRecord {
        record: u32,
        #[serde(default = "default_record_select")]
        select_id: String,
    },

    /// Open the scenario's form
    OpenForm {
        #[serde(default)]
        from: FormSource,
    },

    /// Click a link by (partial) text
    ClickLink { text: String },

    /// Replay the source record into the open form and save it
    DataEntry,

    /// Check the audit log for the record created by `data_entry`
    LogEntry {
        #[serde(default)]
        sql_log: String,
        #[serde(default)]
        data_values: String,
        #[serde(default)]
        description: String,
        #[serde(default)]
        change_reason: String,
        #[serde(default = "default_within_secs")]
        within_secs: u64,
    },

    /// Run a single-value query, optionally checking the result
    DbValue {
        query: String,
        #[serde(default)]
        expected: Option<String>,
    },

    /// Log a message (for debugging)
    Log { message: String },
}

fn default_landing_title() -> String {
    "REDCap".to_string()
}

fn default_record_select() -> String {
    "record".to_string()
}

fn default_within_secs() -> u64 {
    60
}

impl ScenarioStep {
    /// Step name used in results
    pub fn name(&self) -> String {
        match self {
            ScenarioStep::LandingPage { .. } => "landing_page".to_string(),
            ScenarioStep::Login { .. } => "login".to_string(),
            ScenarioStep::Logout => "logout".to_string(),
            ScenarioStep::ProjectPage => "project_page".to_string(),
            ScenarioStep::AddNewRecord => "add_new_record".to_string(),
            ScenarioStep::SelectExistingRecord { record, .. } => {
                format!("select_existing_record({})", record)
            }
            ScenarioStep::OpenForm { from } => format!("open_form({:?})", from),
            ScenarioStep::ClickLink { text } => format!("click_link({})", text),
            ScenarioStep::DataEntry => "data_entry".to_string(),
            ScenarioStep::LogEntry { description, .. } => format!("log_entry({})", description),
            ScenarioStep::DbValue { .. } => "db_value".to_string(),
            ScenarioStep::Log { .. } => "log".to_string(),
        }
    }

    /// Whether the step needs the scenario's `record` section
    pub fn needs_record(&self) -> bool {
        matches!(
            self,
            ScenarioStep::AddNewRecord
                | ScenarioStep::OpenForm { .. }
                | ScenarioStep::DataEntry
                | ScenarioStep::LogEntry { .. }
        )
    }
}

impl ScenarioSpec {
    /// Parse a scenario from a YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let spec: Self = serde_yaml::from_str(yaml)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Parse a scenario from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| E2eError::SpecParse(format!("{}: {}", path.display(), e)))
    }

    /// Load all scenarios from a directory, sorted by file path
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        let mut paths: Vec<_> = walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
            .map(|e| e.into_path())
            .collect();
        paths.sort();

        paths.iter().map(|p| Self::from_file(p)).collect()
    }

    /// Filter scenarios by tag
    pub fn filter_by_tag<'a>(specs: &'a [Self], tag: &str) -> Vec<&'a Self> {
        specs.iter().filter(|s| s.tags.iter().any(|t| t == tag)).collect()
    }

    /// Reject scenarios whose steps need a `record` section it lacks
    pub fn validate(&self) -> E2eResult<()> {
        if self.record.is_none() {
            if let Some(step) = self.steps.iter().find(|s| s.needs_record()) {
                return Err(E2eError::SpecParse(format!(
                    "scenario '{}': step {} needs a record section",
                    self.name,
                    step.name()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_data_entry_scenario() {
        let yaml = r#"
name: my-first-instrument
description: Enter record 10 into a new record and check the log
tags:
  - data-entry
  - smoke
project:
  pid: 14
  title: My First Project
record:
  source_record: 10
  event_id: 41
  form_name: My First Instrument
steps:
  - action: landing_page
  - action: login
  - action: project_page
  - action: add_new_record
  - action: data_entry
  - action: log_entry
    description: Create record
  - action: logout
"#;
        let spec = ScenarioSpec::from_yaml(yaml).unwrap();
        assert_eq!(spec.name, "my-first-instrument");
        assert_eq!(spec.steps.len(), 7);

        let record = spec.record.as_ref().unwrap();
        assert_eq!(record.record_id_field, "record_id");
        assert!(record.save_button.is_primary());

        match &spec.steps[0] {
            ScenarioStep::LandingPage { expected_title } => assert_eq!(expected_title, "REDCap"),
            other => panic!("unexpected step {:?}", other),
        }
        match &spec.steps[5] {
            ScenarioStep::LogEntry {
                description,
                within_secs,
                sql_log,
                ..
            } => {
                assert_eq!(description, "Create record");
                assert_eq!(*within_secs, 60);
                assert!(sql_log.is_empty());
            }
            other => panic!("unexpected step {:?}", other),
        }
    }

    #[test]
    fn test_parse_navigation_steps() {
        let yaml = r#"
name: open-existing
project:
  pid: 14
record:
  source_record: 3
  event_id: 41
  form_name: demographics
  save_button: submit-btn-savecontinue
steps:
  - action: select_existing_record
    record: 3
    select_id: record_select1
  - action: open_form
    from: sidebar
  - action: click_link
    text: Record Status Dashboard
  - action: db_value
    query: SELECT value FROM redcap_data WHERE record = '3' AND field_name = 'sex'
    expected: "1"
"#;
        let spec = ScenarioSpec::from_yaml(yaml).unwrap();
        assert_eq!(
            spec.record.unwrap().save_button,
            SaveButton::new("submit-btn-savecontinue")
        );
        assert!(matches!(
            spec.steps[1],
            ScenarioStep::OpenForm {
                from: FormSource::Sidebar
            }
        ));
        assert_eq!(spec.steps[0].name(), "select_existing_record(3)");
    }

    #[test]
    fn test_record_section_required_for_data_entry() {
        let yaml = r#"
name: incomplete
project:
  pid: 14
steps:
  - action: login
  - action: data_entry
"#;
        assert!(matches!(
            ScenarioSpec::from_yaml(yaml),
            Err(E2eError::SpecParse(_))
        ));
    }
}

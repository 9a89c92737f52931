//! Form replay
//!
//! Replays a stored record's values into the data-entry form that is open
//! in the browser, then saves it. The walk over the page goes through the
//! [`FormSurface`] trait; the per-element decision is the pure [`plan`]
//! function, so the traversal rules can be exercised without a browser.
//!
//! Traversal order per `td.data` cell: selects, then textareas, then
//! inputs. A cell containing the chosen save control ends the walk: the
//! control is activated, a follow-up "leave record" dialog is dismissed if
//! it appears, and replay stops. Exactly one submission happens per replay.

mod live;

pub use live::LiveForm;

use async_trait::async_trait;
use rcsel_common::FieldMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{E2eError, E2eResult};

/// Suffix REDCap appends to radio input names
pub const RADIO_SUFFIX: &str = "___radio";

/// Marker in checkbox input names (`__chkn__<field>`)
pub const CHECKBOX_MARKER: &str = "__chkn__";

/// Class of read-only placeholder text inputs
pub const PLACEHOLDER_CLASS: &str = "frmrd0";

/// Id of the default "Save & Exit Form" button
pub const PRIMARY_SAVE_BUTTON: &str = "submit-btn-saverecord";

/// Form controls the replayer can fill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Text,
    Textarea,
    Select,
    Radio,
    Checkbox,
}

impl ElementKind {
    /// Kind of an `<input>` from its `type` attribute. Buttons, hidden
    /// inputs and the like are not fillable.
    pub fn from_input_type(input_type: &str) -> Option<Self> {
        match input_type.trim().to_ascii_lowercase().as_str() {
            "" | "text" | "email" | "number" | "tel" | "url" | "date" | "datetime-local"
            | "time" => Some(ElementKind::Text),
            "radio" => Some(ElementKind::Radio),
            "checkbox" => Some(ElementKind::Checkbox),
            _ => None,
        }
    }

    /// Field name under which the stored values are looked up
    pub fn lookup_name(self, name: &str) -> String {
        match self {
            ElementKind::Radio => name.replace(RADIO_SUFFIX, ""),
            ElementKind::Checkbox => name.replace(CHECKBOX_MARKER, ""),
            _ => name.to_string(),
        }
    }
}

/// Element groups visited in each cell, in visiting order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlTag {
    Select,
    Textarea,
    Input,
}

impl ControlTag {
    pub const ORDER: [ControlTag; 3] = [ControlTag::Select, ControlTag::Textarea, ControlTag::Input];

    pub fn css(self) -> &'static str {
        match self {
            ControlTag::Select => "select",
            ControlTag::Textarea => "textarea",
            ControlTag::Input => "input",
        }
    }
}

/// What the replayer needs to know about one form control
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormElementDescriptor {
    pub name: String,
    pub kind: ElementKind,
    /// `value` attribute (radio code)
    pub value: String,
    /// `code` attribute (checkbox code)
    pub code: String,
    pub class: String,
    /// Option values of a select, in document order
    pub options: Vec<String>,
    /// Displayed and enabled
    pub interactable: bool,
}

impl FormElementDescriptor {
    pub fn new(name: impl Into<String>, kind: ElementKind) -> Self {
        Self {
            name: name.into(),
            kind,
            value: String::new(),
            code: String::new(),
            class: String::new(),
            options: Vec::new(),
            interactable: true,
        }
    }

    pub fn lookup_name(&self) -> String {
        self.kind.lookup_name(&self.name)
    }

    fn has_class(&self, class: &str) -> bool {
        self.class.split_whitespace().any(|c| c == class)
    }
}

/// Interaction applied to one control
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayAction {
    /// Type into a text input or textarea
    TypeText(String),
    /// Choose the option with this value
    SelectOption(String),
    /// Click a radio button or checkbox
    Click,
}

/// Decide what to do with one control given the stored values
pub fn plan(element: &FormElementDescriptor, fields: &FieldMap) -> Option<ReplayAction> {
    if !element.interactable {
        return None;
    }
    let values = fields.get(&element.lookup_name())?;

    match element.kind {
        ElementKind::Select => element
            .options
            .iter()
            .find(|option| values.iter().any(|v| v == *option))
            .map(|option| ReplayAction::SelectOption(option.clone())),
        ElementKind::Textarea => values.first().cloned().map(ReplayAction::TypeText),
        ElementKind::Text => {
            if element.has_class(PLACEHOLDER_CLASS) {
                return None;
            }
            values
                .iter()
                .find(|v| !v.is_empty())
                .cloned()
                .map(ReplayAction::TypeText)
        }
        ElementKind::Radio => values
            .iter()
            .any(|v| *v == element.value)
            .then_some(ReplayAction::Click),
        ElementKind::Checkbox => values
            .iter()
            .any(|v| *v == element.code)
            .then_some(ReplayAction::Click),
    }
}

/// Save control ending a replay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SaveButton(String);

impl SaveButton {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }

    /// The default save button sits outside the save-options dropdown
    pub fn is_primary(&self) -> bool {
        self.0 == PRIMARY_SAVE_BUTTON
    }
}

impl Default for SaveButton {
    fn default() -> Self {
        Self(PRIMARY_SAVE_BUTTON.to_string())
    }
}

impl std::fmt::Display for SaveButton {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A data-entry form the replayer can walk
#[async_trait]
pub trait FormSurface: Send + Sync {
    type Cell: Send + Sync;
    type Control: Send + Sync;

    /// Text of the record-id row for `record_field`
    async fn record_number(&self, record_field: &str) -> E2eResult<String>;

    /// Unhide selects that an autocomplete widget replaced
    async fn reveal_hidden_selects(&self) -> E2eResult<()>;

    /// `td.data` cells in document order
    async fn data_cells(&self) -> E2eResult<Vec<Self::Cell>>;

    /// Controls of one group inside a cell
    async fn controls(&self, cell: &Self::Cell, tag: ControlTag) -> E2eResult<Vec<Self::Control>>;

    /// `None` for controls the replayer does not fill
    async fn describe(
        &self,
        tag: ControlTag,
        control: &Self::Control,
    ) -> E2eResult<Option<FormElementDescriptor>>;

    async fn perform(&self, control: &Self::Control, action: &ReplayAction) -> E2eResult<()>;

    /// Activate `button` if this cell holds it. Returns whether it did.
    async fn submit_from(&self, cell: &Self::Cell, button: &SaveButton) -> E2eResult<bool>;

    /// Dismiss the "leave record" dialog if it shows up after saving
    async fn dismiss_confirmation(&self) -> E2eResult<()>;
}

/// One applied interaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedAction {
    pub field: String,
    pub action: ReplayAction,
}

/// Result of a replay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayReport {
    /// Record number shown on the form before it was filled
    pub record_number: u32,
    pub cells_visited: usize,
    pub actions: Vec<AppliedAction>,
}

/// Replays stored values into a form and saves it
#[derive(Debug, Clone, Default)]
pub struct FormReplayer {
    record_field: Option<String>,
    save_button: SaveButton,
}

impl FormReplayer {
    pub fn new(record_field: impl Into<String>, save_button: SaveButton) -> Self {
        Self {
            record_field: Some(record_field.into()),
            save_button,
        }
    }

    pub fn record_field(&self) -> &str {
        self.record_field.as_deref().unwrap_or("record_id")
    }

    pub fn save_button(&self) -> &SaveButton {
        &self.save_button
    }

    /// Fill the open form from `fields` and save it
    pub async fn replay<S: FormSurface>(
        &self,
        surface: &S,
        fields: &FieldMap,
    ) -> E2eResult<ReplayReport> {
        let raw = surface.record_number(self.record_field()).await?;
        let record_number = raw.trim().parse::<u32>().map_err(|_| {
            E2eError::AssertionFailed(format!("record number {:?} is not numeric", raw))
        })?;
        debug!("Form shows record #{}", record_number);

        surface.reveal_hidden_selects().await?;

        let mut report = ReplayReport {
            record_number,
            cells_visited: 0,
            actions: Vec::new(),
        };

        for cell in surface.data_cells().await? {
            report.cells_visited += 1;

            for tag in ControlTag::ORDER {
                for control in surface.controls(&cell, tag).await? {
                    let Some(element) = surface.describe(tag, &control).await? else {
                        continue;
                    };
                    if let Some(action) = plan(&element, fields) {
                        debug!("{:?} <- {:?}", element.name, action);
                        surface.perform(&control, &action).await?;
                        report.actions.push(AppliedAction {
                            field: element.name,
                            action,
                        });
                    }
                }
            }

            if surface.submit_from(&cell, &self.save_button).await? {
                surface.dismiss_confirmation().await?;
                info!(
                    "Saved record #{} with {} ({} fields set)",
                    record_number,
                    self.save_button,
                    report.actions.len()
                );
                return Ok(report);
            }
        }

        Err(E2eError::SubmitControlNotFound(
            self.save_button.id().to_string(),
        ))
    }
}

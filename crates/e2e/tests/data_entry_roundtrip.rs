use async_trait::async_trait;
use rcsel_common::{record, LogEntry, LogQuery, LogTimestamp, LogVerifier, RecordScope, SqliteStore};
use rcsel_e2e::replay::{
    ControlTag, ElementKind, FormElementDescriptor, FormReplayer, FormSurface, ReplayAction,
    SaveButton, PRIMARY_SAVE_BUTTON,
};
use rcsel_e2e::E2eResult;
use std::sync::Mutex;

/// A one-cell-per-field form backed by plain values. Performing an action
/// stores what the browser would hold afterwards.
struct RecordedForm {
    record_number: String,
    controls: Vec<FormElementDescriptor>,
    state: Mutex<Vec<Option<String>>>,
    submits: Mutex<u32>,
}

impl RecordedForm {
    fn new(record_number: &str, controls: Vec<FormElementDescriptor>) -> Self {
        let state = Mutex::new(vec![None; controls.len()]);
        Self {
            record_number: record_number.to_string(),
            controls,
            state,
            submits: Mutex::new(0),
        }
    }

    fn value_of(&self, name: &str, value: &str) -> Option<String> {
        let index = self
            .controls
            .iter()
            .position(|c| c.name == name && (c.value.is_empty() || c.value == value))?;
        self.state.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl FormSurface for RecordedForm {
    type Cell = usize;
    type Control = usize;

    async fn record_number(&self, _record_field: &str) -> E2eResult<String> {
        Ok(self.record_number.clone())
    }

    async fn reveal_hidden_selects(&self) -> E2eResult<()> {
        Ok(())
    }

    async fn data_cells(&self) -> E2eResult<Vec<usize>> {
        // One extra cell for the save buttons
        Ok((0..=self.controls.len()).collect())
    }

    async fn controls(&self, cell: &usize, tag: ControlTag) -> E2eResult<Vec<usize>> {
        let Some(control) = self.controls.get(*cell) else {
            return Ok(vec![]);
        };
        let control_tag = match control.kind {
            ElementKind::Select => ControlTag::Select,
            ElementKind::Textarea => ControlTag::Textarea,
            _ => ControlTag::Input,
        };
        Ok(if control_tag == tag { vec![*cell] } else { vec![] })
    }

    async fn describe(
        &self,
        _tag: ControlTag,
        control: &usize,
    ) -> E2eResult<Option<FormElementDescriptor>> {
        Ok(self.controls.get(*control).cloned())
    }

    async fn perform(&self, control: &usize, action: &ReplayAction) -> E2eResult<()> {
        let value = match action {
            ReplayAction::TypeText(text) => text.clone(),
            ReplayAction::SelectOption(value) => value.clone(),
            ReplayAction::Click => "checked".to_string(),
        };
        self.state.lock().unwrap()[*control] = Some(value);
        Ok(())
    }

    async fn submit_from(&self, cell: &usize, button: &SaveButton) -> E2eResult<bool> {
        if *cell == self.controls.len() && button.id() == PRIMARY_SAVE_BUTTON {
            *self.submits.lock().unwrap() += 1;
            return Ok(true);
        }
        Ok(false)
    }

    async fn dismiss_confirmation(&self) -> E2eResult<()> {
        Ok(())
    }
}

fn radio(value: &str) -> FormElementDescriptor {
    let mut e = FormElementDescriptor::new("sex___radio", ElementKind::Radio);
    e.value = value.to_string();
    e
}

fn checkbox(code: &str) -> FormElementDescriptor {
    let mut e = FormElementDescriptor::new("__chkn__symptoms", ElementKind::Checkbox);
    e.code = code.to_string();
    e
}

/// Data-Entry Round Trip
///
/// Loads record 10 from a snapshot of the REDCap tables, replays it into a
/// new record's form, then finds the "Create record" audit entry REDCap
/// would have written for record 11.
#[tokio::test]
async fn record_is_replayed_and_its_log_entry_found() {
    let store = SqliteStore::open_memory().unwrap();
    let source = RecordScope::new(14, 10, 41).unwrap();
    store.insert_field(&source, "record_id", Some("11")).unwrap();
    store.insert_field(&source, "sex", Some("1")).unwrap();
    store.insert_field(&source, "symptoms", Some("2")).unwrap();
    store.insert_field(&source, "symptoms", Some("4")).unwrap();
    store.insert_field(&source, "comments", None).unwrap();

    let fields = record::load(&store, &source).await;
    assert_eq!(fields.first("record_id"), Some("11"));
    assert!(!fields.contains("comments"));

    let mut weight = FormElementDescriptor::new("weight", ElementKind::Text);
    weight.class = "x-form-text".to_string();
    let form = RecordedForm::new(
        "11",
        vec![
            FormElementDescriptor::new("record_id", ElementKind::Text),
            radio("0"),
            radio("1"),
            checkbox("1"),
            checkbox("2"),
            checkbox("4"),
            weight,
            FormElementDescriptor::new("comments", ElementKind::Textarea),
        ],
    );

    let report = FormReplayer::default().replay(&form, &fields).await.unwrap();
    let entered_at = LogTimestamp::now();

    assert_eq!(report.record_number, 11);
    assert_eq!(form.value_of("record_id", ""), Some("11".to_string()));
    assert_eq!(form.value_of("sex___radio", "1"), Some("checked".to_string()));
    assert_eq!(form.value_of("sex___radio", "0"), None);
    assert_eq!(*form.submits.lock().unwrap(), 1);
    assert_eq!(form.value_of("weight", ""), None);
    assert_eq!(form.value_of("comments", ""), None);
    let checked: Vec<&str> = form
        .controls
        .iter()
        .enumerate()
        .filter(|(i, c)| c.kind == ElementKind::Checkbox && form.state.lock().unwrap()[*i].is_some())
        .map(|(_, c)| c.code.as_str())
        .collect();
    assert_eq!(checked, vec!["2", "4"]);

    // What REDCap writes when the new record is saved
    store
        .insert_log_event(
            14,
            41,
            &LogEntry {
                log_event_id: 0,
                ts: Some(entered_at.as_i64()),
                pk: Some(report.record_number.to_string()),
                sql_log: "INSERT INTO redcap_data VALUES (14, 41, '11', 'record_id', '11')"
                    .to_string(),
                data_values: "record_id = '11',\nsex = '1'".to_string(),
                description: "Create record".to_string(),
                change_reason: String::new(),
            },
        )
        .unwrap();

    let query = LogQuery::new(14, report.record_number, 41, entered_at)
        .with_description("Create record");
    let verifier = LogVerifier::default();
    assert!(verifier.find_recent(&store, &query).await.is_some());

    // Same record, checked two minutes later
    let late = LogQuery::new(14, report.record_number, 41, entered_at.offset_secs(120))
        .with_description("Create record");
    assert_eq!(verifier.find_recent(&store, &late).await, None);
}

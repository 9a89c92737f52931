//! [`FormSurface`] over a live browser page

use async_trait::async_trait;
use chromiumoxide::element::Element;

use super::{ControlTag, ElementKind, FormElementDescriptor, FormSurface, ReplayAction, SaveButton};
use crate::browser::{self, BrowserSession, Locator, WaitCondition};
use crate::config::TimeoutConfig;
use crate::error::{E2eError, E2eResult};
use crate::navigation::{Navigator, DIALOG_BUTTONS, LEAVE_RECORD_TEXT, SAVE_DROPDOWN_ID};

/// Script unhiding selects replaced by REDCap's autocomplete widget
const REVEAL_AUTOCOMPLETE: &str = "if (window.jQuery) { \
        jQuery('select.rc-autocomplete').css('display', 'block'); \
    } \
    return true;";

/// The data-entry form open in a browser session
pub struct LiveForm<'a> {
    browser: &'a BrowserSession,
    navigator: Navigator<'a>,
    timeouts: &'a TimeoutConfig,
}

impl<'a> LiveForm<'a> {
    pub fn new(
        browser: &'a BrowserSession,
        navigator: Navigator<'a>,
        timeouts: &'a TimeoutConfig,
    ) -> Self {
        Self {
            browser,
            navigator,
            timeouts,
        }
    }
}

#[async_trait]
impl FormSurface for LiveForm<'_> {
    type Cell = Element;
    type Control = Element;

    async fn record_number(&self, record_field: &str) -> E2eResult<String> {
        let locator = Locator::xpath(format!(
            "//tr[@id={}]/td[contains(@class,'data')]",
            browser::xpath_literal(&format!("{}-tr", record_field))
        ));
        let cell = self
            .browser
            .wait_for(&locator, WaitCondition::Present, self.timeouts.default_wait())
            .await?;
        browser::text(&cell).await
    }

    async fn reveal_hidden_selects(&self) -> E2eResult<()> {
        self.browser.execute(REVEAL_AUTOCOMPLETE).await?;
        Ok(())
    }

    async fn data_cells(&self) -> E2eResult<Vec<Element>> {
        self.browser.find_all(&Locator::css("td.data")).await
    }

    async fn controls(&self, cell: &Element, tag: ControlTag) -> E2eResult<Vec<Element>> {
        Ok(cell.find_elements(tag.css()).await?)
    }

    async fn describe(
        &self,
        tag: ControlTag,
        control: &Element,
    ) -> E2eResult<Option<FormElementDescriptor>> {
        let kind = match tag {
            ControlTag::Select => ElementKind::Select,
            ControlTag::Textarea => ElementKind::Textarea,
            ControlTag::Input => {
                match ElementKind::from_input_type(&browser::attribute(control, "type").await?) {
                    Some(kind) => kind,
                    None => return Ok(None),
                }
            }
        };
        let name = browser::attribute(control, "name").await?;
        if name.is_empty() {
            return Ok(None);
        }

        let mut element = FormElementDescriptor::new(name, kind);
        element.interactable = browser::is_interactable(control).await?;
        match kind {
            ElementKind::Select => element.options = browser::option_values(control).await?,
            ElementKind::Radio => element.value = browser::attribute(control, "value").await?,
            ElementKind::Checkbox => element.code = browser::attribute(control, "code").await?,
            ElementKind::Text => element.class = browser::attribute(control, "class").await?,
            ElementKind::Textarea => {}
        }
        Ok(Some(element))
    }

    async fn perform(&self, control: &Element, action: &ReplayAction) -> E2eResult<()> {
        match action {
            ReplayAction::TypeText(text) => {
                control.focus().await?.type_str(text).await?;
            }
            ReplayAction::SelectOption(value) => {
                if !browser::select_by_value(control, value).await? {
                    return Err(E2eError::ElementNotFound(format!("option {:?}", value)));
                }
            }
            ReplayAction::Click => {
                control.click().await?;
            }
        }
        Ok(())
    }

    async fn submit_from(&self, cell: &Element, button: &SaveButton) -> E2eResult<bool> {
        if !button.is_primary() {
            let toggles = cell
                .find_elements(format!("button#{}", SAVE_DROPDOWN_ID))
                .await?;
            if toggles.is_empty() {
                return Ok(false);
            }
            self.navigator.select_save_button(button.id()).await?;
            return Ok(true);
        }

        let buttons = cell.find_elements("button").await?;
        for candidate in &buttons {
            if browser::attribute(candidate, "id").await? == button.id()
                && browser::is_interactable(candidate).await?
            {
                candidate.click().await?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn dismiss_confirmation(&self) -> E2eResult<()> {
        self.navigator
            .handle_popup(DIALOG_BUTTONS, LEAVE_RECORD_TEXT)
            .await?;
        Ok(())
    }
}

//! REDCap navigation: login, project selection and opening data-entry forms

use tracing::{debug, info};

use crate::browser::{self, xpath_literal, BrowserSession, Locator, WaitCondition};
use crate::config::{RedcapConfig, TimeoutConfig};
use crate::error::{E2eError, E2eResult};

/// Buttons of jQuery UI dialogs
pub const DIALOG_BUTTONS: &str = "div.ui-dialog-buttonset button.ui-button";

/// Dialog action that discards further edits after a save
pub const LEAVE_RECORD_TEXT: &str = "Ignore and leave record";

/// Sidebar link to the record status dashboard
pub const ADD_EDIT_RECORDS: &str = "Add / Edit Records";

/// Toggle of the save-options dropdown under a form
pub const SAVE_DROPDOWN_ID: &str = "submit-btn-dropdown";

/// `page=` URL fragment REDCap uses for a form's display name
pub fn expected_form_page(form_name: &str) -> String {
    format!("page={}", form_name.to_lowercase().replace(' ', "_"))
}

/// Clicks through REDCap pages on one browser session
pub struct Navigator<'a> {
    browser: &'a BrowserSession,
    redcap: &'a RedcapConfig,
    timeouts: &'a TimeoutConfig,
}

impl<'a> Navigator<'a> {
    pub fn new(
        browser: &'a BrowserSession,
        redcap: &'a RedcapConfig,
        timeouts: &'a TimeoutConfig,
    ) -> Self {
        Self {
            browser,
            redcap,
            timeouts,
        }
    }

    /// Load the base URL and wait until the browser lands there
    pub async fn open_landing_page(&self) -> E2eResult<()> {
        self.browser.goto(&self.redcap.base_url).await?;
        self.browser
            .wait_for_url(&self.redcap.base_url, self.timeouts.short_wait())
            .await?;
        Ok(())
    }

    /// Log in with the configured default account
    pub async fn login_default(&self) -> E2eResult<()> {
        self.login(&self.redcap.username, &self.redcap.password)
            .await
    }

    /// Fill and submit the login form
    pub async fn login(&self, username: &str, password: &str) -> E2eResult<()> {
        let wait = self.timeouts.default_wait();
        self.browser
            .wait_for(&Locator::id("username"), WaitCondition::Clickable, wait)
            .await?
            .click()
            .await?
            .type_str(username)
            .await?;
        self.browser
            .wait_for(&Locator::id("password"), WaitCondition::Clickable, wait)
            .await?
            .click()
            .await?
            .type_str(password)
            .await?;
        self.browser
            .wait_for(&Locator::id("login_btn"), WaitCondition::Clickable, wait)
            .await?
            .click()
            .await?;
        info!("Submitted login for {}", username);
        Ok(())
    }

    /// Wait for the "Log out" link, which only a signed-in page shows
    pub async fn wait_for_logout_link(&self) -> E2eResult<()> {
        self.browser
            .wait_for(
                &Locator::LinkText("Log out".to_string()),
                WaitCondition::Clickable,
                self.timeouts.short_wait(),
            )
            .await?;
        Ok(())
    }

    pub async fn logout(&self) -> E2eResult<()> {
        self.click_link("Log out").await
    }

    /// Click the first clickable link whose text contains `partial_text`
    pub async fn click_link(&self, partial_text: &str) -> E2eResult<()> {
        self.browser
            .wait_for(
                &Locator::partial_link_text(partial_text),
                WaitCondition::Clickable,
                self.timeouts.default_wait(),
            )
            .await?
            .click()
            .await?;
        debug!("Clicked link {:?}", partial_text);
        Ok(())
    }

    /// Open a project's setup page
    pub async fn load_project_page(&self, pid: u32) -> E2eResult<()> {
        let url = self.redcap.project_page_url(pid);
        self.browser.goto(&url).await?;
        let fragment = format!("{}/ProjectSetup/index.php?pid={}", self.redcap.version, pid);
        self.browser
            .wait_for_url(&fragment, self.timeouts.short_wait())
            .await?;
        Ok(())
    }

    /// Create a record and land on its first form (or event grid)
    pub async fn select_add_new_record(&self) -> E2eResult<()> {
        self.click_link(ADD_EDIT_RECORDS).await?;

        self.browser
            .wait_for(
                &Locator::xpath("//button[contains(.,'Add new record')]"),
                WaitCondition::Clickable,
                self.timeouts.default_wait(),
            )
            .await?
            .click()
            .await?;

        // Longitudinal projects land on the event grid, others on the form;
        // both carry the record id in the URL.
        self.browser
            .wait_for_url("id=", self.timeouts.short_wait())
            .await?;
        Ok(())
    }

    /// Open an existing record from one of the record dropdowns
    ///
    /// `select_id` is `record` when every record is complete, otherwise
    /// `record_select1` (incomplete), `record_select2` (unverified) or
    /// `record_select3` (complete).
    pub async fn select_existing_record(&self, record: u32, select_id: &str) -> E2eResult<()> {
        self.click_link(ADD_EDIT_RECORDS).await?;

        let dropdown = self
            .browser
            .wait_for(
                &Locator::id(select_id),
                WaitCondition::Present,
                self.timeouts.default_wait(),
            )
            .await?;
        if !browser::select_by_value(&dropdown, &record.to_string()).await? {
            return Err(E2eError::ElementNotFound(format!(
                "record {} in #{}",
                record, select_id
            )));
        }
        Ok(())
    }

    /// Open a form from the event grid by its label. Expects the grid page.
    pub async fn select_form_from_grid(&self, form_name: &str) -> E2eResult<()> {
        let xpath = format!(
            "//*[@id='event_grid_table']/tbody/tr/td[text()={}]/following-sibling::td/a/img",
            xpath_literal(form_name)
        );
        self.browser
            .wait_for(
                &Locator::XPath(xpath),
                WaitCondition::Present,
                self.timeouts.default_wait(),
            )
            .await?
            .click()
            .await?;
        Ok(())
    }

    /// Open a form from the sidebar list
    pub async fn select_form_from_sidebar(&self, form_name: &str) -> E2eResult<()> {
        self.browser
            .wait_for(
                &Locator::id(format!("form[{}]", form_name)),
                WaitCondition::Present,
                self.timeouts.default_wait(),
            )
            .await?
            .click()
            .await?;
        Ok(())
    }

    /// Click a save button, opening the save-options dropdown when the
    /// button is not promoted to the primary position
    pub async fn select_save_button(&self, button_id: &str) -> E2eResult<()> {
        let primary = self
            .browser
            .find_all(&Locator::css(format!("button#{}", button_id)))
            .await?;
        if let Some(button) = primary.first() {
            button.click().await?;
            return Ok(());
        }

        self.browser
            .wait_for(
                &Locator::id(SAVE_DROPDOWN_ID),
                WaitCondition::Present,
                self.timeouts.default_wait(),
            )
            .await?
            .click()
            .await?;
        self.browser
            .wait_for(
                &Locator::css(format!("a#{}", button_id)),
                WaitCondition::Clickable,
                self.timeouts.default_wait(),
            )
            .await?
            .click()
            .await?;
        Ok(())
    }

    /// If a dialog shows a button labelled `button_text` within the popup
    /// wait, click it. Returns whether a button was clicked.
    pub async fn handle_popup(&self, button_selector: &str, button_text: &str) -> E2eResult<bool> {
        let buttons = match self
            .browser
            .wait_for_all(&Locator::css(button_selector), self.timeouts.popup_wait())
            .await
        {
            Ok(buttons) => buttons,
            Err(E2eError::Timeout(_)) => {
                debug!("No popup button found with text={}", button_text);
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        for button in &buttons {
            if browser::text(button).await? == button_text {
                // Present before it becomes clickable
                self.browser
                    .wait_until_clickable(button, self.timeouts.popup_click())
                    .await?;
                button.click().await?;
                debug!("Clicked popup button {:?}", button_text);
                return Ok(true);
            }
        }
        debug!("No popup button found with text={}", button_text);
        Ok(false)
    }
}

//! Test session: one browser plus the shared store connection

use std::sync::Arc;

use rcsel_common::{record, LogQuery, LogVerifier, RecordScope, RedcapStore};
use tracing::info;

use crate::browser::BrowserSession;
use crate::config::SuiteConfig;
use crate::error::E2eResult;
use crate::navigation::Navigator;
use crate::replay::{FormReplayer, LiveForm, ReplayReport};

/// Browser and database handles for one scenario
///
/// The browser belongs to the session; the store is shared across
/// sessions and closed by whoever opened it.
pub struct Session {
    browser: BrowserSession,
    store: Arc<dyn RedcapStore>,
    config: SuiteConfig,
}

impl Session {
    /// Launch a browser for a new session
    pub async fn open(config: SuiteConfig, store: Arc<dyn RedcapStore>) -> E2eResult<Self> {
        let browser = BrowserSession::launch(&config.browser).await?;
        Ok(Self {
            browser,
            store,
            config,
        })
    }

    pub fn browser(&self) -> &BrowserSession {
        &self.browser
    }

    pub fn store(&self) -> &dyn RedcapStore {
        self.store.as_ref()
    }

    pub fn config(&self) -> &SuiteConfig {
        &self.config
    }

    pub fn navigator(&self) -> Navigator<'_> {
        Navigator::new(&self.browser, &self.config.redcap, &self.config.timeouts)
    }

    /// Copy the values of `source` into the form open in the browser and
    /// save it. The form must already be open.
    pub async fn enter_form(
        &self,
        source: &RecordScope,
        replayer: &FormReplayer,
    ) -> E2eResult<ReplayReport> {
        let fields = record::load(self.store(), source).await;
        info!("Loaded {} fields from {}", fields.len(), source);

        let form = LiveForm::new(&self.browser, self.navigator(), &self.config.timeouts);
        replayer.replay(&form, &fields).await
    }

    /// Id of a recent audit-log entry matching `query`
    pub async fn check_recent_log_entry(&self, query: &LogQuery) -> Option<i64> {
        LogVerifier::new(self.config.database.log_scan_limit)
            .find_recent(self.store(), query)
            .await
    }

    /// Close the browser. The store stays open.
    pub async fn close(self) {
        self.browser.close().await;
    }
}

//! rcsel E2E Test Framework
//!
//! Drives a real browser through REDCap data entry and cross-checks the
//! results against the REDCap database:
//! - Probes the REDCap instance and opens the database store
//! - Controls Chrome over the DevTools Protocol
//! - Replays a stored record's values into a new record's form
//! - Verifies the resulting audit-log entry
//! - Parses declarative YAML scenarios
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Scenario Runner (Rust)                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestRunner                                                 │
//! │    ├── start() -> AppProbe + Arc<dyn RedcapStore>           │
//! │    ├── run_spec(spec) -> TestResult                         │
//! │    │     └── Session { BrowserSession, store }              │
//! │    │           ├── Navigator (login, project, forms)        │
//! │    │           ├── enter_form -> FormReplayer + LiveForm    │
//! │    │           └── check_recent_log_entry -> LogVerifier    │
//! │    └── write_results() -> test-results.json                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ScenarioSpec (YAML)                                        │
//! │    ├── name, description, tags                              │
//! │    ├── project { pid, title }                               │
//! │    ├── record { source_record, event_id, form_name, ... }   │
//! │    └── steps: [ScenarioStep]                                │
//! │          ├── landing_page, login, logout, project_page      │
//! │          ├── add_new_record, select_existing_record         │
//! │          ├── open_form, click_link                          │
//! │          ├── data_entry, log_entry, db_value                │
//! │          └── log { message }                                │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod browser;
pub mod config;
pub mod error;
pub mod navigation;
pub mod probe;
pub mod replay;
pub mod runner;
pub mod session;
pub mod spec;

pub use config::SuiteConfig;
pub use error::{E2eError, E2eResult};
pub use runner::TestRunner;
pub use session::Session;
pub use spec::{ScenarioSpec, ScenarioStep};

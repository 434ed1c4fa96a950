//! # sheetlabel
//!
//! Writes a table to an XLSX workbook and stamps a sensitivity label on it.
//!
//! The spreadsheet side comes from [`sheetlabel_table`]; labeling goes
//! through any [`ClassificationClient`](sheetlabel_mip::ClassificationClient),
//! either the HTTP-backed [`GraphClient`](sheetlabel_mip::GraphClient) or the
//! in-memory [`FakeClient`](sheetlabel_mip::FakeClient).
//!
//! ## Example
//!
//! ```rust,no_run
//! use sheetlabel::{sample, Config, Workflow};
//! use sheetlabel_mip::GraphClient;
//! use sheetlabel_table::XlsxTableWriter;
//!
//! let mut config = Config::load("sheetlabel.toml").unwrap();
//! config.apply_env();
//!
//! let mut client = GraphClient::new(config.endpoints.to_graph_endpoints()).unwrap();
//! let workflow = Workflow::new(config);
//! let table = sample::employees().unwrap();
//! let report = workflow
//!     .run(&table, &XlsxTableWriter::default(), &mut client, &mut std::io::stdout())
//!     .unwrap();
//! println!("{}", report.label_name);
//! ```

pub mod config;
pub mod error;
pub mod report;
pub mod sample;
pub mod session;
pub mod workflow;

pub use config::{Config, ConfigError, ConfigResult};
pub use error::{WorkflowError, WorkflowResult};
pub use report::RunReport;
pub use session::Session;
pub use workflow::Workflow;

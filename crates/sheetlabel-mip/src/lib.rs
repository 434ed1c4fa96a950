//! # sheetlabel-mip
//!
//! Client side of sensitivity labeling: authenticate an application, load a
//! profile, add a per-user engine with its label catalog, then stamp a label
//! on an Office Open XML file.
//!
//! [`ClassificationClient`] is the capability the workflow drives. Two
//! implementations ship with the crate:
//!
//! - [`GraphClient`] talks to the identity platform and the label service
//!   over HTTP and writes label metadata into the package.
//! - [`FakeClient`] keeps everything in memory, for tests.
//!
//! ## Sequence
//!
//! ```text
//! initialize → application_info → authenticate → load_profile → add_engine
//!   → open_file_handler → resolve_label → set_label → commit → shutdown
//! ```
//!
//! A file handler moves `HandlerOpen → LabelPending → Committed`; see
//! [`FileState`].

pub mod client;
pub mod context;
pub mod engine;
pub mod error;
pub mod fake;
pub mod graph;
pub mod handler;
pub mod metadata;
pub mod profile;

pub use client::ClassificationClient;
pub use context::{ApplicationInfo, ClientSecret, ComponentScope, Credential, Identity, MipContext};
pub use engine::{Engine, EngineSettings, Label, ParentRef};
pub use error::{MipError, MipResult};
pub use fake::{FakeClient, FakeCommit, Operation};
pub use graph::{GraphClient, GraphEndpoints};
pub use handler::{
    AssignmentMethod, CommitOutcome, FileHandler, FileState, LabelingOptions, PendingLabel,
    ProtectionSettings,
};
pub use metadata::LabelMetadata;
pub use profile::{AcceptAllConsent, CacheStorageType, Consent, ConsentDelegate, Profile, ProfileSettings};

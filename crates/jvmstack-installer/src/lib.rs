mod artifact;
mod backup;
mod environment;
mod error;
mod fs_utils;
mod inspect;
mod layout;
mod lifecycle;
mod orchestrator;
mod record;
mod service;
mod transactions;
mod types;

pub use artifact::{
    extract_archive, payload_root, ArchiveFetcher, ArtifactFetcher, Downloader,
};
pub use backup::BackupStore;
pub use environment::{BindingOutcome, EnvironmentVariableManager};
pub use error::{LifecycleError, LifecycleResult};
pub use inspect::InstalledStateInspector;
pub use layout::HostLayout;
pub use lifecycle::{Capabilities, ComponentLifecycleManager};
pub use orchestrator::{ComponentScope, UpgradeOrchestrator};
pub use record::{clear_previous_versions, read_previous_versions, write_previous_versions};
pub use service::{Chown, Ownership, ServiceControl, ServiceUnitManager, Systemctl};
pub use transactions::{read_transaction_journal, read_transaction_metadata, OperationJournal};
pub use types::{
    Backup, ComponentState, ComponentStatus, DeclarationStyle, EnvironmentTarget,
    InstalledComponent, OperationReport, PreviousVersionsRecord, ServiceDependencies,
    ServiceUnit, TransactionJournalEntry, TransactionMetadata, Transition, UninstallResult,
    UninstallStatus,
};

#[cfg(test)]
mod tests;

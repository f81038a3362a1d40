use super::*;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::anyhow;
use jvmstack_core::{Component, DesiredState, DesiredStateSource, HostConfig, Version};
use std::cell::RefCell;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::environment::declares;

type FetchHook = Box<dyn Fn()>;

struct FakeFetcher {
    failing: RefCell<HashSet<String>>,
    fetched: RefCell<Vec<String>>,
    hooks: RefCell<Vec<(String, FetchHook)>>,
}

impl FakeFetcher {
    fn new() -> Self {
        Self {
            failing: RefCell::new(HashSet::new()),
            fetched: RefCell::new(Vec::new()),
            hooks: RefCell::new(Vec::new()),
        }
    }

    /// Runs `hook` while `url` is being fetched.
    fn during(&self, url: &str, hook: impl Fn() + 'static) {
        self.hooks
            .borrow_mut()
            .push((url.to_string(), Box::new(hook)));
    }

    fn fail(&self, url: &str) {
        self.failing.borrow_mut().insert(url.to_string());
    }

    fn fetch_count(&self) -> usize {
        self.fetched.borrow().len()
    }
}

impl ArtifactFetcher for FakeFetcher {
    fn fetch(&self, url: &str, staging_dir: &Path) -> anyhow::Result<PathBuf> {
        self.fetched.borrow_mut().push(url.to_string());
        for (hooked, hook) in self.hooks.borrow().iter() {
            if hooked == url {
                hook();
            }
        }
        if self.failing.borrow().contains(url) {
            return Err(anyhow!("connection reset while downloading {url}"));
        }
        let payload = staging_dir.join("raw").join("payload");
        fs::create_dir_all(payload.join("bin"))?;
        fs::write(payload.join("VERSION"), url)?;
        fs::write(payload.join("bin").join("launcher"), "#!/bin/sh\n")?;
        Ok(payload)
    }
}

#[derive(Default)]
struct FakeServices {
    calls: RefCell<Vec<String>>,
    failing_restarts: RefCell<HashSet<String>>,
}

impl FakeServices {
    fn fail_restart(&self, unit: &str) {
        self.failing_restarts.borrow_mut().insert(unit.to_string());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn record(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }
}

impl ServiceControl for FakeServices {
    fn daemon_reload(&self) -> anyhow::Result<()> {
        self.record("daemon-reload".to_string());
        Ok(())
    }

    fn enable(&self, unit: &str) -> anyhow::Result<()> {
        self.record(format!("enable {unit}"));
        Ok(())
    }

    fn disable(&self, unit: &str) -> anyhow::Result<()> {
        self.record(format!("disable {unit}"));
        Ok(())
    }

    fn restart(&self, unit: &str) -> anyhow::Result<()> {
        self.record(format!("restart {unit}"));
        if self.failing_restarts.borrow().contains(unit) {
            return Err(anyhow!("Job for {unit} failed"));
        }
        Ok(())
    }

    fn stop(&self, unit: &str) -> anyhow::Result<()> {
        self.record(format!("stop {unit}"));
        Ok(())
    }
}

#[derive(Default)]
struct RecordingOwnership {
    calls: RefCell<Vec<(PathBuf, String)>>,
}

impl Ownership for RecordingOwnership {
    fn hand_over(&self, path: &Path, user: &str) -> anyhow::Result<()> {
        self.calls
            .borrow_mut()
            .push((path.to_path_buf(), user.to_string()));
        Ok(())
    }
}

struct StaticDesired(DesiredState);

impl DesiredStateSource for StaticDesired {
    fn load(&self) -> anyhow::Result<DesiredState> {
        Ok(self.0.clone())
    }

    fn describe(&self) -> String {
        "static test descriptor".to_string()
    }
}

struct BrokenDesired;

impl DesiredStateSource for BrokenDesired {
    fn load(&self) -> anyhow::Result<DesiredState> {
        Err(anyhow!("descriptor is missing"))
    }

    fn describe(&self) -> String {
        "broken test descriptor".to_string()
    }
}

struct TestHost {
    root: PathBuf,
    layout: HostLayout,
    fetcher: FakeFetcher,
    services: FakeServices,
    ownership: RecordingOwnership,
}

impl TestHost {
    fn new() -> Self {
        Self::with_config(|_| {})
    }

    fn with_config(adjust: impl FnOnce(&mut HostConfig)) -> Self {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system time")
            .as_nanos();
        let root = build_test_root_path(nanos);
        let mut config = test_config(&root);
        adjust(&mut config);
        fs::create_dir_all(root.join("home")).expect("must create home");
        fs::write(root.join("home/.bashrc"), "alias ll='ls -l'\n").expect("must write bashrc");
        Self {
            root,
            layout: HostLayout::new(config),
            fetcher: FakeFetcher::new(),
            services: FakeServices::default(),
            ownership: RecordingOwnership::default(),
        }
    }

    fn caps(&self) -> Capabilities<'_> {
        Capabilities {
            fetcher: &self.fetcher,
            services: &self.services,
            ownership: &self.ownership,
        }
    }

    fn manager(&self, component: Component) -> ComponentLifecycleManager<'_> {
        ComponentLifecycleManager::new(component, &self.layout, self.caps())
    }

    fn install(&self, component: Component, version: &str) -> InstalledComponent {
        self.manager(component)
            .install(&v(version), &url_for(component, version))
            .expect("must install")
    }

    fn upgrade(
        &self,
        component: Component,
        version: &str,
    ) -> LifecycleResult<InstalledComponent> {
        self.manager(component)
            .upgrade(&v(version), &url_for(component, version))
    }

    fn orchestrator<'a>(&'a self, source: &'a dyn DesiredStateSource) -> UpgradeOrchestrator<'a> {
        UpgradeOrchestrator::new(&self.layout, self.caps(), source)
    }

    fn current(&self, component: Component) -> Option<Version> {
        InstalledStateInspector::new(&self.layout)
            .current_version(component)
            .expect("must inspect")
    }

    fn backup_names(&self, component: Component) -> Vec<String> {
        let dir = self.layout.backup_dir(component);
        let mut names = match fs::read_dir(&dir) {
            Ok(entries) => entries
                .map(|entry| {
                    entry
                        .expect("must read entry")
                        .file_name()
                        .to_string_lossy()
                        .to_string()
                })
                .collect::<Vec<_>>(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }

    fn unit_versions(&self) -> Vec<String> {
        ServiceUnitManager::new(&self.layout, &self.services)
            .installed_versions()
            .expect("must list units")
    }

    fn unit_content(&self, version: &str) -> String {
        fs::read_to_string(self.layout.unit_path(Component::AppServer, version))
            .expect("must read unit file")
    }

    fn env_declarations(&self, path: &Path, name: &str) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap_or_default()
            .lines()
            .filter(|line| declares(line, name))
            .map(str::to_string)
            .collect()
    }

    fn transaction_statuses(&self) -> Vec<String> {
        let dir = self.layout.transactions_dir();
        let Ok(entries) = fs::read_dir(&dir) else {
            return Vec::new();
        };
        let mut statuses = Vec::new();
        for entry in entries {
            let path = entry.expect("must read entry").path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let txid = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .expect("must have txid stem");
            let metadata = read_transaction_metadata(&self.layout, txid)
                .expect("must read metadata")
                .expect("metadata must exist");
            statuses.push(metadata.status);
        }
        statuses
    }

    fn journal_steps(&self, operation: &str) -> Vec<String> {
        let dir = self.layout.transactions_dir();
        let Ok(entries) = fs::read_dir(&dir) else {
            return Vec::new();
        };
        let mut steps = Vec::new();
        for entry in entries {
            let path = entry.expect("must read entry").path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let txid = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .expect("must have txid stem");
            let metadata = read_transaction_metadata(&self.layout, txid)
                .expect("must read metadata")
                .expect("metadata must exist");
            if metadata.operation != operation {
                continue;
            }
            steps.extend(
                read_transaction_journal(&self.layout, txid)
                    .expect("must read journal")
                    .into_iter()
                    .map(|entry| entry.step),
            );
        }
        steps
    }
}

impl Drop for TestHost {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.root);
    }
}

static TEST_ROOT_COUNTER: AtomicU64 = AtomicU64::new(0);

fn build_test_root_path(nanos: u128) -> PathBuf {
    let mut path = std::env::temp_dir();
    let sequence = TEST_ROOT_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.push(format!(
        "jvmstack-installer-tests-{}-{}-{}",
        std::process::id(),
        nanos,
        sequence
    ));
    path
}

fn test_config(root: &Path) -> HostConfig {
    HostConfig {
        java_root: root.join("opt/java"),
        tomcat_root: root.join("opt/tomcat"),
        backup_root: root.join("opt/backup"),
        state_dir: root.join("var/lib/jvmstack"),
        unit_dir: root.join("etc/systemd/system"),
        environment_file: root.join("etc/environment"),
        shell_files: vec![root.join("home/.bashrc"), root.join("home/.zshrc")],
        service_user: None,
        desired_state: root.join("desired.json").display().to_string(),
        download_timeout_secs: 5,
    }
}

fn v(raw: &str) -> Version {
    Version::parse(raw).expect("must parse version")
}

fn url_for(component: Component, version: &str) -> String {
    match component {
        Component::Java => {
            format!("https://downloads.example.test/jdk-{version}_linux-x64_bin.tar.gz")
        }
        Component::AppServer => {
            format!("https://downloads.example.test/apache-tomcat-{version}.tar.gz")
        }
    }
}

fn desired(java: &str, tomcat: &str) -> StaticDesired {
    StaticDesired(DesiredState {
        java_version: v(java),
        java_artifact_url: url_for(Component::Java, java),
        tomcat_version: v(tomcat),
        tomcat_artifact_url: url_for(Component::AppServer, tomcat),
    })
}

fn snapshot(root: &Path) -> Vec<(PathBuf, Vec<u8>)> {
    let mut out = Vec::new();
    collect_snapshot(root, &mut out);
    out.sort();
    out
}

fn collect_snapshot(dir: &Path, out: &mut Vec<(PathBuf, Vec<u8>)>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries {
        let path = entry.expect("must read entry").path();
        if path.is_dir() {
            out.push((path.clone(), Vec::new()));
            collect_snapshot(&path, out);
        } else {
            let bytes = fs::read(&path).expect("must read file");
            out.push((path, bytes));
        }
    }
}

#[test]
fn build_test_root_path_disambiguates_same_timestamp_calls() {
    let first = build_test_root_path(42);
    let second = build_test_root_path(42);
    assert_ne!(first, second);
}

#[test]
fn install_places_component_without_backup() {
    let host = TestHost::new();
    let mut java = host.manager(Component::Java);
    assert_eq!(java.state(), &ComponentState::Absent);

    let installed = java
        .install(&v("17.0.2"), &url_for(Component::Java, "17.0.2"))
        .expect("must install");

    assert_eq!(java.state(), &ComponentState::Installed(v("17.0.2")));
    assert_eq!(
        installed.install_path,
        host.root.join("opt/java/jdk-17.0.2")
    );
    assert_eq!(host.current(Component::Java), Some(v("17.0.2")));
    assert!(host.backup_names(Component::Java).is_empty());
    assert_eq!(
        fs::read_to_string(installed.install_path.join("VERSION")).expect("must read marker"),
        url_for(Component::Java, "17.0.2")
    );
}

#[test]
fn install_binds_home_variable_in_every_present_target() {
    let host = TestHost::new();
    let installed = host.install(Component::Java, "17.0.2");
    let expected_home = installed.install_path.display().to_string();

    let system = host.env_declarations(&host.root.join("etc/environment"), "JAVA_HOME");
    assert_eq!(system, vec![format!("JAVA_HOME=\"{expected_home}\"")]);

    let bashrc = host.env_declarations(&host.root.join("home/.bashrc"), "JAVA_HOME");
    assert_eq!(bashrc, vec![format!("export JAVA_HOME=\"{expected_home}\"")]);
    let bashrc_raw = fs::read_to_string(host.root.join("home/.bashrc")).expect("must read");
    assert!(bashrc_raw.contains("alias ll='ls -l'"));

    assert!(
        !host.root.join("home/.zshrc").exists(),
        "missing optional shell files must not be created"
    );
}

#[test]
fn install_app_server_renders_unit_against_installed_runtime() {
    let host = TestHost::new();
    let java = host.install(Component::Java, "17.0.2");
    let tomcat = host.install(Component::AppServer, "10.1.19");

    assert_eq!(host.unit_versions(), vec!["10.1.19".to_string()]);
    let unit = host.unit_content("10.1.19");
    assert!(unit.contains(&format!(
        "Environment=\"JAVA_HOME={}\"",
        java.install_path.display()
    )));
    assert!(unit.contains(&format!(
        "ExecStart={}/bin/startup.sh",
        tomcat.install_path.display()
    )));
    assert!(!unit.contains("User="));

    let calls = host.services.calls();
    assert!(calls.contains(&"enable tomcat-10.1.19.service".to_string()));
    assert!(calls.contains(&"restart tomcat-10.1.19.service".to_string()));
}

#[test]
fn install_app_server_hands_ownership_to_service_user() {
    let host = TestHost::with_config(|config| config.service_user = Some("tomcat".to_string()));
    host.install(Component::Java, "17.0.2");
    let tomcat = host.install(Component::AppServer, "10.1.19");

    let calls = host.ownership.calls.borrow().clone();
    assert_eq!(calls, vec![(tomcat.install_path, "tomcat".to_string())]);
    let unit = host.unit_content("10.1.19");
    assert!(unit.contains("User=tomcat\n"));
    assert!(unit.contains("Group=tomcat\n"));
}

#[test]
fn install_app_server_without_runtime_fails() {
    let host = TestHost::new();
    let err = host
        .manager(Component::AppServer)
        .install(&v("10.1.19"), &url_for(Component::AppServer, "10.1.19"))
        .expect_err("must fail without a runtime");

    assert!(matches!(
        err,
        LifecycleError::Install {
            component: Component::AppServer,
            ..
        }
    ));
    assert_eq!(host.fetcher.fetch_count(), 0);
    assert_eq!(host.current(Component::AppServer), None);
}

#[test]
fn install_fetch_failure_is_reported_as_fetch_error() {
    let host = TestHost::new();
    host.fetcher.fail(&url_for(Component::Java, "17.0.2"));
    let err = host
        .manager(Component::Java)
        .install(&v("17.0.2"), &url_for(Component::Java, "17.0.2"))
        .expect_err("must fail");

    match err {
        LifecycleError::Fetch { component, url, .. } => {
            assert_eq!(component, Component::Java);
            assert_eq!(url, url_for(Component::Java, "17.0.2"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn upgrade_keeps_single_install_and_previous_backup() {
    let host = TestHost::new();
    host.install(Component::Java, "17.0.2");

    let mut java = host.manager(Component::Java);
    java.upgrade(&v("21.0.1"), &url_for(Component::Java, "21.0.1"))
        .expect("must upgrade");

    assert_eq!(java.state(), &ComponentState::Installed(v("21.0.1")));
    assert_eq!(
        InstalledStateInspector::new(&host.layout)
            .candidates(Component::Java)
            .len(),
        1
    );
    assert_eq!(host.current(Component::Java), Some(v("21.0.1")));
    assert_eq!(host.backup_names(Component::Java), vec!["jdk-17.0.2"]);
    assert_eq!(
        host.env_declarations(&host.root.join("etc/environment"), "JAVA_HOME"),
        vec![format!(
            "JAVA_HOME=\"{}\"",
            host.root.join("opt/java/jdk-21.0.1").display()
        )]
    );
}

#[test]
fn upgrade_app_server_leaves_only_new_unit() {
    let host = TestHost::new();
    host.install(Component::Java, "17.0.2");
    host.install(Component::AppServer, "10.1.19");

    host.upgrade(Component::AppServer, "10.1.20")
        .expect("must upgrade");

    assert_eq!(host.unit_versions(), vec!["10.1.20".to_string()]);
    assert_eq!(host.current(Component::AppServer), Some(v("10.1.20")));
    assert_eq!(
        host.backup_names(Component::AppServer),
        vec!["apache-tomcat-10.1.19"]
    );

    let calls = host.services.calls();
    let restart = calls
        .iter()
        .position(|call| call == "restart tomcat-10.1.20.service")
        .expect("new unit must restart");
    let disable_old = calls
        .iter()
        .position(|call| call == "disable tomcat-10.1.19.service")
        .expect("old unit must be disabled");
    assert!(restart < disable_old, "old unit must be pruned after activation");
}

#[test]
fn repeated_upgrades_retain_only_latest_backup() {
    let host = TestHost::new();
    host.install(Component::Java, "17.0.1");
    host.upgrade(Component::Java, "17.0.2").expect("must upgrade");
    host.upgrade(Component::Java, "17.0.3").expect("must upgrade");

    assert_eq!(host.current(Component::Java), Some(v("17.0.3")));
    assert_eq!(host.backup_names(Component::Java), vec!["jdk-17.0.2"]);
}

#[test]
fn upgrade_to_installed_version_returns_immediately() {
    let host = TestHost::new();
    host.install(Component::Java, "17.0.2");
    let fetches = host.fetcher.fetch_count();

    let installed = host.upgrade(Component::Java, "17.0.2").expect("must succeed");

    assert_eq!(installed.version, v("17.0.2"));
    assert_eq!(host.fetcher.fetch_count(), fetches);
    assert!(host.backup_names(Component::Java).is_empty());
}

#[test]
fn upgrade_requires_installed_component() {
    let host = TestHost::new();
    let err = host
        .upgrade(Component::Java, "21.0.1")
        .expect_err("must refuse");
    assert!(matches!(
        err,
        LifecycleError::NotInstalled {
            component: Component::Java
        }
    ));
}

#[test]
fn upgrade_fetch_failure_self_heals_previous_version() {
    let host = TestHost::new();
    host.install(Component::Java, "17.0.2");
    host.fetcher.fail(&url_for(Component::Java, "21.0.1"));

    let mut java = host.manager(Component::Java);
    let err = java
        .upgrade(&v("21.0.1"), &url_for(Component::Java, "21.0.1"))
        .expect_err("must fail");

    assert!(matches!(err, LifecycleError::Fetch { .. }));
    assert_eq!(java.state(), &ComponentState::Installed(v("17.0.2")));
    assert_eq!(host.current(Component::Java), Some(v("17.0.2")));
    let restored = host.root.join("opt/java/jdk-17.0.2");
    assert_eq!(
        fs::read_to_string(restored.join("VERSION")).expect("must read marker"),
        url_for(Component::Java, "17.0.2")
    );
    assert!(!host.root.join("opt/java/jdk-21.0.1").exists());
    assert_eq!(
        host.env_declarations(&host.root.join("home/.bashrc"), "JAVA_HOME"),
        vec![format!("export JAVA_HOME=\"{}\"", restored.display())]
    );
}

#[test]
fn upgrade_self_heal_failure_keeps_original_cause() {
    let host = TestHost::new();
    host.install(Component::Java, "17.0.2");
    let target_url = url_for(Component::Java, "21.0.1");
    host.fetcher.fail(&target_url);
    let backup_path = host.layout.backup_path(Component::Java, "17.0.2");
    host.fetcher.during(&target_url, move || {
        fs::remove_dir_all(&backup_path).expect("must drop backup");
    });

    let mut java = host.manager(Component::Java);
    let err = java
        .upgrade(&v("21.0.1"), &target_url)
        .expect_err("must fail");

    match &err {
        LifecycleError::SelfHealFailed {
            component, cause, ..
        } => {
            assert_eq!(component, &Component::Java);
            assert!(matches!(
                **cause,
                LifecycleError::Fetch {
                    component: Component::Java,
                    ..
                }
            ));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(java.state(), &ComponentState::Upgrading);
    assert!(err.to_string().contains("connection reset"));
}

#[test]
fn upgrade_activation_failure_self_heals_previous_unit() {
    let host = TestHost::new();
    host.install(Component::Java, "17.0.2");
    host.install(Component::AppServer, "10.1.19");
    host.services.fail_restart("tomcat-10.1.20.service");

    let err = host
        .upgrade(Component::AppServer, "10.1.20")
        .expect_err("must fail");

    match &err {
        LifecycleError::ServiceActivation { unit, .. } => {
            assert_eq!(unit, "tomcat-10.1.20.service");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(host.current(Component::AppServer), Some(v("10.1.19")));
    assert!(!host.root.join("opt/tomcat/apache-tomcat-10.1.20").exists());
    assert_eq!(host.unit_versions(), vec!["10.1.19".to_string()]);
    let calls = host.services.calls();
    assert_eq!(
        calls.last().map(String::as_str),
        Some("restart tomcat-10.1.19.service")
    );
    let failed_start = calls
        .iter()
        .position(|call| call == "restart tomcat-10.1.20.service")
        .expect("must have attempted the new unit");
    let after_failure = &calls[failed_start + 1..];
    assert!(after_failure.contains(&"stop tomcat-10.1.20.service".to_string()));
    assert!(after_failure.contains(&"disable tomcat-10.1.20.service".to_string()));
    assert!(!host
        .root
        .join("etc/systemd/system/tomcat-10.1.20.service")
        .exists());
}

#[test]
fn upgrade_backup_failure_leaves_install_untouched() {
    let host = TestHost::new();
    host.install(Component::Java, "17.0.2");
    fs::create_dir_all(host.root.join("opt")).expect("must create opt");
    fs::write(host.root.join("opt/backup"), "not a directory").expect("must block backup root");

    let mut java = host.manager(Component::Java);
    let err = java
        .upgrade(&v("21.0.1"), &url_for(Component::Java, "21.0.1"))
        .expect_err("must fail");

    assert!(matches!(
        err,
        LifecycleError::Backup {
            component: Component::Java,
            ..
        }
    ));
    assert_eq!(java.state(), &ComponentState::Installed(v("17.0.2")));
    assert_eq!(host.current(Component::Java), Some(v("17.0.2")));
    assert_eq!(host.fetcher.fetch_count(), 1);
}

#[test]
fn rollback_restores_backup_and_keeps_it() {
    let host = TestHost::new();
    host.install(Component::Java, "17.0.2");
    host.upgrade(Component::Java, "21.0.1").expect("must upgrade");

    let mut java = host.manager(Component::Java);
    let restored = java.rollback().expect("must roll back");

    assert_eq!(restored.version, v("17.0.2"));
    assert_eq!(java.state(), &ComponentState::RolledBack(v("17.0.2")));
    assert_eq!(host.current(Component::Java), Some(v("17.0.2")));
    assert_eq!(host.backup_names(Component::Java), vec!["jdk-17.0.2"]);
    assert_eq!(
        host.env_declarations(&host.root.join("etc/environment"), "JAVA_HOME"),
        vec![format!("JAVA_HOME=\"{}\"", restored.install_path.display())]
    );
}

#[test]
fn rollback_app_server_reactivates_restored_unit() {
    let host = TestHost::new();
    host.install(Component::Java, "17.0.2");
    host.install(Component::AppServer, "10.1.19");
    host.upgrade(Component::AppServer, "10.1.20")
        .expect("must upgrade");

    host.manager(Component::AppServer)
        .rollback()
        .expect("must roll back");

    assert_eq!(host.current(Component::AppServer), Some(v("10.1.19")));
    assert_eq!(host.unit_versions(), vec!["10.1.19".to_string()]);
    let calls = host.services.calls();
    assert!(calls.contains(&"stop tomcat-10.1.20.service".to_string()));
    assert_eq!(
        calls.iter().filter(|call| *call == "restart tomcat-10.1.19.service").count(),
        2
    );
}

#[test]
fn rollback_without_backup_reports_last_known_good_hint() {
    let host = TestHost::new();
    host.install(Component::Java, "21.0.1");
    write_previous_versions(
        &host.layout,
        &PreviousVersionsRecord {
            java: v("17.0.2"),
            tomcat: v("10.1.19"),
        },
    )
    .expect("must write record");

    let mut java = host.manager(Component::Java);
    let err = java.rollback().expect_err("must fail");

    match &err {
        LifecycleError::NoBackup { component, hint } => {
            assert_eq!(*component, Component::Java);
            assert_eq!(hint.as_ref(), Some(&v("17.0.2")));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("17.0.2"));
    assert_eq!(java.state(), &ComponentState::Installed(v("21.0.1")));
    assert_eq!(host.current(Component::Java), Some(v("21.0.1")));
}

#[test]
fn uninstall_twice_is_idempotent() {
    let host = TestHost::new();
    host.install(Component::Java, "17.0.2");
    host.install(Component::AppServer, "10.1.19");
    host.upgrade(Component::AppServer, "10.1.20")
        .expect("must upgrade");

    let mut tomcat = host.manager(Component::AppServer);
    let first = tomcat.uninstall().expect("must uninstall");
    assert_eq!(first.status, UninstallStatus::Uninstalled);
    assert_eq!(first.version, Some(v("10.1.20")));
    assert_eq!(tomcat.state(), &ComponentState::Removed);

    let second = host
        .manager(Component::AppServer)
        .uninstall()
        .expect("second uninstall must succeed");
    assert_eq!(second.status, UninstallStatus::NotInstalled);

    assert_eq!(host.current(Component::AppServer), None);
    assert!(host.unit_versions().is_empty());
    assert!(host.backup_names(Component::AppServer).is_empty());
    assert!(host
        .env_declarations(&host.root.join("etc/environment"), "CATALINA_HOME")
        .is_empty());
    assert_eq!(host.current(Component::Java), Some(v("17.0.2")));
}

#[test]
fn inspector_rejects_multiple_install_candidates() {
    let host = TestHost::new();
    fs::create_dir_all(host.root.join("opt/java/jdk-17.0.2")).expect("must create");
    fs::create_dir_all(host.root.join("opt/java/jdk-21.0.1")).expect("must create");
    fs::create_dir_all(host.root.join("opt/java/unrelated")).expect("must create");

    let err = InstalledStateInspector::new(&host.layout)
        .current(Component::Java)
        .expect_err("must detect conflict");
    match err {
        LifecycleError::InconsistentState { candidates, .. } => assert_eq!(candidates.len(), 2),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn inspector_treats_missing_root_as_absent() {
    let host = TestHost::new();
    assert_eq!(host.current(Component::AppServer), None);
}

#[test]
fn environment_binding_converges_to_one_declaration() {
    let host = TestHost::new();
    let path = host.root.join("home/.profile");
    fs::write(
        &path,
        "export PATH=\"$PATH:/usr/local/bin\"\nexport JAVA_HOME=/usr/lib/jvm/default\n  JAVA_HOME=/old\nJAVA_HOME_EXTRA=1\n",
    )
    .expect("must seed profile");
    let target = EnvironmentTarget {
        path: path.clone(),
        style: DeclarationStyle::Export,
        required: false,
    };
    let env = EnvironmentVariableManager;

    for _ in 0..3 {
        env.set_binding(&target, "JAVA_HOME", "/opt/java/jdk-17.0.2")
            .expect("must bind");
    }

    let raw = fs::read_to_string(&path).expect("must read");
    assert_eq!(
        raw,
        "export PATH=\"$PATH:/usr/local/bin\"\nJAVA_HOME_EXTRA=1\nexport JAVA_HOME=\"/opt/java/jdk-17.0.2\"\n"
    );

    assert!(env.remove_binding(&target, "JAVA_HOME").expect("must remove"));
    assert!(!env.remove_binding(&target, "JAVA_HOME").expect("must no-op"));
}

#[test]
fn environment_binding_creates_required_and_skips_optional_files() {
    let host = TestHost::new();
    let env = EnvironmentVariableManager;
    let required = EnvironmentTarget {
        path: host.root.join("etc/environment"),
        style: DeclarationStyle::Plain,
        required: true,
    };
    let optional = EnvironmentTarget {
        path: host.root.join("home/.zshrc"),
        style: DeclarationStyle::Export,
        required: false,
    };

    assert_eq!(
        env.set_binding(&required, "CATALINA_HOME", "/opt/tomcat/apache-tomcat-10.1.19")
            .expect("must bind"),
        BindingOutcome::Written
    );
    assert_eq!(
        env.set_binding(&optional, "CATALINA_HOME", "/opt/tomcat/apache-tomcat-10.1.19")
            .expect("must skip"),
        BindingOutcome::SkippedMissingOptional
    );
    assert_eq!(
        fs::read_to_string(&required.path).expect("must read"),
        "CATALINA_HOME=\"/opt/tomcat/apache-tomcat-10.1.19\"\n"
    );
    assert!(!optional.path.exists());
}

#[test]
fn declaration_matching_ignores_prefix_collisions() {
    assert!(declares("JAVA_HOME=/x", "JAVA_HOME"));
    assert!(declares("  export JAVA_HOME = /x", "JAVA_HOME"));
    assert!(!declares("JAVA_HOME_EXTRA=/x", "JAVA_HOME"));
    assert!(!declares("# JAVA_HOME=/x", "JAVA_HOME"));
    assert!(!declares("exportJAVA_HOME=/x", "JAVA_HOME"));
}

#[test]
fn backup_restore_refuses_existing_destination() {
    let host = TestHost::new();
    let installed = host.install(Component::Java, "17.0.2");
    let store = BackupStore::new(&host.layout);
    let backup = store
        .retain(Component::Java, &installed.install_path)
        .expect("must retain");

    assert_eq!(backup.version, v("17.0.2"));
    let err = store
        .restore(&backup, &installed.install_path)
        .expect_err("must refuse overwrite");
    assert!(err.to_string().contains("already exists"));
    assert_eq!(store.discard(Component::Java).expect("must discard"), 1);
    assert!(store.latest(Component::Java).expect("must read").is_none());
}

#[test]
fn backup_retain_rejects_unconventional_source_name() {
    let host = TestHost::new();
    let source = host.root.join("opt/java/openjdk");
    fs::create_dir_all(&source).expect("must create");
    let err = BackupStore::new(&host.layout)
        .retain(Component::Java, &source)
        .expect_err("must reject");
    assert!(err.to_string().contains("jdk-<version>"));
}

#[test]
fn payload_root_unwraps_single_top_level_directory() {
    let host = TestHost::new();
    let raw = host.root.join("raw");
    fs::create_dir_all(raw.join("jdk-17.0.2/bin")).expect("must create");
    assert_eq!(
        payload_root(&raw).expect("must resolve"),
        raw.join("jdk-17.0.2")
    );

    fs::write(raw.join("README"), "hi").expect("must write");
    assert_eq!(payload_root(&raw).expect("must resolve"), raw);

    let empty = host.root.join("empty");
    fs::create_dir_all(&empty).expect("must create");
    assert!(payload_root(&empty).is_err());
}

#[test]
fn service_unit_render_binds_runtime_and_install_paths() {
    let host = TestHost::new();
    let units = ServiceUnitManager::new(&host.layout, &host.services);
    let unit = units.render(
        &v("10.1.19"),
        &ServiceDependencies {
            runtime_home: PathBuf::from("/opt/java/jdk-17.0.2"),
            service_user: Some("tomcat".to_string()),
        },
    );
    let install = host.root.join("opt/tomcat/apache-tomcat-10.1.19");

    assert_eq!(
        unit.unit_path,
        host.root.join("etc/systemd/system/tomcat-10.1.19.service")
    );
    assert!(unit.content.starts_with("[Unit]\nDescription=Apache Tomcat 10.1.19\n"));
    assert!(unit
        .content
        .contains("Environment=\"JAVA_HOME=/opt/java/jdk-17.0.2\"\n"));
    assert!(unit.content.contains(&format!(
        "Environment=\"CATALINA_PID={}/temp/tomcat.pid\"\n",
        install.display()
    )));
    assert!(unit.content.contains("Type=forking\n"));
    assert!(unit.content.ends_with("WantedBy=multi-user.target\n"));
}

#[test]
fn service_activation_requires_unit_file() {
    let host = TestHost::new();
    let units = ServiceUnitManager::new(&host.layout, &host.services);
    let err = units.activate(&v("10.1.19")).expect_err("must fail");
    assert!(err.to_string().contains("tomcat-10.1.19.service"));
    assert!(host.services.calls().is_empty());
}

#[test]
fn previous_versions_record_round_trip() {
    let host = TestHost::new();
    assert!(read_previous_versions(&host.layout)
        .expect("must read")
        .is_none());

    let record = PreviousVersionsRecord {
        java: v("17.0.2"),
        tomcat: v("10.1.19"),
    };
    let path = write_previous_versions(&host.layout, &record).expect("must write");
    let raw = fs::read_to_string(&path).expect("must read raw");
    assert!(raw.contains("\"java\": \"17.0.2\""));
    assert!(raw.contains("\"tomcat\": \"10.1.19\""));
    assert_eq!(
        read_previous_versions(&host.layout).expect("must read"),
        Some(record)
    );
    assert!(clear_previous_versions(&host.layout).expect("must clear"));
    assert!(!clear_previous_versions(&host.layout).expect("must no-op"));
}

#[test]
fn operation_journal_holds_marker_until_finished() {
    let host = TestHost::new();
    host.layout.ensure_base_dirs().expect("must create dirs");

    let mut journal = OperationJournal::begin(&host.layout, "upgrade").expect("must begin");
    let txid = journal.txid().to_string();
    assert!(OperationJournal::begin(&host.layout, "upgrade").is_err());
    assert_eq!(
        OperationJournal::active_txid(&host.layout).expect("must read"),
        Some(txid.clone())
    );

    journal
        .record("upgrade:java", "done", Some("/opt/java/jdk-21.0.1".to_string()))
        .expect("must record");
    journal.finish("committed").expect("must finish");

    assert_eq!(OperationJournal::active_txid(&host.layout).expect("must read"), None);
    let entries = read_transaction_journal(&host.layout, &txid).expect("must read journal");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].seq, 1);
    assert_eq!(entries[0].step, "upgrade:java");
    let metadata = read_transaction_metadata(&host.layout, &txid)
        .expect("must read")
        .expect("must exist");
    assert_eq!(metadata.status, "committed");
    assert_eq!(metadata.operation, "upgrade");
}

#[test]
fn orchestrator_install_then_upgrade_records_previous_pair() {
    let host = TestHost::new();
    let initial = desired("17.0.2", "10.1.19");
    let report = host
        .orchestrator(&initial)
        .install()
        .expect("must install");
    assert_eq!(report.java, Transition::Installed(v("17.0.2")));
    assert_eq!(report.tomcat, Transition::Installed(v("10.1.19")));

    let target = desired("21.0.1", "10.1.20");
    let report = host.orchestrator(&target).run().expect("must upgrade");

    assert_eq!(
        report.java,
        Transition::Upgraded {
            from: v("17.0.2"),
            to: v("21.0.1")
        }
    );
    assert_eq!(
        report.tomcat,
        Transition::Upgraded {
            from: v("10.1.19"),
            to: v("10.1.20")
        }
    );
    assert_eq!(host.current(Component::Java), Some(v("21.0.1")));
    assert_eq!(host.current(Component::AppServer), Some(v("10.1.20")));
    assert_eq!(host.unit_versions(), vec!["10.1.20".to_string()]);
    assert!(host.unit_content("10.1.20").contains(&format!(
        "JAVA_HOME={}",
        host.root.join("opt/java/jdk-21.0.1").display()
    )));
    assert_eq!(
        read_previous_versions(&host.layout).expect("must read"),
        Some(PreviousVersionsRecord {
            java: v("17.0.2"),
            tomcat: v("10.1.19"),
        })
    );
    assert_eq!(OperationJournal::active_txid(&host.layout).expect("must read"), None);
    let statuses = host.transaction_statuses();
    assert_eq!(statuses.len(), 2);
    assert!(statuses.iter().all(|status| status == "committed"));
}

#[test]
fn orchestrator_no_op_makes_no_mutations() {
    let host = TestHost::new();
    let state = desired("17.0.2", "10.1.19");
    host.orchestrator(&state).install().expect("must install");
    let before = snapshot(&host.root);
    let fetches = host.fetcher.fetch_count();
    let calls = host.services.calls().len();

    let err = host.orchestrator(&state).run().expect_err("must be no-op");

    assert!(err.is_no_op());
    assert_eq!(snapshot(&host.root), before);
    assert_eq!(host.fetcher.fetch_count(), fetches);
    assert_eq!(host.services.calls().len(), calls);
}

#[test]
fn orchestrator_no_op_on_fresh_install_state_creates_nothing() {
    let host = TestHost::new();
    let state = desired("17.0.2", "10.1.19");
    host.install(Component::Java, "17.0.2");
    host.install(Component::AppServer, "10.1.19");
    let before = snapshot(&host.root);

    let err = host.orchestrator(&state).run().expect_err("must be no-op");

    assert!(matches!(err, LifecycleError::NoOp { .. }));
    assert_eq!(snapshot(&host.root), before);
    assert!(!host.layout.transactions_dir().exists());
}

#[test]
fn orchestrator_requires_both_components_installed() {
    let host = TestHost::new();
    host.install(Component::Java, "17.0.2");
    let state = desired("21.0.1", "10.1.19");

    let err = host.orchestrator(&state).run().expect_err("must refuse");
    assert!(matches!(
        err,
        LifecycleError::NotInstalled {
            component: Component::AppServer
        }
    ));
    assert_eq!(host.current(Component::Java), Some(v("17.0.2")));
}

#[test]
fn orchestrator_compensates_java_when_server_upgrade_fails() {
    let host = TestHost::new();
    host.orchestrator(&desired("17.0.2", "10.1.19"))
        .install()
        .expect("must install");
    host.fetcher
        .fail(&url_for(Component::AppServer, "10.1.20"));

    let target = desired("21.0.1", "10.1.20");
    let err = host.orchestrator(&target).run().expect_err("must fail");

    match &err {
        LifecycleError::Compensated {
            restored_java,
            cause,
        } => {
            assert_eq!(restored_java, &v("17.0.2"));
            assert!(matches!(
                **cause,
                LifecycleError::Fetch {
                    component: Component::AppServer,
                    ..
                }
            ));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!err.is_no_op());
    assert_eq!(host.current(Component::Java), Some(v("17.0.2")));
    assert_eq!(host.current(Component::AppServer), Some(v("10.1.19")));
    assert_eq!(host.unit_versions(), vec!["10.1.19".to_string()]);
    assert!(host.unit_content("10.1.19").contains(&format!(
        "JAVA_HOME={}\"",
        host.root.join("opt/java/jdk-17.0.2").display()
    )));
    assert_eq!(
        read_previous_versions(&host.layout).expect("must read"),
        Some(PreviousVersionsRecord {
            java: v("17.0.2"),
            tomcat: v("10.1.19"),
        })
    );
    assert!(host
        .transaction_statuses()
        .contains(&"compensated".to_string()));
    assert_eq!(OperationJournal::active_txid(&host.layout).expect("must read"), None);
}

#[test]
fn orchestrator_reports_failed_compensation_after_single_attempt() {
    let host = TestHost::new();
    host.orchestrator(&desired("17.0.2", "10.1.19"))
        .install()
        .expect("must install");
    let server_url = url_for(Component::AppServer, "10.1.20");
    host.fetcher.fail(&server_url);
    let java_backups = host.layout.backup_dir(Component::Java);
    host.fetcher.during(&server_url, move || {
        fs::remove_dir_all(&java_backups).expect("must drop java backup");
    });

    let target = desired("21.0.1", "10.1.20");
    let err = host.orchestrator(&target).run().expect_err("must fail");

    match &err {
        LifecycleError::CompensationFailed {
            cause,
            compensation,
        } => {
            assert!(matches!(
                **cause,
                LifecycleError::Fetch {
                    component: Component::AppServer,
                    ..
                }
            ));
            assert!(matches!(
                **compensation,
                LifecycleError::NoBackup {
                    component: Component::Java,
                    ..
                }
            ));
        }
        other => panic!("unexpected error: {other}"),
    }
    let steps = host.journal_steps("upgrade");
    assert_eq!(
        steps
            .iter()
            .filter(|step| step.as_str() == "compensate:java")
            .count(),
        1
    );
    assert_eq!(host.current(Component::Java), Some(v("21.0.1")));
    assert_eq!(host.current(Component::AppServer), Some(v("10.1.19")));
    assert!(host.transaction_statuses().contains(&"failed".to_string()));
    assert_eq!(OperationJournal::active_txid(&host.layout).expect("must read"), None);
}

#[test]
fn orchestrator_completes_upgrade_when_journal_breaks_mid_run() {
    let host = TestHost::new();
    host.orchestrator(&desired("17.0.2", "10.1.19"))
        .install()
        .expect("must install");
    let java_url = url_for(Component::Java, "21.0.1");
    let transactions = host.layout.transactions_dir();
    host.fetcher.during(&java_url, move || {
        let txid = fs::read_to_string(transactions.join("active")).expect("must read marker");
        fs::create_dir_all(transactions.join(format!("{}.journal", txid.trim())))
            .expect("must block journal");
    });

    let report = host
        .orchestrator(&desired("21.0.1", "10.1.20"))
        .run()
        .expect("must upgrade despite journal failure");

    assert_eq!(
        report.java,
        Transition::Upgraded {
            from: v("17.0.2"),
            to: v("21.0.1")
        }
    );
    assert_eq!(host.current(Component::Java), Some(v("21.0.1")));
    assert_eq!(host.current(Component::AppServer), Some(v("10.1.20")));
    assert!(host.unit_content("10.1.20").contains(&format!(
        "JAVA_HOME={}\"",
        host.root.join("opt/java/jdk-21.0.1").display()
    )));
    assert_eq!(
        read_previous_versions(&host.layout).expect("must read"),
        Some(PreviousVersionsRecord {
            java: v("17.0.2"),
            tomcat: v("10.1.19"),
        })
    );
    assert_eq!(
        host.transaction_statuses(),
        vec!["committed".to_string(), "committed".to_string()]
    );
    assert_eq!(OperationJournal::active_txid(&host.layout).expect("must read"), None);
}

#[test]
fn orchestrator_java_failure_aborts_before_touching_server() {
    let host = TestHost::new();
    host.orchestrator(&desired("17.0.2", "10.1.19"))
        .install()
        .expect("must install");
    host.fetcher.fail(&url_for(Component::Java, "21.0.1"));
    let fetches = host.fetcher.fetch_count();

    let err = host
        .orchestrator(&desired("21.0.1", "10.1.20"))
        .run()
        .expect_err("must fail");

    assert!(matches!(
        err,
        LifecycleError::Fetch {
            component: Component::Java,
            ..
        }
    ));
    assert_eq!(host.fetcher.fetch_count(), fetches + 1);
    assert_eq!(host.current(Component::Java), Some(v("17.0.2")));
    assert_eq!(host.current(Component::AppServer), Some(v("10.1.19")));
    assert!(host.transaction_statuses().contains(&"failed".to_string()));
}

#[test]
fn orchestrator_rebinds_server_when_only_java_changes() {
    let host = TestHost::new();
    host.orchestrator(&desired("17.0.2", "10.1.19"))
        .install()
        .expect("must install");

    let report = host
        .orchestrator(&desired("21.0.1", "10.1.19"))
        .run()
        .expect("must upgrade");

    assert_eq!(report.tomcat, Transition::Rebound(v("10.1.19")));
    assert!(host.backup_names(Component::AppServer).is_empty());
    assert!(host.unit_content("10.1.19").contains(&format!(
        "JAVA_HOME={}\"",
        host.root.join("opt/java/jdk-21.0.1").display()
    )));
}

#[test]
fn orchestrator_refuses_while_marker_is_present() {
    let host = TestHost::new();
    host.orchestrator(&desired("17.0.2", "10.1.19"))
        .install()
        .expect("must install");
    fs::write(host.layout.transaction_active_path(), "tx-stale\n").expect("must write marker");
    let fetches = host.fetcher.fetch_count();

    let err = host
        .orchestrator(&desired("21.0.1", "10.1.19"))
        .run()
        .expect_err("must refuse");

    assert!(matches!(err, LifecycleError::OperationInProgress(_)));
    assert!(err.to_string().contains("tx-stale"));
    assert_eq!(host.fetcher.fetch_count(), fetches);
    assert_eq!(host.current(Component::Java), Some(v("17.0.2")));
}

#[test]
fn orchestrator_plan_reports_without_mutating() {
    let host = TestHost::new();
    host.orchestrator(&desired("17.0.2", "10.1.19"))
        .install()
        .expect("must install");
    let before = snapshot(&host.root);

    let report = host
        .orchestrator(&desired("21.0.1", "10.1.19"))
        .plan()
        .expect("must plan");

    assert_eq!(
        report.java,
        Transition::Upgraded {
            from: v("17.0.2"),
            to: v("21.0.1")
        }
    );
    assert_eq!(report.tomcat, Transition::Rebound(v("10.1.19")));
    assert_eq!(snapshot(&host.root), before);
}

#[test]
fn orchestrator_install_refuses_different_installed_version() {
    let host = TestHost::new();
    host.install(Component::Java, "11.0.22");

    let err = host
        .orchestrator(&desired("17.0.2", "10.1.19"))
        .install()
        .expect_err("must refuse");

    match err {
        LifecycleError::AlreadyInstalled {
            component,
            installed,
            desired,
        } => {
            assert_eq!(component, Component::Java);
            assert_eq!(installed, v("11.0.22"));
            assert_eq!(desired, v("17.0.2"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(host.current(Component::AppServer), None);
}

#[test]
fn orchestrator_install_skips_component_already_at_desired_version() {
    let host = TestHost::new();
    host.install(Component::Java, "17.0.2");

    let report = host
        .orchestrator(&desired("17.0.2", "10.1.19"))
        .install()
        .expect("must install");

    assert_eq!(report.java, Transition::Unchanged(v("17.0.2")));
    assert_eq!(report.tomcat, Transition::Installed(v("10.1.19")));
    assert_eq!(host.fetcher.fetch_count(), 2);
}

#[test]
fn orchestrator_reports_config_error_for_unloadable_descriptor() {
    let host = TestHost::new();
    let err = host
        .orchestrator(&BrokenDesired)
        .run()
        .expect_err("must fail");
    assert!(matches!(err, LifecycleError::Config(_)));
    assert!(err.to_string().contains("descriptor is missing"));
}

#[test]
fn orchestrator_rollback_java_only_rebinds_server() {
    let host = TestHost::new();
    host.orchestrator(&desired("17.0.2", "10.1.19"))
        .install()
        .expect("must install");
    let state = desired("21.0.1", "10.1.19");
    host.orchestrator(&state).run().expect("must upgrade");

    let restored = host
        .orchestrator(&state)
        .rollback(ComponentScope::Java)
        .expect("must roll back");

    assert_eq!(restored.len(), 1);
    assert_eq!(restored[0].version, v("17.0.2"));
    assert_eq!(host.current(Component::AppServer), Some(v("10.1.19")));
    assert!(host.unit_content("10.1.19").contains(&format!(
        "JAVA_HOME={}\"",
        host.root.join("opt/java/jdk-17.0.2").display()
    )));
}

#[test]
fn orchestrator_rollback_all_restores_both_components() {
    let host = TestHost::new();
    host.orchestrator(&desired("17.0.2", "10.1.19"))
        .install()
        .expect("must install");
    let state = desired("21.0.1", "10.1.20");
    host.orchestrator(&state).run().expect("must upgrade");

    let restored = host
        .orchestrator(&state)
        .rollback(ComponentScope::All)
        .expect("must roll back");

    let versions: Vec<_> = restored.iter().map(|item| item.version.clone()).collect();
    assert_eq!(versions, vec![v("17.0.2"), v("10.1.19")]);
    assert_eq!(host.unit_versions(), vec!["10.1.19".to_string()]);
    assert!(host.unit_content("10.1.19").contains(&format!(
        "JAVA_HOME={}\"",
        host.root.join("opt/java/jdk-17.0.2").display()
    )));
}

#[test]
fn orchestrator_rollback_without_backup_changes_nothing() {
    let host = TestHost::new();
    let state = desired("17.0.2", "10.1.19");
    host.orchestrator(&state).install().expect("must install");
    let before = snapshot(&host.root);

    let err = host
        .orchestrator(&state)
        .rollback(ComponentScope::All)
        .expect_err("must fail");

    assert!(matches!(
        err,
        LifecycleError::NoBackup {
            component: Component::Java,
            ..
        }
    ));
    assert_eq!(snapshot(&host.root), before);
}

#[test]
fn orchestrator_uninstall_all_clears_record() {
    let host = TestHost::new();
    let state = desired("17.0.2", "10.1.19");
    host.orchestrator(&state).install().expect("must install");

    let results = host
        .orchestrator(&state)
        .uninstall(ComponentScope::All)
        .expect("must uninstall");

    let order: Vec<_> = results.iter().map(|result| result.component).collect();
    assert_eq!(order, vec![Component::AppServer, Component::Java]);
    assert!(results
        .iter()
        .all(|result| result.status == UninstallStatus::Uninstalled));
    assert!(read_previous_versions(&host.layout)
        .expect("must read")
        .is_none());
    assert!(host
        .env_declarations(&host.root.join("etc/environment"), "JAVA_HOME")
        .is_empty());

    let again = host
        .orchestrator(&state)
        .uninstall(ComponentScope::All)
        .expect("second uninstall must succeed");
    assert!(again
        .iter()
        .all(|result| result.status == UninstallStatus::NotInstalled));
}

#[test]
fn orchestrator_status_reports_installed_backup_and_desired() {
    let host = TestHost::new();
    host.orchestrator(&desired("17.0.2", "10.1.19"))
        .install()
        .expect("must install");
    let state = desired("21.0.1", "10.1.19");
    host.orchestrator(&state).run().expect("must upgrade");

    let statuses = host.orchestrator(&state).status().expect("must report");
    let java = &statuses[0];
    assert_eq!(java.component, Component::Java);
    assert_eq!(java.installed, Some(v("21.0.1")));
    assert_eq!(java.backup, Some(v("17.0.2")));
    assert_eq!(java.desired, Some(v("21.0.1")));
    assert_eq!(java.last_known_good, Some(v("17.0.2")));
    let tomcat = &statuses[1];
    assert_eq!(tomcat.installed, Some(v("10.1.19")));
    assert_eq!(tomcat.backup, None);

    let offline = host
        .orchestrator(&BrokenDesired)
        .status()
        .expect("status must tolerate a missing descriptor");
    assert!(offline.iter().all(|status| status.desired.is_none()));
}

#[test]
fn component_state_reports_active_version() {
    assert_eq!(
        ComponentState::RolledBack(v("17.0.2")).active_version(),
        Some(&v("17.0.2"))
    );
    assert_eq!(ComponentState::Upgrading.active_version(), None);
    assert_eq!(ComponentState::BackingUp.to_string(), "backing-up");
}

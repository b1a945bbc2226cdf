// Recording fake host shared by the integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use wo_core::host::{Accounts, CommandOutput, DatabaseAdmin, ServiceManager, UnitAction};
use wo_core::{CoreError, DbCredentials, EngineConfig, Layout, PhpVersion, SiteManager};

// ── Fake host ───────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct HostState {
    /// Every call in order, e.g. `restart php8.4-fpm@a-com.service`.
    pub events: Vec<String>,
    pub enabled: BTreeSet<String>,
    pub active: BTreeSet<String>,
    pub users: BTreeSet<String>,
    /// Database name to owning user.
    pub databases: BTreeMap<String, String>,
    /// Dumps replayed by `load`, as (database, contents).
    pub loaded: Vec<(String, String)>,
    /// Units whose restart fails.
    pub broken_units: BTreeSet<String>,
    /// Units that start cleanly but never report active.
    pub stuck_units: BTreeSet<String>,
    pub broken_nginx: bool,
    /// Dumps write a truncated file and then fail.
    pub broken_dump: bool,
}

#[derive(Debug, Default)]
pub struct FakeHost {
    state: Mutex<HostState>,
}

impl FakeHost {
    pub fn state(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap()
    }

    pub fn break_unit(&self, unit: &str) {
        self.state().broken_units.insert(unit.to_owned());
    }

    pub fn stick_unit(&self, unit: &str) {
        self.state().stuck_units.insert(unit.to_owned());
    }

    pub fn break_dump(&self) {
        self.state().broken_dump = true;
    }

    pub fn events(&self) -> Vec<String> {
        self.state().events.clone()
    }

    /// Position of the first event equal to `event`.
    pub fn position(&self, event: &str) -> Option<usize> {
        self.state().events.iter().position(|e| e == event)
    }

    fn record(&self, event: String) {
        self.state().events.push(event);
    }
}

fn ok(stdout: &str) -> CommandOutput {
    CommandOutput {
        success: true,
        code: Some(0),
        stdout: stdout.to_owned(),
        stderr: String::new(),
    }
}

fn failed(stderr: &str) -> CommandOutput {
    CommandOutput {
        success: false,
        code: Some(1),
        stdout: String::new(),
        stderr: stderr.to_owned(),
    }
}

impl ServiceManager for FakeHost {
    async fn control(&self, action: UnitAction, unit: &str) -> Result<CommandOutput, CoreError> {
        let mut state = self.state();
        let output = match action {
            UnitAction::Enable => {
                state.enabled.insert(unit.to_owned());
                ok("")
            }
            UnitAction::Disable => {
                state.enabled.remove(unit);
                ok("")
            }
            UnitAction::Start | UnitAction::Restart | UnitAction::Reload => {
                if state.broken_units.contains(unit) {
                    failed("Job failed. See journalctl for details.")
                } else if state.stuck_units.contains(unit) {
                    ok("")
                } else {
                    state.active.insert(unit.to_owned());
                    ok("")
                }
            }
            UnitAction::Stop => {
                state.active.remove(unit);
                ok("")
            }
            UnitAction::IsActive => {
                let active = state.active.contains(unit);
                state.events.push(format!("is-active {unit} = {active}"));
                return Ok(if active { ok("active\n") } else { failed("inactive") });
            }
        };
        state.events.push(format!("{action} {unit}"));
        Ok(output)
    }

    async fn daemon_reload(&self) -> Result<(), CoreError> {
        self.record("daemon-reload".into());
        Ok(())
    }

    async fn reload_nginx(&self) -> Result<(), CoreError> {
        self.record("reload nginx".into());
        if self.state().broken_nginx {
            return Err(CoreError::CommandFailed {
                program: "nginx".into(),
                message: "configuration test failed".into(),
            });
        }
        Ok(())
    }
}

impl Accounts for FakeHost {
    async fn ensure_pool_user(&self, user: &str, member: &str) -> Result<bool, CoreError> {
        self.record(format!("ensure-user {user} +{member}"));
        Ok(self.state().users.insert(user.to_owned()))
    }

    async fn remove_pool_user(&self, user: &str) -> Result<(), CoreError> {
        self.record(format!("remove-user {user}"));
        self.state().users.remove(user);
        Ok(())
    }

    async fn chown(&self, path: &Path, owner: &str, _recursive: bool) -> Result<(), CoreError> {
        self.record(format!("chown {owner} {}", path.display()));
        Ok(())
    }
}

impl DatabaseAdmin for FakeHost {
    async fn create_database(&self, creds: &DbCredentials, _grant_host: &str) -> Result<(), CoreError> {
        self.record(format!("create-db {}", creds.name));
        self.state()
            .databases
            .insert(creds.name.clone(), creds.user.clone());
        Ok(())
    }

    async fn drop_database(&self, creds: &DbCredentials, _grant_host: &str) -> Result<(), CoreError> {
        self.record(format!("drop-db {}", creds.name));
        self.state().databases.remove(&creds.name);
        Ok(())
    }

    async fn dump(&self, name: &str, out: &Path) -> Result<(), CoreError> {
        self.record(format!("dump {name}"));
        if self.state().broken_dump {
            std::fs::write(out, "-- MySQL dump\nCREATE TABLE").unwrap();
            return Err(CoreError::CommandFailed {
                program: "mysqldump".into(),
                message: "Lost connection to server during query".into(),
            });
        }
        std::fs::write(out, dump_of(name)).unwrap();
        Ok(())
    }

    async fn load(&self, name: &str, input: &Path) -> Result<(), CoreError> {
        self.record(format!("load {name}"));
        let contents = std::fs::read_to_string(input).unwrap();
        self.state().loaded.push((name.to_owned(), contents));
        Ok(())
    }
}

/// What the fake writes for a dump of `name`.
pub fn dump_of(name: &str) -> String {
    format!("-- dump of {name}\nCREATE TABLE wp_options (id INT);\nINSERT INTO wp_options VALUES (1);\n")
}

// ── Engine setup ────────────────────────────────────────────────────

pub fn php(key: &str) -> PhpVersion {
    PhpVersion::from_key(key).unwrap()
}

/// Engine config rooted at `root` with fast activation polling.
pub fn config(root: &Path) -> EngineConfig {
    let mut config = EngineConfig {
        layout: Layout::new(root),
        ..EngineConfig::default()
    };
    config.pool.activation_timeout = Duration::from_millis(200);
    config.pool.poll_interval = Duration::from_millis(10);
    config
}

pub fn manager(root: &Path) -> SiteManager<FakeHost> {
    SiteManager::open(FakeHost::default(), config(root)).unwrap()
}

pub fn unit(php_key: &str, slug: &str) -> String {
    format!("php{}-fpm@{slug}.service", php(php_key).dotted())
}

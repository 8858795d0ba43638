//! Shared test fixtures: a recording fake for `CommandExecutor`.

#![allow(dead_code)]

use pxc_core::builder::{BuilderConfig, TemplateBuilder};
use pxc_core::error::Result;
use pxc_core::exec::{CommandExecutor, CommandOutput};
use pxc_core::pct::Pct;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Ephemeral container id used by every test builder.
pub const BUILD_ID: u32 = 10042;

struct Rule {
    pattern: String,
    status: i32,
    stderr: String,
    remaining: Option<usize>,
}

/// Records every command and answers with exit status 0 unless a failure rule
/// matches. Rules match on a substring of the space-joined command line.
#[derive(Default)]
pub struct FakeExecutor {
    calls: Mutex<Vec<String>>,
    rules: Mutex<Vec<Rule>>,
}

impl FakeExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail every command containing `pattern`.
    pub fn fail_when(&self, pattern: &str) {
        self.push_rule(pattern, None);
    }

    /// Fail the first `times` commands containing `pattern`.
    pub fn fail_times(&self, pattern: &str, times: usize) {
        self.push_rule(pattern, Some(times));
    }

    fn push_rule(&self, pattern: &str, remaining: Option<usize>) {
        self.rules.lock().unwrap().push(Rule {
            pattern: pattern.to_string(),
            status: 1,
            stderr: format!("simulated failure: {}", pattern),
            remaining,
        });
    }

    /// Every command line, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Index of the first command containing `needle`.
    pub fn position(&self, needle: &str) -> Option<usize> {
        self.calls().iter().position(|c| c.contains(needle))
    }

    pub fn count(&self, needle: &str) -> usize {
        self.calls().iter().filter(|c| c.contains(needle)).count()
    }

    pub fn ran(&self, needle: &str) -> bool {
        self.position(needle).is_some()
    }
}

#[async_trait::async_trait]
impl CommandExecutor for FakeExecutor {
    async fn run(&self, program: &str, args: &[String], _stream: bool) -> Result<CommandOutput> {
        let line = std::iter::once(program.to_string())
            .chain(args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ");
        self.calls.lock().unwrap().push(line.clone());

        let mut rules = self.rules.lock().unwrap();
        for rule in rules.iter_mut() {
            if !line.contains(&rule.pattern) {
                continue;
            }
            match rule.remaining {
                Some(0) => continue,
                Some(ref mut n) => *n -= 1,
                None => {}
            }
            return Ok(CommandOutput {
                status: rule.status,
                stdout: String::new(),
                stderr: rule.stderr.clone(),
            });
        }
        Ok(CommandOutput::ok())
    }
}

pub fn pct(fake: &Arc<FakeExecutor>) -> Pct {
    Pct::new(fake.clone(), false, false)
}

pub fn dry_run_pct(fake: &Arc<FakeExecutor>) -> Pct {
    Pct::new(fake.clone(), true, false)
}

/// Builder settings with a fast readiness loop.
pub fn builder_config() -> BuilderConfig {
    BuilderConfig {
        storage: Some("local-lvm".to_string()),
        ready_attempts: 3,
        ready_interval: Duration::ZERO,
        ..BuilderConfig::default()
    }
}

pub fn builder(pct: Pct) -> TemplateBuilder {
    TemplateBuilder::new(pct, builder_config()).with_container_id(BUILD_ID)
}

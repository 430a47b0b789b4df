#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use greenpool::config::{
    ConfigFile, ConfigSection, CoverageSection, RawConfigFile, RawTestEntry,
};

/// Builder for manifests, either validated in memory or written to disk.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                coverage: CoverageSection::default(),
                test: Vec::new(),
            },
        }
    }

    pub fn with_test(mut self, test: RawTestEntry) -> Self {
        self.config.test.push(test);
        self
    }

    pub fn processes(mut self, n: usize) -> Self {
        self.config.config.processes = Some(n);
        self
    }

    pub fn max_tasks_per_worker(mut self, n: usize) -> Self {
        self.config.config.max_tasks_per_worker = n;
        self
    }

    pub fn health_check_interval(mut self, interval: &str) -> Self {
        self.config.config.health_check_interval = interval.to_string();
        self
    }

    pub fn initializer(mut self, cmd: &str) -> Self {
        self.config.config.initializer = Some(cmd.to_string());
        self
    }

    pub fn finalizer(mut self, cmd: &str) -> Self {
        self.config.config.finalizer = Some(cmd.to_string());
        self
    }

    pub fn with_omit(mut self, pattern: &str) -> Self {
        self.config.coverage.omit.push(pattern.to_string());
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }

    pub fn to_toml(&self) -> String {
        toml::to_string(&self.config).expect("manifest serializes to TOML")
    }

    /// Write `Greenpool.toml` into `dir` and return its path.
    pub fn write_to(&self, dir: &Path) -> PathBuf {
        let path = dir.join("Greenpool.toml");
        fs::write(&path, self.to_toml()).expect("write manifest");
        path
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for one `[[test]]` entry; id is `module.class.method`.
pub struct TestEntryBuilder {
    test: RawTestEntry,
}

impl TestEntryBuilder {
    pub fn new(id: &str, cmd: &str) -> Self {
        let mut parts = id.splitn(3, '.');
        let module = parts.next().unwrap_or_default().to_string();
        let class = parts.next().unwrap_or("Case").to_string();
        let method = parts.next().unwrap_or("test").to_string();
        Self {
            test: RawTestEntry {
                module,
                class,
                method,
                cmd: cmd.to_string(),
                description: None,
                timeout: None,
                skip: None,
            },
        }
    }

    pub fn description(mut self, text: &str) -> Self {
        self.test.description = Some(text.to_string());
        self
    }

    pub fn timeout(mut self, duration: &str) -> Self {
        self.test.timeout = Some(duration.to_string());
        self
    }

    pub fn skip(mut self, reason: &str) -> Self {
        self.test.skip = Some(reason.to_string());
        self
    }

    pub fn build(self) -> RawTestEntry {
        self.test
    }
}

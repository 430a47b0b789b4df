// src/config/validate.rs

use std::collections::HashSet;
use std::time::Duration;

use globset::Glob;

use crate::config::model::{ConfigFile, RawConfigFile, RawTestEntry, TestEntry};
use crate::errors::{GreenpoolError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = GreenpoolError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        let interval = parse_duration(&raw.config.health_check_interval)
            .map_err(|e| config_err(format!("[config].health_check_interval: {e}")))?;
        if interval.is_zero() {
            return Err(config_err("[config].health_check_interval must be greater than zero"));
        }

        let mut tests = Vec::with_capacity(raw.test.len());
        for entry in raw.test {
            tests.push(convert_test(entry)?);
        }
        Ok(ConfigFile::new_unchecked(raw.config, raw.coverage, interval, tests))
    }
}

fn config_err(msg: impl Into<String>) -> GreenpoolError {
    GreenpoolError::ConfigError(msg.into())
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_tests(cfg)?;
    validate_global_config(cfg)?;
    validate_test_ids(cfg)?;
    validate_omit_patterns(cfg)?;
    Ok(())
}

fn ensure_has_tests(cfg: &RawConfigFile) -> Result<()> {
    if cfg.test.is_empty() {
        return Err(config_err(
            "manifest must contain at least one [[test]] entry",
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.processes == Some(0) {
        return Err(config_err("[config].processes must be >= 1 (got 0)"));
    }
    Ok(())
}

fn validate_test_ids(cfg: &RawConfigFile) -> Result<()> {
    let mut seen = HashSet::new();
    for t in &cfg.test {
        for (field, value) in [("module", &t.module), ("class", &t.class), ("method", &t.method)] {
            if value.trim().is_empty() {
                return Err(config_err(format!(
                    "test with cmd '{}' has an empty `{field}`",
                    t.cmd
                )));
            }
            if value.contains('.') {
                return Err(config_err(format!(
                    "test `{field}` '{value}' must not contain '.'"
                )));
            }
        }
        let id = format!("{}.{}.{}", t.module, t.class, t.method);
        if !seen.insert(id.clone()) {
            return Err(config_err(format!("duplicate test id '{id}'")));
        }
    }
    Ok(())
}

fn validate_omit_patterns(cfg: &RawConfigFile) -> Result<()> {
    for pat in &cfg.coverage.omit {
        Glob::new(pat)
            .map_err(|e| config_err(format!("invalid [coverage].omit pattern '{pat}': {e}")))?;
    }
    Ok(())
}

fn convert_test(raw: RawTestEntry) -> Result<TestEntry> {
    let timeout = match raw.timeout.as_deref() {
        Some(s) => Some(parse_duration(s).map_err(|e| {
            config_err(format!(
                "test '{}.{}.{}' has invalid timeout: {e}",
                raw.module, raw.class, raw.method
            ))
        })?),
        None => None,
    };
    Ok(TestEntry {
        description: raw.description.unwrap_or_default(),
        module: raw.module,
        class: raw.class,
        method: raw.method,
        cmd: raw.cmd,
        timeout,
        skip: raw.skip,
    })
}

/// Parse a simple duration string like `"100ms"`, `"3s"`, `"2m"`, `"1h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{num_part}': {e}"))?;
    let unit = unit_part.trim().to_lowercase();

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => scaled_secs(value, 60, s),
        "h" => scaled_secs(value, 60 * 60, s),
        _ => Err(format!(
            "unsupported duration unit '{unit}'; expected ms, s, m, or h"
        )),
    }
}

fn scaled_secs(value: u64, factor: u64, original: &str) -> std::result::Result<Duration, String> {
    value
        .checked_mul(factor)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{original}' is too large"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(toml_src: &str) -> RawConfigFile {
        toml::from_str(toml_src).unwrap()
    }

    #[test]
    fn durations_parse_with_units() {
        assert_eq!(parse_duration("100ms"), Ok(Duration::from_millis(100)));
        assert_eq!(parse_duration(" 3s "), Ok(Duration::from_secs(3)));
        assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("5d").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn oversized_durations_are_errors_not_overflows() {
        let err = parse_duration("999999999999999999h").unwrap_err();
        assert!(err.contains("too large"), "{err}");
        assert!(parse_duration("999999999999999999999m").is_err());
        assert_eq!(parse_duration("2h"), Ok(Duration::from_secs(7200)));
    }

    #[test]
    fn minimal_manifest_gets_defaults() {
        let cfg = ConfigFile::try_from(raw(
            r#"
            [[test]]
            module = "m"
            class = "C"
            method = "t"
            cmd = "true"
            "#,
        ))
        .unwrap();
        assert_eq!(cfg.health_check_interval, Duration::from_millis(100));
        assert_eq!(cfg.config.skip_exit_code, 77);
        assert_eq!(cfg.config.effective_max_tasks(), None);
        assert!(!cfg.coverage.enabled);
        assert_eq!(cfg.test[0].id(), "m.C.t");
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let err = ConfigFile::try_from(raw(
            r#"
            [[test]]
            module = "m"
            class = "C"
            method = "t"
            cmd = "true"

            [[test]]
            module = "m"
            class = "C"
            method = "t"
            cmd = "false"
            "#,
        ))
        .unwrap_err();
        assert!(err.to_string().contains("duplicate test id 'm.C.t'"));
    }

    #[test]
    fn dotted_segments_are_rejected() {
        let err = ConfigFile::try_from(raw(
            r#"
            [[test]]
            module = "pkg.m"
            class = "C"
            method = "t"
            cmd = "true"
            "#,
        ))
        .unwrap_err();
        assert!(err.to_string().contains("must not contain '.'"));
    }

    #[test]
    fn zero_processes_is_rejected() {
        let err = ConfigFile::try_from(raw(
            r#"
            [config]
            processes = 0

            [[test]]
            module = "m"
            class = "C"
            method = "t"
            cmd = "true"
            "#,
        ))
        .unwrap_err();
        assert!(err.to_string().contains("processes"));
    }

    #[test]
    fn zero_health_check_interval_is_rejected() {
        let err = ConfigFile::try_from(raw(
            r#"
            [config]
            health_check_interval = "0ms"

            [[test]]
            module = "m"
            class = "C"
            method = "t"
            cmd = "true"
            "#,
        ))
        .unwrap_err();
        assert!(err.to_string().contains("health_check_interval must be greater than zero"));
    }

    #[test]
    fn bad_timeout_names_the_test() {
        let err = ConfigFile::try_from(raw(
            r#"
            [[test]]
            module = "m"
            class = "C"
            method = "slow"
            cmd = "sleep 1"
            timeout = "soon"
            "#,
        ))
        .unwrap_err();
        assert!(err.to_string().contains("m.C.slow"));
    }

    #[test]
    fn bad_omit_glob_is_rejected() {
        let err = ConfigFile::try_from(raw(
            r#"
            [coverage]
            omit = ["src/[oops"]

            [[test]]
            module = "m"
            class = "C"
            method = "t"
            cmd = "true"
            "#,
        ))
        .unwrap_err();
        assert!(err.to_string().contains("omit pattern"));
    }
}

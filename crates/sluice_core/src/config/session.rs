use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Duration;

use sluice_error::{DbError, Result};

use super::execution::{CacheConfig, ExecutionConfig};
use crate::scalar::ScalarValue;

pub const DEFAULT_CACHE_TTL_SECS: u64 = 60;

const MAX_CACHE_TTL_SECS: u64 = 24 * 60 * 60;

/// Configuration for the session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Abort once more than this many soft errors happened. Negative
    /// disables the check.
    pub max_errors: i64,
    pub cache_enabled: bool,
    pub cache_ttl_secs: u64,
    /// Rows a single cache entry may hold. Zero means unbounded.
    pub cache_max_rows: u64,
    pub verbose_explain: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            max_errors: -1,
            cache_enabled: true,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            cache_max_rows: 0,
            verbose_explain: false,
        }
    }
}

impl SessionConfig {
    pub fn set_from_scalar(&mut self, name: &str, value: ScalarValue) -> Result<()> {
        let func = GET_SET_FUNCTIONS
            .get(name)
            .ok_or_else(|| DbError::new(format!("Missing setting for '{name}'")))?;

        (func.set)(value, self)
    }

    pub fn get_as_scalar(&self, name: &str) -> Result<ScalarValue> {
        let func = GET_SET_FUNCTIONS
            .get(name)
            .ok_or_else(|| DbError::new(format!("Missing setting for '{name}'")))?;

        Ok((func.get)(self))
    }

    pub fn reset(&mut self, name: &str) -> Result<()> {
        let func = GET_SET_FUNCTIONS
            .get(name)
            .ok_or_else(|| DbError::new(format!("Missing setting for '{name}'")))?;

        let scalar = (func.get)(&Self::default());
        (func.set)(scalar, self)
    }

    pub fn reset_all(&mut self) {
        *self = Self::default();
    }

    /// Names and descriptions of every setting, sorted by name.
    pub fn describe() -> Vec<(&'static str, &'static str)> {
        let mut settings: Vec<_> = GET_SET_FUNCTIONS
            .iter()
            .map(|(name, funcs)| (*name, funcs.description))
            .collect();
        settings.sort_unstable();
        settings
    }

    pub fn execution_config(&self) -> ExecutionConfig {
        ExecutionConfig {
            max_errors: u64::try_from(self.max_errors).ok(),
            verbose_explain: self.verbose_explain,
        }
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            enabled: self.cache_enabled,
            ttl: Duration::from_secs(self.cache_ttl_secs),
            max_rows: (self.cache_max_rows > 0).then_some(self.cache_max_rows as usize),
        }
    }
}

struct SettingFunctions {
    set: fn(scalar: ScalarValue, conf: &mut SessionConfig) -> Result<()>,
    get: fn(conf: &SessionConfig) -> ScalarValue,
    description: &'static str,
}

impl SettingFunctions {
    const fn new<S: SessionSetting>() -> Self {
        SettingFunctions {
            set: S::set_from_scalar as _,
            get: S::get_as_scalar as _,
            description: S::DESCRIPTION,
        }
    }
}

fn insert_setting<S: SessionSetting>(map: &mut HashMap<&'static str, SettingFunctions>) {
    if map.insert(S::NAME, SettingFunctions::new::<S>()).is_some() {
        panic!("Duplicate settings names: {}", S::NAME);
    }
}

static GET_SET_FUNCTIONS: LazyLock<HashMap<&'static str, SettingFunctions>> = LazyLock::new(|| {
    let mut map = HashMap::new();

    insert_setting::<MaxErrors>(&mut map);
    insert_setting::<CacheEnabled>(&mut map);
    insert_setting::<CacheTtlSecs>(&mut map);
    insert_setting::<CacheMaxRows>(&mut map);
    insert_setting::<VerboseExplain>(&mut map);

    map
});

pub trait SessionSetting: Sync + Send + 'static {
    const NAME: &'static str;
    const DESCRIPTION: &'static str;

    fn set_from_scalar(scalar: ScalarValue, conf: &mut SessionConfig) -> Result<()>;
    fn get_as_scalar(conf: &SessionConfig) -> ScalarValue;
}

pub struct MaxErrors;

impl SessionSetting for MaxErrors {
    const NAME: &'static str = "max_errors";
    const DESCRIPTION: &'static str =
        "Abort execution once this many row errors happened, -1 to never abort";

    fn set_from_scalar(scalar: ScalarValue, conf: &mut SessionConfig) -> Result<()> {
        let val = scalar.try_as_i64()?;
        if val < -1 {
            return Err(DbError::new("Max errors cannot be less than -1"));
        }
        conf.max_errors = val;
        Ok(())
    }

    fn get_as_scalar(conf: &SessionConfig) -> ScalarValue {
        conf.max_errors.into()
    }
}

pub struct CacheEnabled;

impl SessionSetting for CacheEnabled {
    const NAME: &'static str = "cache_enabled";
    const DESCRIPTION: &'static str = "If reads from inputs are cached between resets";

    fn set_from_scalar(scalar: ScalarValue, conf: &mut SessionConfig) -> Result<()> {
        conf.cache_enabled = scalar.try_as_bool()?;
        Ok(())
    }

    fn get_as_scalar(conf: &SessionConfig) -> ScalarValue {
        conf.cache_enabled.into()
    }
}

pub struct CacheTtlSecs;

impl SessionSetting for CacheTtlSecs {
    const NAME: &'static str = "cache_ttl_secs";
    const DESCRIPTION: &'static str = "Seconds an unreferenced cache entry stays valid";

    fn set_from_scalar(scalar: ScalarValue, conf: &mut SessionConfig) -> Result<()> {
        let val = scalar.try_as_i64()?;
        if val < 1 {
            return Err(DbError::new("Cache TTL must be at least one second"));
        }
        if val as u64 > MAX_CACHE_TTL_SECS {
            return Err(DbError::new(format!(
                "Cache TTL cannot be greater than {MAX_CACHE_TTL_SECS} seconds"
            )));
        }
        conf.cache_ttl_secs = val as u64;
        Ok(())
    }

    fn get_as_scalar(conf: &SessionConfig) -> ScalarValue {
        conf.cache_ttl_secs.into()
    }
}

pub struct CacheMaxRows;

impl SessionSetting for CacheMaxRows {
    const NAME: &'static str = "cache_max_rows";
    const DESCRIPTION: &'static str = "Maximum rows held by a single cache entry, 0 for no limit";

    fn set_from_scalar(scalar: ScalarValue, conf: &mut SessionConfig) -> Result<()> {
        let val = scalar.try_as_i64()?;
        if val < 0 {
            return Err(DbError::new("Cache max rows cannot be negative"));
        }
        conf.cache_max_rows = val as u64;
        Ok(())
    }

    fn get_as_scalar(conf: &SessionConfig) -> ScalarValue {
        conf.cache_max_rows.into()
    }
}

pub struct VerboseExplain;

impl SessionSetting for VerboseExplain {
    const NAME: &'static str = "verbose_explain";
    const DESCRIPTION: &'static str = "Include extra details in explain output";

    fn set_from_scalar(scalar: ScalarValue, conf: &mut SessionConfig) -> Result<()> {
        conf.verbose_explain = scalar.try_as_bool()?;
        Ok(())
    }

    fn get_as_scalar(conf: &SessionConfig) -> ScalarValue {
        conf.verbose_explain.into()
    }
}

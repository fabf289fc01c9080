//! Lab-setup configuration loaded through Figment.
//!
//! A setup file maps instrument names to address strings so experiment
//! scripts can say `config.open("itc")` instead of hard-coding bus
//! addresses:
//!
//! ```toml
//! [instruments.itc]
//! address = "GPIB::24"
//! timeout = "2s"
//!
//! [instruments.lockin]
//! address = "GPIB::8"
//! ```
//!
//! # Environment Variable Overrides
//!
//! Values can be overridden with `CRYOLAB_`-prefixed environment
//! variables, nested keys separated by double underscores:
//!
//! ```text
//! CRYOLAB_INSTRUMENTS__ITC__ADDRESS="ETHER::10.0.0.5:7777"
//! CRYOLAB_INSTRUMENTS__ITC__TIMEOUT="500ms"
//! ```
//!
//! Names coming from the environment are lowercased by Figment, so
//! instrument names in the setup file should stay lowercase.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{LabError, Result};
use crate::visa::{self, Instrument};

/// Default setup file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "cryolab.toml";

/// One named instrument in the setup file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentEntry {
    /// Address string understood by [`visa::open`].
    pub address: String,
    /// Connection and reply timeout, in humantime notation ("10s",
    /// "500ms").
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,
}

fn default_timeout() -> Duration {
    visa::DEFAULT_TIMEOUT
}

/// The whole lab setup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabConfig {
    /// Instrument name to connection entry. A `BTreeMap` keeps listings
    /// in a stable order.
    #[serde(default)]
    pub instruments: BTreeMap<String, InstrumentEntry>,
}

impl LabConfig {
    /// Loads [`DEFAULT_CONFIG_FILE`] merged with environment overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Loads a specific setup file merged with environment overrides.
    /// A missing file is not an error; it yields an empty setup that
    /// environment variables can still populate.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config: Self = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("CRYOLAB_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for (name, entry) in &self.instruments {
            if entry.address.is_empty() {
                return Err(LabError::InvalidInput(format!(
                    "instrument '{name}' has an empty address"
                )));
            }
        }
        Ok(())
    }

    /// Looks up one entry by name.
    pub fn entry(&self, name: &str) -> Result<&InstrumentEntry> {
        self.instruments
            .get(name)
            .ok_or_else(|| LabError::UnknownInstrument(name.to_string()))
    }

    /// Opens the named instrument through the address factory.
    pub fn open(&self, name: &str) -> Result<Box<dyn Instrument>> {
        let entry = self.entry(name)?;
        visa::open(&entry.address, entry.timeout)
    }

    /// Configured instrument names in listing order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.instruments.keys().map(String::as_str)
    }
}

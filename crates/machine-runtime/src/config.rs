//! CPU and run configuration value types.

use std::fmt;
use std::str::FromStr;

use crate::memory::PAGE_SHIFT;
use crate::ConfigError;

/// Supported CPU models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum CpuType {
    /// 68000 with a 24-bit address bus.
    #[default]
    M68000,
    /// 68010 with a 24-bit address bus.
    M68010,
    /// 68EC020 with a 24-bit address bus.
    M68EC020,
    /// 68020 with a 32-bit address bus.
    M68020,
}

impl CpuType {
    /// Resolves a model number such as `68000`, `10` or `0`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidCpuType`] for unknown numbers.
    pub fn from_model_number(model: u32) -> Result<Self, ConfigError> {
        match model {
            68000 | 0 => Ok(Self::M68000),
            68010 | 10 => Ok(Self::M68010),
            68020 | 20 => Ok(Self::M68020),
            other => Err(ConfigError::InvalidCpuType(other.to_string())),
        }
    }

    /// Returns the number of address bus bits.
    #[must_use]
    pub const fn address_bus_bits(self) -> u32 {
        match self {
            Self::M68000 | Self::M68010 | Self::M68EC020 => 24,
            Self::M68020 => 32,
        }
    }

    /// Returns the number of pages addressable through the bus.
    #[must_use]
    pub const fn max_pages(self) -> u32 {
        1 << (self.address_bus_bits() - PAGE_SHIFT)
    }

    /// Returns the canonical model name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::M68000 => "68000",
            Self::M68010 => "68010",
            Self::M68EC020 => "68EC020",
            Self::M68020 => "68020",
        }
    }
}

impl FromStr for CpuType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "68000" | "000" | "00" => Ok(Self::M68000),
            "68010" | "010" | "10" => Ok(Self::M68010),
            "68020" | "020" | "20" => Ok(Self::M68020),
            "68ec020" | "ec020" | "ec20" => Ok(Self::M68EC020),
            _ => Err(ConfigError::InvalidCpuType(s.to_owned())),
        }
    }
}

impl fmt::Display for CpuType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// CPU parameters handed to the engine on init.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct CpuConfig {
    /// Selected CPU model.
    pub cpu_type: CpuType,
}

impl CpuConfig {
    /// Creates a configuration for `cpu_type`.
    #[must_use]
    pub const fn new(cpu_type: CpuType) -> Self {
        Self { cpu_type }
    }

    /// Returns the page budget of the configured model.
    #[must_use]
    pub const fn max_pages(&self) -> u32 {
        self.cpu_type.max_pages()
    }
}

/// Default depth of the program counter ring trace.
pub const DEFAULT_PC_TRACE_SIZE: usize = 8;

/// Run loop and instrumentation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct RunConfig {
    /// Turn host aborts into a `USER_ABORT` result instead of an error.
    pub catch_abort: bool,
    /// Cycle budget per engine batch, 0 runs until the next event.
    pub cycles_per_run: u64,
    /// Create a label store.
    pub with_labels: bool,
    /// Depth of the program counter ring trace, 0 disables it.
    pub pc_trace_size: usize,
    /// Log every executed instruction.
    pub instr_trace: bool,
    /// Log every CPU memory access.
    pub cpu_mem_trace: bool,
    /// Log every host memory access.
    pub api_mem_trace: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            catch_abort: true,
            cycles_per_run: 0,
            with_labels: true,
            pc_trace_size: DEFAULT_PC_TRACE_SIZE,
            instr_trace: false,
            cpu_mem_trace: false,
            api_mem_trace: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{CpuConfig, CpuType, RunConfig};
    use crate::ConfigError;

    #[rstest]
    #[case("68000", CpuType::M68000)]
    #[case("000", CpuType::M68000)]
    #[case("00", CpuType::M68000)]
    #[case("010", CpuType::M68010)]
    #[case("20", CpuType::M68020)]
    #[case("68EC020", CpuType::M68EC020)]
    #[case("ec20", CpuType::M68EC020)]
    fn cpu_names_parse(#[case] name: &str, #[case] expected: CpuType) {
        assert_eq!(name.parse::<CpuType>(), Ok(expected));
    }

    #[test]
    fn unknown_cpu_names_and_numbers_are_rejected() {
        assert_eq!(
            "68030".parse::<CpuType>(),
            Err(ConfigError::InvalidCpuType("68030".into()))
        );
        assert_eq!(
            CpuType::from_model_number(30),
            Err(ConfigError::InvalidCpuType("30".into()))
        );
        assert_eq!(CpuType::from_model_number(10), Ok(CpuType::M68010));
    }

    #[test]
    fn bus_width_selects_page_budget() {
        assert_eq!(CpuType::M68000.max_pages(), 256);
        assert_eq!(CpuType::M68EC020.max_pages(), 256);
        assert_eq!(CpuConfig::new(CpuType::M68020).max_pages(), 65536);
        assert_eq!(CpuType::M68EC020.to_string(), "68EC020");
    }

    #[test]
    fn run_config_defaults() {
        let config = RunConfig::default();
        assert!(config.catch_abort);
        assert!(config.with_labels);
        assert_eq!(config.cycles_per_run, 0);
        assert_eq!(config.pc_trace_size, 8);
        assert!(!config.instr_trace && !config.cpu_mem_trace && !config.api_mem_trace);
    }
}

pub mod config;
pub mod cpu;

pub use config::{DEFAULT_INPUT_SIZE, Normalization};
pub use cpu::CpuPreProcessor;

// Shorter name used by the binaries
pub use cpu::CpuPreProcessor as PreProcessor;

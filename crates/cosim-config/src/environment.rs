//! Access to OS environment variables
//!
//! `${NAME}` placeholders and the SLURM allocation (`SLURM_NNODES`, `SLURM_NODELIST`) are read
//! through [Environment] so a run can be reproduced without touching the process environment.

/// Source of environment variable values
pub trait Environment {
    fn var(&self, name: &str) -> Option<String>;
}

// blanket impl for Fn
impl<F> Environment for F
where
    F: Fn(&str) -> Option<String>,
{
    fn var(&self, name: &str) -> Option<String> {
        self(name)
    }
}

/// The environment of the running process
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnvironment;

impl Environment for ProcessEnvironment {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

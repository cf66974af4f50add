//! Convenient re-exports for common qa-run usage.
//!
//! ```no_run
//! use qa_run::prelude::*;
//!
//! # async fn demo() -> Result<()> {
//! let table = qa_table! { "Proceed? [y/n]" => "y" };
//! let result = run_cmd_qa("./setup.sh", &table, &RunOptions::new()).await?;
//! result.ensure_success()?;
//! # Ok(())
//! # }
//! ```

// Configuration
pub use crate::config::{ErrorPattern, QaConfig, RunOptions, Strictness};

// Error handling
pub use crate::error::{QaError, Result, SpawnError};

// Tables and results
pub use crate::finalize::CommandResult;
pub use crate::rules::QaTable;

// Entry points
pub use crate::run::{run_cmd, run_cmd_qa};
pub use crate::sync::{run_cmd_blocking, run_cmd_qa_blocking};

// Macros (re-exported from qa-run-macros)
pub use crate::{qa_table, std_qa_table};

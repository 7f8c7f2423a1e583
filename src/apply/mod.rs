//! Applying documents to the load balancer.
//!
//! # Data Flow
//! ```text
//! RenderedDocument
//!     → applier.rs: write staging sibling → validate (haproxy -c)
//!         invalid → delete staging, live file untouched, no reload
//!         valid   → rename over live file → start or reload (SIGUSR2)
//!     → process.rs: ManagedProcess (spawned child or attached pid)
//! driver.rs subscribes to the broker and feeds the applier serially.
//! ```

pub mod applier;
pub mod driver;
pub mod process;

pub use applier::{Applier, ApplyError, ApplyOutcome};
pub use driver::drive;
pub use process::{HaproxyProcess, ManagedProcess, ProcessError};

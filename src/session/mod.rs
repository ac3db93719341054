pub mod naming;
pub mod registry;
pub mod run;
pub mod runlog;

pub use naming::{run_name, run_name_for_path, MAX_RUN_NAME};
pub use registry::{SessionRegistry, SessionSettings};
pub use run::RunSession;
pub use runlog::{RunHeader, RunLog};

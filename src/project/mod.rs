//! SQL project file parsing and deployment ordering

mod deploy;
mod sqlproj_parser;

pub use deploy::{load_deploy_scripts, DeployPhase, DeployScript, DeployScripts, ObjectKind};
pub use sqlproj_parser::{parse_sqlproj, SqlCmdVariable, SqlProject};

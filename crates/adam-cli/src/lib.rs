//! Library side of the `adam` command: logging, dataset output and the build
//! pipeline shared by the commands.

pub mod logging;
pub mod output;
pub mod pipeline;
pub mod progress;

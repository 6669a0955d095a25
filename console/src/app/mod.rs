pub mod command;
pub mod options;
pub mod run;

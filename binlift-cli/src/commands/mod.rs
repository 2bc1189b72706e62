pub mod common;
pub mod loops;
pub mod run;
pub mod sections;
pub mod trace;

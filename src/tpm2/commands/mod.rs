pub mod commands;
pub mod flush;
pub mod policy;
pub mod random;
pub mod response;
pub mod run;
pub mod session;
pub mod startup;

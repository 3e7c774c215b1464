//! procpipe - run child processes and pipe them together.
//!
//! The library core lives in [`process`]; the `procpipe` binary is a thin
//! command-line front end over it.

pub mod process;

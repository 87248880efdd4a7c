//! Built-in store grammars.

pub mod generic;
pub mod ica;

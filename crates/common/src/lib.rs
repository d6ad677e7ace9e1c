// banter-common: wire protocol and persistence records shared across Banter crates

pub mod protocol;
pub mod types;

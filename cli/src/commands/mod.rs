pub mod consent;
pub mod history;
pub mod listen;
pub mod poll;
pub mod send;

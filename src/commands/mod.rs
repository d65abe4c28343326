pub mod check;
pub mod forget;
pub mod sync;

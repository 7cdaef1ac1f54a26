pub mod classify;
pub mod decision;
pub mod discovery;
pub mod observe;

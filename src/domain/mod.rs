pub mod cycle;
pub mod pr;
pub mod state;

//! Plant models for the recede controller.
//!
//! Each model implements [`PlantModel`](recede_core::traits::PlantModel):
//! continuous-time dynamics plus the `(nx, nx + nu)` Jacobian the optimizer
//! linearizes about every tick.

pub mod cartpole;
pub mod linear;

pub use cartpole::{CartPole, CartPoleParams};
pub use linear::LinearPlant;
